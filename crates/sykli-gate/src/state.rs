// SPDX-License-Identifier: MIT OR Apache-2.0
//! The gate state machine itself: `initial -> waiting -> (approved | denied
//! | timed_out)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Initial,
    Waiting,
    Approved,
    Denied,
    TimedOut,
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Denied | Self::TimedOut)
    }

    pub fn valid_transitions(&self) -> &'static [GateState] {
        match self {
            Self::Initial => &[Self::Waiting],
            Self::Waiting => &[Self::Approved, Self::Denied, Self::TimedOut],
            Self::Approved | Self::Denied | Self::TimedOut => &[],
        }
    }

    pub fn can_transition_to(&self, next: GateState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Why a gate resolved the way it did, attached to the `gate_resolved`
/// event and surfaced in history as the task's failure reason on denial
/// or timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub state: GateState,
    pub approver: Option<String>,
    pub duration_ms: u64,
    pub reason: Option<String>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.state == GateState::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_only_transitions_to_waiting() {
        assert_eq!(GateState::Initial.valid_transitions(), &[GateState::Waiting]);
    }

    #[test]
    fn waiting_transitions_to_any_terminal_state() {
        assert!(GateState::Waiting.can_transition_to(GateState::Approved));
        assert!(GateState::Waiting.can_transition_to(GateState::Denied));
        assert!(GateState::Waiting.can_transition_to(GateState::TimedOut));
    }

    #[test]
    fn terminal_states_have_no_further_transitions() {
        for state in [GateState::Approved, GateState::Denied, GateState::TimedOut] {
            assert!(state.is_terminal());
            assert!(state.valid_transitions().is_empty());
        }
    }

    #[test]
    fn initial_and_waiting_are_not_terminal() {
        assert!(!GateState::Initial.is_terminal());
        assert!(!GateState::Waiting.is_terminal());
    }

    #[test]
    fn outcome_passed_only_on_approved() {
        let approved = GateOutcome { state: GateState::Approved, approver: None, duration_ms: 0, reason: None };
        let denied = GateOutcome { state: GateState::Denied, approver: None, duration_ms: 0, reason: None };
        assert!(approved.passed());
        assert!(!denied.passed());
    }
}
