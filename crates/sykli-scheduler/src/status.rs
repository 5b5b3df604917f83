// SPDX-License-Identifier: MIT OR Apache-2.0
//! Terminal task statuses and the summary a scheduler run produces.
//!
//! Streak computation and likely-cause correlation are a run-history
//! concern; this crate only needs to tag each task with enough information
//! for that later pass to do its job.

use serde::{Deserialize, Serialize};

/// A task's terminal outcome for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Passed,
    Failed,
    /// Condition evaluated false, or a predecessor was skipped/blocked.
    Skipped,
    /// Restored from the content-addressed cache without running.
    Cached,
    /// A predecessor failed; this task never ran.
    Blocked,
}

impl TaskStatus {
    /// `cached` counts as a pass for downstream gating and streak purposes.
    pub fn counts_as_passed(self) -> bool {
        matches!(self, TaskStatus::Passed | TaskStatus::Cached)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Passed => "passed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Cached => "cached",
            TaskStatus::Blocked => "blocked",
        }
    }
}

/// One task's record within a [`crate::executor::RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub duration_ms: u64,
    pub cached: bool,
    pub error_message: Option<String>,
    /// The task's declared `inputs` glob patterns, carried through for
    /// run-history's likely-cause correlation against the git diff.
    pub inputs: Vec<String>,
}

impl TaskRecord {
    pub fn new(name: impl Into<String>, status: TaskStatus, inputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            status,
            duration_ms: 0,
            cached: matches!(status, TaskStatus::Cached),
            error_message: None,
            inputs,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Whether the run as a whole passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Passed,
    Failed,
}

/// The full result of driving a graph to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub tasks: Vec<TaskRecord>,
    pub overall: OverallStatus,
    /// Set when the run ended because the global timeout elapsed rather
    /// than because every task reached a terminal status on its own.
    pub timed_out: bool,
}

impl RunReport {
    pub fn overall_from(tasks: &[TaskRecord]) -> OverallStatus {
        if tasks.iter().any(|t| t.status.is_failure()) {
            OverallStatus::Failed
        } else {
            OverallStatus::Passed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_counts_as_passed() {
        assert!(TaskStatus::Cached.counts_as_passed());
        assert!(TaskStatus::Passed.counts_as_passed());
        assert!(!TaskStatus::Skipped.counts_as_passed());
        assert!(!TaskStatus::Blocked.counts_as_passed());
    }

    #[test]
    fn overall_status_fails_if_any_task_failed() {
        let tasks = vec![
            TaskRecord::new("a", TaskStatus::Passed, vec![]),
            TaskRecord::new("b", TaskStatus::Failed, vec![]),
        ];
        assert_eq!(RunReport::overall_from(&tasks), OverallStatus::Failed);
    }

    #[test]
    fn overall_status_passes_when_nothing_failed() {
        let tasks = vec![
            TaskRecord::new("a", TaskStatus::Passed, vec![]),
            TaskRecord::new("b", TaskStatus::Skipped, vec![]),
            TaskRecord::new("c", TaskStatus::Cached, vec![]),
            TaskRecord::new("d", TaskStatus::Blocked, vec![]),
        ];
        assert_eq!(RunReport::overall_from(&tasks), OverallStatus::Passed);
    }
}
