// SPDX-License-Identifier: MIT OR Apache-2.0
//! The persisted shape of one run (§4.7): a denormalized snapshot carrying
//! git context and per-task history stats alongside the scheduler's own
//! terminal status, so a later reader never has to join back against the
//! scheduler's in-memory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sykli_scheduler::{OverallStatus, TaskStatus};

/// One task's entry within a [`Run`], enriched with the fields only
/// run history can compute: streak and likely cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskEntry {
    pub name: String,
    pub status: TaskStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub cached: bool,
    pub error_message: Option<String>,
    pub inputs: Vec<String>,
    /// Consecutive passes (cache hits count), reset to 0 on failure, held
    /// steady across skipped/blocked runs.
    pub streak: u32,
    /// Files changed since the last good run that also match this task's
    /// `inputs` globs. Only ever set on a failed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likely_cause: Option<Vec<String>>,
    /// Set when `verify: cross_platform` actually ran this task on a peer
    /// target; carried through from the task record, never computed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_on: Option<String>,
}

/// Tally of this run's cross-node verification attempts (§3's Run data
/// model). `entries` counts every task whose `verify` policy made it
/// eligible and that actually executed; `skipped` counts entries with no
/// peer to verify against (strict mode, see [`crate::verification`]).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationSummary {
    pub entries: u32,
    pub skipped: u32,
    pub passed: u32,
    pub failed: u32,
}

/// An append-only record of one scheduler run (§4.7), also doubling as the
/// "Occurrence" the in-memory ring keeps warm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub git_ref: String,
    pub git_branch: String,
    pub tasks: Vec<RunTaskEntry>,
    pub overall: OverallStatus,
    /// `None` when no task in the run was verification-eligible; otherwise
    /// whether every attempted entry came back free of a verification
    /// failure (a strict-mode skip does not count as a failure).
    pub verified: Option<bool>,
    pub verification: VerificationSummary,
}

impl Run {
    pub fn passed(&self) -> bool {
        matches!(self.overall, OverallStatus::Passed)
    }
}

/// An in-memory run snapshot kept by the [`crate::occurrence::OccurrenceStore`].
/// A `Run` already is the "denormalized run record with git context and
/// per-task history stats" the spec calls an Occurrence.
pub type Occurrence = Run;
