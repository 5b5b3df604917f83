// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run history and the Occurrence ring (§4.7): append-only JSON run
//! records, per-task streak computation, likely-cause git-diff
//! correlation, and a 50-slot in-memory window over the most recent runs.

mod error;
mod likely_cause;
mod occurrence;
mod record;
mod store;
mod streak;
mod verification;

pub use error::HistoryError;
pub use occurrence::{Outcome, OccurrenceStore};
pub use record::{Occurrence, Run, RunTaskEntry, VerificationSummary};
pub use store::RunHistory;
