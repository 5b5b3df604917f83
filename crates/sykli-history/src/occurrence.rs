// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory Occurrence ring (§4.7): a 50-slot window over the most
//! recent runs, hydrated from disk on startup. Writes are serialized by
//! `&self` taking the write lock only to swap in a new snapshot; reads take
//! a clone of the `Arc` and never block on a writer, which is all the
//! concurrency this needs at a few runs a minute — not enough traffic to
//! justify a third-party lock beyond the standard library's.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sykli_scheduler::TaskStatus;

use crate::error::HistoryError;
use crate::record::Occurrence;
use crate::store::RunHistory;

const CAPACITY: usize = 50;

/// A single task's coarse outcome, as returned by [`OccurrenceStore::recent_outcomes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

impl Outcome {
    fn from_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Passed | TaskStatus::Cached => Outcome::Pass,
            TaskStatus::Failed => Outcome::Fail,
            TaskStatus::Skipped | TaskStatus::Blocked => Outcome::Skip,
        }
    }
}

pub struct OccurrenceStore {
    slots: RwLock<Arc<Vec<Occurrence>>>,
}

impl OccurrenceStore {
    /// Load the most recent [`CAPACITY`] runs from `history`, oldest first,
    /// so the ring's append order matches the order they actually ran in.
    pub fn hydrate(history: &RunHistory) -> Result<Self, HistoryError> {
        let mut runs = history.list(CAPACITY)?;
        runs.reverse();
        Ok(Self { slots: RwLock::new(Arc::new(runs)) })
    }

    fn snapshot(&self) -> Arc<Vec<Occurrence>> {
        Arc::clone(&self.slots.read().expect("occurrence lock poisoned"))
    }

    /// Append a newly-saved run, evicting the oldest slot once past capacity.
    pub fn record(&self, occurrence: Occurrence) {
        let mut guard = self.slots.write().expect("occurrence lock poisoned");
        let mut next = (**guard).clone();
        next.push(occurrence);
        if next.len() > CAPACITY {
            let overflow = next.len() - CAPACITY;
            next.drain(0..overflow);
        }
        *guard = Arc::new(next);
    }

    pub fn get_latest(&self) -> Option<Occurrence> {
        self.snapshot().last().cloned()
    }

    /// The `limit` most recent occurrences, newest first, optionally
    /// filtered to a single overall status.
    pub fn list(&self, limit: usize, status: Option<sykli_scheduler::OverallStatus>) -> Vec<Occurrence> {
        self.snapshot()
            .iter()
            .rev()
            .filter(|run| status.map(|s| run.overall == s).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// The last `n` outcomes for `task`, newest first.
    pub fn recent_outcomes(&self, task: &str, n: usize) -> Vec<Outcome> {
        self.snapshot()
            .iter()
            .rev()
            .filter_map(|run| run.tasks.iter().find(|t| t.name == task))
            .take(n)
            .map(|entry| Outcome::from_status(entry.status))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_scheduler::{OverallStatus, TaskRecord};

    fn bare_run(id: &str, overall: OverallStatus, task_status: TaskStatus) -> Occurrence {
        use crate::record::RunTaskEntry;
        Occurrence {
            id: id.to_string(),
            timestamp: chrono::Utc::now(),
            git_ref: "abc".to_string(),
            git_branch: "main".to_string(),
            tasks: vec![RunTaskEntry {
                name: "build".to_string(),
                status: task_status,
                duration_ms: 1,
                cached: false,
                error_message: None,
                inputs: vec![],
                streak: 0,
                likely_cause: None,
                verified_on: None,
            }],
            overall,
            verified: None,
            verification: crate::record::VerificationSummary::default(),
        }
    }

    fn empty_store() -> OccurrenceStore {
        OccurrenceStore { slots: RwLock::new(Arc::new(Vec::new())) }
    }

    #[test]
    fn record_then_get_latest_returns_the_newest() {
        let store = empty_store();
        store.record(bare_run("1", OverallStatus::Passed, TaskStatus::Passed));
        store.record(bare_run("2", OverallStatus::Failed, TaskStatus::Failed));
        assert_eq!(store.get_latest().unwrap().id, "2");
    }

    #[test]
    fn ring_evicts_the_oldest_slot_past_capacity() {
        let store = empty_store();
        for i in 0..(CAPACITY + 5) {
            store.record(bare_run(&i.to_string(), OverallStatus::Passed, TaskStatus::Passed));
        }
        let all = store.list(CAPACITY + 5, None);
        assert_eq!(all.len(), CAPACITY);
        assert_eq!(all.last().unwrap().id, "5");
    }

    #[test]
    fn list_filters_by_overall_status() {
        let store = empty_store();
        store.record(bare_run("1", OverallStatus::Passed, TaskStatus::Passed));
        store.record(bare_run("2", OverallStatus::Failed, TaskStatus::Failed));
        store.record(bare_run("3", OverallStatus::Passed, TaskStatus::Passed));

        let failed_only = store.list(10, Some(OverallStatus::Failed));
        assert_eq!(failed_only.len(), 1);
        assert_eq!(failed_only[0].id, "2");
    }

    #[test]
    fn recent_outcomes_maps_cached_and_blocked() {
        let store = empty_store();
        store.record(bare_run("1", OverallStatus::Passed, TaskStatus::Cached));
        store.record(bare_run("2", OverallStatus::Failed, TaskStatus::Failed));
        store.record(bare_run("3", OverallStatus::Passed, TaskStatus::Blocked));

        let outcomes = store.recent_outcomes("build", 3);
        assert_eq!(outcomes, vec![Outcome::Skip, Outcome::Fail, Outcome::Pass]);
    }
}
