// SPDX-License-Identifier: MIT OR Apache-2.0
//! `RunHistory`: append-only JSON run records under `.sykli/history/`
//! (§4.7). Filenames are `<timestamp>-<id>.json`; the timestamp prefix
//! keeps lexical and chronological directory order in lockstep so `list`
//! never needs to parse every record just to sort them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::warn;
use ulid::Ulid;

use sykli_core::Graph;
use sykli_scheduler::RunReport;

use crate::error::HistoryError;
use crate::likely_cause;
use crate::record::{Run, RunTaskEntry};
use crate::streak;
use crate::verification;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct RunHistory {
    root: PathBuf,
}

impl RunHistory {
    /// Opens (creating if absent) `.sykli/history` under `workspace_root`.
    pub fn open(workspace_root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let root = workspace_root.into().join(".sykli").join("history");
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, HistoryError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn read_run(path: &Path) -> Option<Run> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(run) => Some(run),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping corrupt run record");
                None
            }
        }
    }

    /// Compute streaks, likely causes, and verification tallies for
    /// `report` against this history's prior state and `graph`'s declared
    /// `verify` policies, then persist the resulting [`Run`].
    ///
    /// `repo_path` is the git working copy the run executed against, used
    /// to diff against the last good run's `git_ref`.
    pub fn save(
        &self,
        report: &RunReport,
        graph: &Graph,
        repo_path: &Path,
        git_ref: impl Into<String>,
        git_branch: impl Into<String>,
    ) -> Result<Run, HistoryError> {
        let previous_streaks: BTreeMap<String, u32> = self
            .load_latest()?
            .map(|run| run.tasks.into_iter().map(|t| (t.name, t.streak)).collect())
            .unwrap_or_default();

        let last_good = self.load_last_good()?;
        let changed = match &last_good {
            Some(good) => sykli_git::changed_paths(repo_path, &good.git_ref).unwrap_or_default(),
            None => Vec::new(),
        };

        let mut tasks = Vec::with_capacity(report.tasks.len());
        for task in &report.tasks {
            let prev_streak = previous_streaks.get(&task.name).copied().unwrap_or(0);
            let likely_cause = if task.status.is_failure() {
                likely_cause::correlate(&changed, &task.inputs)?
            } else {
                None
            };
            tasks.push(RunTaskEntry {
                name: task.name.clone(),
                status: task.status,
                duration_ms: task.duration_ms,
                cached: task.cached,
                error_message: task.error_message.clone(),
                inputs: task.inputs.clone(),
                streak: streak::next_streak(prev_streak, task.status),
                likely_cause,
                verified_on: None,
            });
        }

        let verification = verification::summarize(graph, report.tasks.iter().map(|t| (t.name.as_str(), t.status)));
        let verified = verification::verified_flag(&verification);

        let run = Run {
            id: Ulid::new().to_string(),
            timestamp: Utc::now(),
            git_ref: git_ref.into(),
            git_branch: git_branch.into(),
            tasks,
            overall: report.overall,
            verified,
            verification,
        };

        self.write(&run)?;
        Ok(run)
    }

    fn write(&self, run: &Run) -> Result<(), HistoryError> {
        let filename = format!("{}-{}.json", run.timestamp.format("%Y%m%dT%H%M%S%.3fZ"), run.id);
        let path = self.root.join(filename);
        let bytes = serde_json::to_vec_pretty(run).expect("Run serializes infallibly");

        let unique = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{unique}", std::process::id()));
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// The `limit` most recent runs, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<Run>, HistoryError> {
        let mut paths = self.entry_paths()?;
        paths.reverse();
        Ok(paths.into_iter().take(limit).filter_map(|p| Self::read_run(&p)).collect())
    }

    pub fn load_latest(&self) -> Result<Option<Run>, HistoryError> {
        Ok(self.list(1)?.into_iter().next())
    }

    /// The most recent run whose overall status was `passed`, scanning
    /// backward from the newest record.
    pub fn load_last_good(&self) -> Result<Option<Run>, HistoryError> {
        let mut paths = self.entry_paths()?;
        paths.reverse();
        for path in paths {
            if let Some(run) = Self::read_run(&path) {
                if run.passed() {
                    return Ok(Some(run));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_scheduler::{OverallStatus, TaskRecord, TaskStatus};

    fn report(overall: OverallStatus, tasks: Vec<TaskRecord>) -> RunReport {
        RunReport { run_id: "run1".to_string(), tasks, overall, timed_out: false }
    }

    fn empty_graph() -> Graph {
        Graph::new(std::collections::BTreeMap::new(), std::collections::BTreeMap::new())
    }

    #[test]
    fn save_then_load_latest_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();
        let tasks = vec![TaskRecord::new("build", TaskStatus::Passed, vec![]).with_duration_ms(10)];
        let saved = history.save(&report(OverallStatus::Passed, tasks), &empty_graph(), dir.path(), "abc123", "main").unwrap();

        let latest = history.load_latest().unwrap().unwrap();
        assert_eq!(latest.id, saved.id);
        assert_eq!(latest.tasks[0].streak, 1);
        assert_eq!(latest.verified, None);
        assert_eq!(latest.verification, crate::record::VerificationSummary::default());
    }

    #[test]
    fn streak_extends_across_consecutive_passing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();

        for _ in 0..3 {
            let tasks = vec![TaskRecord::new("build", TaskStatus::Passed, vec![])];
            history.save(&report(OverallStatus::Passed, tasks), &empty_graph(), dir.path(), "abc123", "main").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let latest = history.load_latest().unwrap().unwrap();
        assert_eq!(latest.tasks[0].streak, 3);
    }

    #[test]
    fn failure_resets_the_streak_for_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();

        let passing = vec![TaskRecord::new("build", TaskStatus::Passed, vec![])];
        history.save(&report(OverallStatus::Passed, passing), &empty_graph(), dir.path(), "abc123", "main").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        let failing = vec![TaskRecord::new("build", TaskStatus::Failed, vec![])];
        history.save(&report(OverallStatus::Failed, failing), &empty_graph(), dir.path(), "def456", "main").unwrap();

        let latest = history.load_latest().unwrap().unwrap();
        assert_eq!(latest.tasks[0].streak, 0);
    }

    #[test]
    fn load_last_good_skips_a_more_recent_failure() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();

        let good = vec![TaskRecord::new("build", TaskStatus::Passed, vec![])];
        let good_run = history.save(&report(OverallStatus::Passed, good), &empty_graph(), dir.path(), "abc123", "main").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        let bad = vec![TaskRecord::new("build", TaskStatus::Failed, vec![])];
        history.save(&report(OverallStatus::Failed, bad), &empty_graph(), dir.path(), "def456", "main").unwrap();

        let last_good = history.load_last_good().unwrap().unwrap();
        assert_eq!(last_good.id, good_run.id);
    }

    #[test]
    fn list_returns_newest_first_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();
        for i in 0..5 {
            let tasks = vec![TaskRecord::new("build", TaskStatus::Passed, vec![])];
            history.save(&report(OverallStatus::Passed, tasks), &empty_graph(), dir.path(), format!("rev{i}"), "main").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let recent = history.list(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].git_ref, "rev4");
        assert_eq!(recent[1].git_ref, "rev3");
    }

    #[test]
    fn empty_history_has_no_latest_or_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path()).unwrap();
        assert!(history.load_latest().unwrap().is_none());
        assert!(history.load_last_good().unwrap().is_none());
    }
}
