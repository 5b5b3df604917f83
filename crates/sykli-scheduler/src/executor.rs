// SPDX-License-Identifier: MIT OR Apache-2.0
//! Level-parallel execution of a built [`Graph`] (§4.3): every task in a
//! scheduling level runs concurrently, capped at a configurable
//! parallelism limit, with a global run timeout that cancels all
//! in-flight work.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::json;
use sykli_core::{CloudProvider, Graph, TargetKind};
use sykli_events::{Event, EventBus, EventType};
use sykli_runtime::CancellationToken;
use sykli_target::{CredentialExchanger, PrepareContext, Target};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::SchedulerError;
use crate::lifecycle::{self, RunContext};
use crate::status::{RunReport, TaskRecord, TaskStatus};

/// Default cap on concurrently running tasks when [`ScheduleOptions::parallelism`]
/// is left unset: logical CPU count, doubled to account for I/O-bound tasks.
fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) * 2
}

pub struct ScheduleOptions {
    pub parallelism: Option<usize>,
    pub global_timeout: Option<std::time::Duration>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self { parallelism: None, global_timeout: None }
    }
}

pub struct Scheduler {
    graph: Arc<Graph>,
    levels: Vec<Vec<String>>,
    workdir: std::path::PathBuf,
    cache: Arc<sykli_cache::Cache>,
    bus: Arc<EventBus>,
    targets: Arc<HashMap<TargetKind, Arc<dyn Target>>>,
    exchangers: Arc<HashMap<CloudProvider, Arc<dyn CredentialExchanger>>>,
    http: reqwest::Client,
    condition_ctx: Arc<sykli_condition::Context>,
    options: ScheduleOptions,
}

impl Scheduler {
    pub fn new(
        graph: Graph,
        levels: Vec<Vec<String>>,
        workdir: std::path::PathBuf,
        cache: sykli_cache::Cache,
        bus: EventBus,
        targets: HashMap<TargetKind, Arc<dyn Target>>,
        exchangers: HashMap<CloudProvider, Arc<dyn CredentialExchanger>>,
        condition_ctx: sykli_condition::Context,
        options: ScheduleOptions,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            levels,
            workdir,
            cache: Arc::new(cache),
            bus: Arc::new(bus),
            targets: Arc::new(targets),
            exchangers: Arc::new(exchangers),
            http: reqwest::Client::new(),
            condition_ctx: Arc::new(condition_ctx),
            options,
        }
    }

    /// Run every level of the graph in order, fanning out within a level up
    /// to the configured parallelism cap. Returns as soon as the global
    /// timeout elapses or every level has been driven to completion.
    pub async fn run(&self, run_id: &str) -> Result<RunReport, SchedulerError> {
        let cancel = CancellationToken::new();
        let parallelism = self.options.parallelism.unwrap_or_else(default_parallelism).max(1);
        let mut prepared: HashMap<TargetKind, PrepareContext> = HashMap::new();
        for (kind, target) in self.targets.iter() {
            prepared.insert(*kind, target.prepare(&self.workdir).await?);
        }
        let prepared = Arc::new(prepared);

        let base_ctx = RunContext {
            run_id: run_id.to_string(),
            graph: Arc::clone(&self.graph),
            workdir: self.workdir.clone(),
            cache: Arc::clone(&self.cache),
            bus: Arc::clone(&self.bus),
            targets: Arc::clone(&self.targets),
            prepared,
            exchangers: Arc::clone(&self.exchangers),
            http: self.http.clone(),
            condition_ctx: Arc::clone(&self.condition_ctx),
            cancel: cancel.clone(),
        };

        let mut completed: HashMap<String, TaskStatus> = HashMap::new();
        let mut records: Vec<TaskRecord> = Vec::new();
        let mut timed_out = false;

        self.bus.publish(Event::new(EventType::RunStarted, run_id.to_string(), "", json!({})));

        let run_future = self.run_levels(&base_ctx, &cancel, parallelism, &mut completed, &mut records);
        match self.options.global_timeout {
            Some(timeout) => {
                tokio::select! {
                    result = run_future => result?,
                    _ = tokio::time::sleep(timeout) => {
                        timed_out = true;
                        cancel.cancel();
                    }
                }
            }
            None => run_future.await?,
        }

        let overall = RunReport::overall_from(&records);
        self.bus.publish(Event::new(
            EventType::RunCompleted,
            run_id.to_string(),
            "",
            json!({ "overall": overall, "timed_out": timed_out }),
        ));
        Ok(RunReport { run_id: run_id.to_string(), tasks: records, overall, timed_out })
    }

    async fn run_levels(
        &self,
        base_ctx: &RunContext,
        cancel: &CancellationToken,
        parallelism: usize,
        completed: &mut HashMap<String, TaskStatus>,
        records: &mut Vec<TaskRecord>,
    ) -> Result<(), SchedulerError> {
        for level in &self.levels {
            if cancel.is_cancelled() {
                break;
            }
            // FIFO sub-batching: only `parallelism` tasks from this level are
            // ever in flight at once, regardless of the level's own size.
            for batch in level.chunks(parallelism) {
                if cancel.is_cancelled() {
                    break;
                }
                let mut joinset: JoinSet<TaskRecord> = JoinSet::new();
                for name in batch {
                    let task = self.graph.task(name).expect("level name comes from this graph's own topological sort").clone();
                    let snapshot = completed.clone();
                    let ctx = base_ctx.clone();
                    joinset.spawn(async move { lifecycle::run_task(&ctx, &task, &snapshot).await });
                }
                while let Some(result) = joinset.join_next().await {
                    match result {
                        Ok(record) => {
                            completed.insert(record.name.clone(), record.status);
                            records.push(record);
                        }
                        Err(join_err) => {
                            warn!(error = %join_err, "task panicked");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use sykli_core::Task;
    use sykli_target::{RunOptions, TargetError, TaskOutcome};

    struct AlwaysPasses;

    #[async_trait]
    impl Target for AlwaysPasses {
        fn name(&self) -> &'static str {
            "test"
        }
        async fn available(&self) -> bool {
            true
        }
        async fn prepare(&self, _workdir: &std::path::Path) -> Result<PrepareContext, TargetError> {
            Ok(PrepareContext::Local)
        }
        async fn run_task(
            &self,
            _task: &Task,
            _opts: &RunOptions,
            _context: &PrepareContext,
            _cancel: &CancellationToken,
        ) -> Result<TaskOutcome, TargetError> {
            Ok(TaskOutcome { exit_code: Some(0), timed_out: false, cancelled: false, tail: Vec::new(), duration: std::time::Duration::from_millis(1) })
        }
    }

    fn bare_task(name: &str) -> Task {
        Task {
            name: name.to_string(),
            command: Some("true".to_string()),
            container: None,
            workdir: None,
            env: BTreeMap::new(),
            timeout_seconds: None,
            retry: 0,
            inputs: Vec::new(),
            outputs: BTreeMap::new(),
            task_inputs: Vec::new(),
            depends_on: BTreeSet::new(),
            condition: None,
            mounts: Vec::new(),
            services: Vec::new(),
            matrix: Default::default(),
            matrix_values: Default::default(),
            secrets: Vec::new(),
            secret_refs: Vec::new(),
            requires: Vec::new(),
            target: None,
            k8s: None,
            semantic: None,
            ai_hooks: None,
            capability: None,
            gate: None,
            credential_binding: None,
            verify: None,
            history_hint: None,
        }
    }

    #[tokio::test]
    async fn runs_two_independent_tasks_and_reports_passed() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = sykli_cache::Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();
        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysPasses));

        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), bare_task("a"));
        tasks.insert("b".to_string(), bare_task("b"));
        let graph = Graph::new(tasks, BTreeMap::new());
        let levels = vec![vec!["a".to_string(), "b".to_string()]];

        let scheduler = Scheduler::new(
            graph,
            levels,
            dir.path().to_path_buf(),
            cache,
            bus,
            targets,
            HashMap::new(),
            sykli_condition::Context::default(),
            ScheduleOptions::default(),
        );

        let report = scheduler.run("run1").await.unwrap();
        assert_eq!(report.tasks.len(), 2);
        assert!(!report.timed_out);
        assert!(matches!(report.overall, crate::status::OverallStatus::Passed));
    }

    #[tokio::test]
    async fn a_failed_predecessor_blocks_its_dependent() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = sykli_cache::Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();

        struct AlwaysFails;
        #[async_trait]
        impl Target for AlwaysFails {
            fn name(&self) -> &'static str {
                "test"
            }
            async fn available(&self) -> bool {
                true
            }
            async fn prepare(&self, _workdir: &std::path::Path) -> Result<PrepareContext, TargetError> {
                Ok(PrepareContext::Local)
            }
            async fn run_task(
                &self,
                _task: &Task,
                _opts: &RunOptions,
                _context: &PrepareContext,
                _cancel: &CancellationToken,
            ) -> Result<TaskOutcome, TargetError> {
                Ok(TaskOutcome { exit_code: Some(1), timed_out: false, cancelled: false, tail: Vec::new(), duration: std::time::Duration::from_millis(1) })
            }
        }

        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysFails));

        let mut dependent = bare_task("after");
        dependent.depends_on.insert("before".to_string());
        let mut tasks = BTreeMap::new();
        tasks.insert("before".to_string(), bare_task("before"));
        tasks.insert("after".to_string(), dependent);
        let graph = Graph::new(tasks, BTreeMap::new());
        let levels = vec![vec!["before".to_string()], vec!["after".to_string()]];

        let scheduler = Scheduler::new(
            graph,
            levels,
            dir.path().to_path_buf(),
            cache,
            bus,
            targets,
            HashMap::new(),
            sykli_condition::Context::default(),
            ScheduleOptions::default(),
        );

        let report = scheduler.run("run1").await.unwrap();
        let after = report.tasks.iter().find(|t| t.name == "after").unwrap();
        assert_eq!(after.status, TaskStatus::Blocked);
        assert!(matches!(report.overall, crate::status::OverallStatus::Failed));
    }
}
