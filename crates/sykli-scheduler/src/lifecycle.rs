// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-task lifecycle (§4.2 step list): condition check, predecessor
//! gating, cache lookup, artifact staging, credential exchange, gate check,
//! execution with retry/backoff, cache write, and event emission.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use serde_json::json;
use sykli_cache::{Cache, MissReason};
use sykli_core::{CloudProvider, CredentialBinding, Graph, Task, TargetKind};
use sykli_events::{Event, EventBus, EventType};
use sykli_gate::{run_gate, GateConfig};
use sykli_runtime::{CancellationToken, OutputStream};
use sykli_target::{CredentialExchanger, PrepareContext, RunOptions, Target};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::artifact::stage_task_inputs;
use crate::backoff;
use crate::caching::{self, CacheKey};
use crate::error::SchedulerError;
use crate::mounts::resolve_mounts;
use crate::status::{TaskRecord, TaskStatus};

/// Bound on the output channel between the runtime tee and the event
/// forwarder: enough slack that a bursty task doesn't stall on every
/// chunk, without buffering an unbounded amount of unread log output.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Shared, per-run services every task's lifecycle call draws on.
///
/// Every field is an owned `Arc` (or otherwise cheap to clone) so a context
/// can be cloned into a spawned `JoinSet` task without borrowing from the
/// scheduler's stack frame.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub graph: Arc<Graph>,
    pub workdir: std::path::PathBuf,
    pub cache: Arc<Cache>,
    pub bus: Arc<EventBus>,
    pub targets: Arc<HashMap<TargetKind, Arc<dyn Target>>>,
    pub prepared: Arc<HashMap<TargetKind, PrepareContext>>,
    pub exchangers: Arc<HashMap<CloudProvider, Arc<dyn CredentialExchanger>>>,
    pub http: reqwest::Client,
    pub condition_ctx: Arc<sykli_condition::Context>,
    pub cancel: CancellationToken,
}

fn target_kind(task: &Task) -> TargetKind {
    task.target.unwrap_or(TargetKind::Local)
}

async fn exchange_credentials(
    ctx: &RunContext,
    binding: &CredentialBinding,
    task_name: &str,
) -> Result<BTreeMap<String, String>, SchedulerError> {
    let exchanger = ctx.exchangers.get(&binding.provider).ok_or_else(|| SchedulerError::NoTargetAvailable {
        task: task_name.to_string(),
        target: format!("{:?}", binding.provider),
    })?;
    let oidc_token = sykli_target::ci_oidc_token(&ctx.http).await?;
    let credential = exchanger.exchange(binding, &oidc_token).await?;
    ctx.bus.publish(Event::new(
        EventType::CredentialExchange,
        ctx.run_id.clone(),
        task_name,
        json!({ "provider": format!("{:?}", binding.provider).to_lowercase() }),
    ));
    Ok(credential.env)
}

async fn run_gate_task(ctx: &RunContext, task: &Task) -> TaskStatus {
    let spec = task.gate.as_ref().expect("is_gate() guarantees this");
    let config = GateConfig {
        strategy: Some(match spec.strategy {
            sykli_core::GateStrategy::Prompt => sykli_gate::GateStrategy::Prompt,
            sykli_core::GateStrategy::Env => sykli_gate::GateStrategy::Env,
            sykli_core::GateStrategy::File => sykli_gate::GateStrategy::File,
            sykli_core::GateStrategy::Webhook => sykli_gate::GateStrategy::Webhook,
        }),
        timeout_seconds: Some(spec.timeout_seconds),
        message: spec.message.clone(),
        env_var: spec.env_var.clone(),
        file_path: spec.file_path.clone(),
    };
    match run_gate(&config, &ctx.run_id, &task.name, &ctx.bus, &ctx.cancel, None).await {
        Ok(outcome) if outcome.passed() => TaskStatus::Passed,
        Ok(_) => TaskStatus::Failed,
        Err(err) => {
            warn!(task = %task.name, error = %err, "gate configuration error");
            TaskStatus::Failed
        }
    }
}

/// Attempt execution, retrying `task.retry` additional times with
/// exponential backoff between attempts.
async fn execute_with_retry(
    ctx: &RunContext,
    task: &Task,
    env: &BTreeMap<String, String>,
) -> Result<(TaskStatus, Option<String>), SchedulerError> {
    let kind = target_kind(task);
    let target = ctx
        .targets
        .get(&kind)
        .ok_or_else(|| SchedulerError::NoTargetAvailable { task: task.name.clone(), target: format!("{kind:?}") })?;
    let prepared = ctx.prepared.get(&kind).cloned().unwrap_or(PrepareContext::Local);

    let mounts = resolve_mounts(&ctx.workdir, &task.mounts, ctx.graph.resources());
    let timeout = task.timeout_seconds.map(std::time::Duration::from_secs);

    let (output_tx, forward_handle) = spawn_output_forwarder(ctx, &task.name);

    let mut attempt = 0u32;
    let result = loop {
        let opts = RunOptions {
            workdir: ctx.workdir.clone(),
            env: env.clone(),
            mounts: mounts.clone(),
            network: None,
            timeout,
            output_tx: Some(output_tx.clone()),
            job_name: format!("sykli-{}-{}", ctx.run_id, task.name),
        };
        let outcome = match target.run_task(task, &opts, &prepared, &ctx.cancel).await {
            Ok(outcome) => outcome,
            Err(err) => break Err(SchedulerError::from(err)),
        };
        if outcome.succeeded() {
            break Ok((TaskStatus::Passed, None));
        }
        if outcome.cancelled {
            break Ok((TaskStatus::Failed, Some("cancelled".to_string())));
        }
        if attempt >= task.retry {
            let reason = if outcome.timed_out {
                "timed out".to_string()
            } else {
                format!("exited with status {:?}", outcome.exit_code)
            };
            break Ok((TaskStatus::Failed, Some(reason)));
        }
        attempt += 1;
        let delay = backoff::delay_for(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.cancel.cancelled() => break Ok((TaskStatus::Failed, Some("cancelled".to_string()))),
        }
    };

    // Drop the sender so the forwarder's `recv` loop ends once every clone
    // handed to the runtime backend has also been dropped, then let it
    // flush whatever is left in the channel before we return.
    drop(output_tx);
    let _ = forward_handle.await;

    result
}

/// Spawn the task that drains a runtime backend's output channel onto the
/// event bus as `task_output` events (§4.2 step 9, §4.5.4).
fn spawn_output_forwarder(
    ctx: &RunContext,
    task_name: &str,
) -> (mpsc::Sender<(OutputStream, Vec<u8>)>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<(OutputStream, Vec<u8>)>(OUTPUT_CHANNEL_CAPACITY);
    let bus = Arc::clone(&ctx.bus);
    let run_id = ctx.run_id.clone();
    let task_name = task_name.to_string();
    let handle = tokio::spawn(async move {
        while let Some((stream, chunk)) = rx.recv().await {
            let stream_label = match stream {
                OutputStream::Stdout => "stdout",
                OutputStream::Stderr => "stderr",
            };
            bus.publish(Event::new(
                EventType::TaskOutput,
                run_id.clone(),
                task_name.clone(),
                json!({
                    "stream": stream_label,
                    "data": base64::engine::general_purpose::STANDARD.encode(&chunk),
                }),
            ));
        }
    });
    (tx, handle)
}

/// Drive one task through its full lifecycle and return its record.
///
/// `completed` holds every task in an earlier scheduling level; topological
/// leveling guarantees every predecessor of `task` is already present.
pub async fn run_task(ctx: &RunContext, task: &Task, completed: &HashMap<String, TaskStatus>) -> TaskRecord {
    let start = Instant::now();
    ctx.bus.publish(Event::new(EventType::TaskStarted, ctx.run_id.clone(), task.name.clone(), json!({})));

    let record = run_task_inner(ctx, task, completed).await;
    let (status, error_message) = match record {
        Ok(r) => r,
        Err(err) => (TaskStatus::Failed, Some(err.to_string())),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    ctx.bus.publish(Event::new(
        EventType::TaskCompleted,
        ctx.run_id.clone(),
        task.name.clone(),
        json!({
            "outcome": if status.is_failure() { "failed" } else { "succeeded" },
            "status": status.as_str(),
            "duration_ms": duration_ms,
        }),
    ));

    let mut out = TaskRecord::new(task.name.clone(), status, task.inputs.clone()).with_duration_ms(duration_ms);
    if let Some(msg) = error_message {
        out = out.with_error(msg);
    }
    out
}

async fn run_task_inner(
    ctx: &RunContext,
    task: &Task,
    completed: &HashMap<String, TaskStatus>,
) -> Result<(TaskStatus, Option<String>), SchedulerError> {
    // Step 1: condition check.
    if let Some(expr) = &task.condition {
        if !sykli_condition::evaluate(expr, &ctx.condition_ctx)? {
            return Ok((TaskStatus::Skipped, None));
        }
    }

    // Step 2: predecessor gating. A failed or blocked predecessor blocks
    // this task; a skipped one does not poison it.
    for dep in &task.depends_on {
        match completed.get(dep) {
            Some(TaskStatus::Failed) | Some(TaskStatus::Blocked) => return Ok((TaskStatus::Blocked, None)),
            _ => {}
        }
    }

    // Step 3: cache lookup, only for tasks that declare cache-relevant inputs.
    let cache_key: Option<CacheKey> = if !task.inputs.is_empty() {
        Some(caching::compute_cache_key(caching::sykli_version(), &ctx.workdir, task)?)
    } else {
        None
    };
    if let Some(key) = &cache_key {
        match caching::lookup(&ctx.cache, key) {
            Ok(entry) => {
                caching::restore_outputs(&ctx.cache, &entry, &ctx.workdir)?;
                info!(task = %task.name, "cache hit");
                return Ok((TaskStatus::Cached, None));
            }
            Err(reason) => {
                if reason != MissReason::NoCache {
                    info!(task = %task.name, reason = reason.as_str(), "cache miss");
                }
            }
        }
    }

    // Gate tasks never execute a command: the gate state machine decides
    // their status directly.
    if task.is_gate() {
        return Ok((run_gate_task(ctx, task).await, None));
    }

    // Step 4: artifact staging.
    stage_task_inputs(&ctx.workdir, task, &ctx.graph)?;

    // Step 5: credential exchange.
    let mut env = task.env.clone();
    if let Some(binding) = &task.credential_binding {
        let exchanged = exchange_credentials(ctx, binding, &task.name).await?;
        env.extend(exchanged);
    }

    // Steps 7-8: execution with retry, then cache write on success.
    let started = Instant::now();
    let (status, message) = execute_with_retry(ctx, task, &env).await?;
    if status == TaskStatus::Passed {
        if let Some(key) = &cache_key {
            let duration_ms = started.elapsed().as_millis() as u64;
            caching::store_outputs(&ctx.cache, &ctx.workdir, task, key, duration_ms)?;
        }
    }
    Ok((status, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::path::Path;
    use sykli_target::TaskOutcome;

    struct AlwaysPasses;

    #[async_trait]
    impl Target for AlwaysPasses {
        fn name(&self) -> &'static str {
            "test"
        }
        async fn available(&self) -> bool {
            true
        }
        async fn prepare(&self, _workdir: &Path) -> Result<PrepareContext, sykli_target::TargetError> {
            Ok(PrepareContext::Local)
        }
        async fn run_task(
            &self,
            _task: &Task,
            _opts: &RunOptions,
            _context: &PrepareContext,
            _cancel: &CancellationToken,
        ) -> Result<TaskOutcome, sykli_target::TargetError> {
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

    #[allow(clippy::too_many_arguments)]
    fn context(
        run_id: &str,
        graph: Graph,
        workdir: &Path,
        cache: Cache,
        bus: EventBus,
        targets: HashMap<TargetKind, Arc<dyn Target>>,
        prepared: HashMap<TargetKind, PrepareContext>,
        exchangers: HashMap<CloudProvider, Arc<dyn CredentialExchanger>>,
        http: reqwest::Client,
        condition_ctx: sykli_condition::Context,
        cancel: CancellationToken,
    ) -> RunContext {
        RunContext {
            run_id: run_id.to_string(),
            graph: Arc::new(graph),
            workdir: workdir.to_path_buf(),
            cache: Arc::new(cache),
            bus: Arc::new(bus),
            targets: Arc::new(targets),
            prepared: Arc::new(prepared),
            exchangers: Arc::new(exchangers),
            http,
            condition_ctx: Arc::new(condition_ctx),
            cancel,
        }
    }

    #[tokio::test]
    async fn condition_false_skips_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();
        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysPasses));
        let prepared = HashMap::new();
        let exchangers = HashMap::new();
        let http = reqwest::Client::new();
        let cond_ctx = sykli_condition::Context::default();
        let cancel = CancellationToken::new();

        let mut task = bare_task("t");
        task.condition = Some("branch == \"never\"".to_string());
        let mut tasks = BTreeMap::new();
        tasks.insert("t".to_string(), task.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        let ctx = context("run1", graph, dir.path(), cache, bus, targets, prepared, exchangers, http, cond_ctx, cancel);
        let completed = HashMap::new();
        let record = run_task(&ctx, &task, &completed).await;
        assert_eq!(record.status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn failed_predecessor_blocks_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();
        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysPasses));
        let prepared = HashMap::new();
        let exchangers = HashMap::new();
        let http = reqwest::Client::new();
        let cond_ctx = sykli_condition::Context::default();
        let cancel = CancellationToken::new();

        let mut task = bare_task("after");
        task.depends_on.insert("before".to_string());
        let mut tasks = BTreeMap::new();
        tasks.insert("before".to_string(), bare_task("before"));
        tasks.insert("after".to_string(), task.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        let ctx = context("run1", graph, dir.path(), cache, bus, targets, prepared, exchangers, http, cond_ctx, cancel);
        let mut completed = HashMap::new();
        completed.insert("before".to_string(), TaskStatus::Failed);
        let record = run_task(&ctx, &task, &completed).await;
        assert_eq!(record.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn skipped_predecessor_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();
        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysPasses));
        let prepared = HashMap::new();
        let exchangers = HashMap::new();
        let http = reqwest::Client::new();
        let cond_ctx = sykli_condition::Context::default();
        let cancel = CancellationToken::new();

        let mut task = bare_task("after");
        task.depends_on.insert("before".to_string());
        let mut tasks = BTreeMap::new();
        tasks.insert("before".to_string(), bare_task("before"));
        tasks.insert("after".to_string(), task.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        let ctx = context("run1", graph, dir.path(), cache, bus, targets, prepared, exchangers, http, cond_ctx, cancel);
        let mut completed = HashMap::new();
        completed.insert("before".to_string(), TaskStatus::Skipped);
        let record = run_task(&ctx, &task, &completed).await;
        assert_eq!(record.status, TaskStatus::Passed);
    }

    #[tokio::test]
    async fn cache_hit_restores_outputs_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(cache_dir.path()).unwrap();
        let bus = EventBus::new();
        let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
        targets.insert(TargetKind::Local, Arc::new(AlwaysPasses));
        let prepared = HashMap::new();
        let exchangers = HashMap::new();
        let http = reqwest::Client::new();
        let cond_ctx = sykli_condition::Context::default();
        let cancel = CancellationToken::new();

        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        let mut task = bare_task("build");
        task.inputs = vec!["a.txt".to_string()];
        task.outputs.insert("out".to_string(), "a.txt".to_string());

        let key = caching::compute_cache_key(caching::sykli_version(), dir.path(), &task).unwrap();
        caching::store_outputs(&cache, dir.path(), &task, &key, 5).unwrap();

        let mut tasks = BTreeMap::new();
        tasks.insert("build".to_string(), task.clone());
        let graph = Graph::new(tasks, BTreeMap::new());

        let ctx = context("run1", graph, dir.path(), cache, bus, targets, prepared, exchangers, http, cond_ctx, cancel);
        let completed = HashMap::new();
        let record = run_task(&ctx, &task, &completed).await;
        assert_eq!(record.status, TaskStatus::Cached);
        assert!(record.cached);
    }
}
