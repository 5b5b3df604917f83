// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations, kept free of `clap` so they can be unit tested
//! directly (mirrors the teacher's split between `main.rs`'s argument
//! parsing and this module's actual work).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sykli_cache::Cache;
use sykli_core::{CloudProvider, Graph, Task, TargetKind};
use sykli_error::{ErrorCode, SykliError};
use sykli_events::EventBus;
use sykli_history::{OccurrenceStore, RunHistory};
use sykli_scheduler::{RunReport, ScheduleOptions, Scheduler};
use sykli_target::{AwsExchanger, AzureExchanger, CredentialExchanger, GcpExchanger, K8sTarget, LocalTarget, Target};

use crate::config::EngineConfig;

/// `--target` selection; only affects which backends the scheduler has
/// available, not a per-task override (each task still picks its own
/// backend from its `target` field, defaulting to local).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChoice {
    Local,
    K8s,
}

impl std::str::FromStr for TargetChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(TargetChoice::Local),
            "k8s" => Ok(TargetChoice::K8s),
            other => Err(format!("unknown target '{other}', expected 'local' or 'k8s'")),
        }
    }
}

pub struct RunArgs {
    pub root: PathBuf,
    pub filter: Option<String>,
    pub target: TargetChoice,
    pub timeout_seconds: Option<u64>,
    pub allow_dirty: bool,
}

/// Parse the project's pipeline file and build the validated graph and its
/// scheduling levels (§4.1, via [`sykli_core::Graph::parse`]).
async fn build_graph(root: &Path) -> Result<(Graph, Vec<Vec<String>>), SykliError> {
    let pipeline = sykli_core::sdk::detect_pipeline_file(root).map_err(SykliError::from)?;
    let stdout = sykli_core::sdk::invoke_sdk(&pipeline, root).await.map_err(SykliError::from)?;
    Graph::parse(&stdout).map_err(SykliError::from)
}

/// Drop tasks (and the levels they leave empty) whose name does not match
/// `pattern`. A CLI-level convenience, not a graph-semantics change:
/// dependency edges onto a filtered-out task are left as-is, so a
/// downstream task that still depends on it will block rather than run.
fn apply_filter(levels: Vec<Vec<String>>, pattern: Option<&str>) -> Result<Vec<Vec<String>>, SykliError> {
    let Some(pattern) = pattern else { return Ok(levels) };
    let mut filtered = Vec::with_capacity(levels.len());
    for level in levels {
        let mut kept = Vec::new();
        for name in level {
            let matches = sykli_glob::single_pattern_matches(pattern, &name)
                .map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;
            if matches {
                kept.push(name);
            }
        }
        if !kept.is_empty() {
            filtered.push(kept);
        }
    }
    Ok(filtered)
}

fn build_targets(choice: TargetChoice) -> Result<HashMap<TargetKind, Arc<dyn Target>>, SykliError> {
    let mut targets: HashMap<TargetKind, Arc<dyn Target>> = HashMap::new();
    targets.insert(TargetKind::Local, Arc::new(LocalTarget::new()));
    if choice == TargetChoice::K8s {
        let k8s = K8sTarget::new(None, false).map_err(|e| SykliError::new(ErrorCode::K8sAuthNotFound, e.to_string()))?;
        targets.insert(TargetKind::K8s, Arc::new(k8s));
    }
    Ok(targets)
}

fn build_exchangers() -> HashMap<CloudProvider, Arc<dyn CredentialExchanger>> {
    let mut exchangers: HashMap<CloudProvider, Arc<dyn CredentialExchanger>> = HashMap::new();
    exchangers.insert(CloudProvider::Aws, Arc::new(AwsExchanger::default()));
    exchangers.insert(CloudProvider::Gcp, Arc::new(GcpExchanger::default()));
    exchangers.insert(CloudProvider::Azure, Arc::new(AzureExchanger::default()));
    exchangers
}

/// Detect which CI platform we're running under from well-known env vars,
/// for the condition DSL's `ci` field.
fn detect_ci_platform() -> Option<String> {
    if std::env::var_os("GITHUB_ACTIONS").is_some() {
        Some("github".to_string())
    } else if std::env::var_os("GITLAB_CI").is_some() {
        Some("gitlab".to_string())
    } else if std::env::var_os("CI").is_some() {
        Some("unknown".to_string())
    } else {
        None
    }
}

fn build_condition_context(root: &Path) -> sykli_condition::Context {
    sykli_condition::Context {
        branch: sykli_git::current_branch(root).ok(),
        tag: std::env::var("SYKLI_GIT_TAG").ok(),
        event: std::env::var("SYKLI_EVENT").ok(),
        ci: detect_ci_platform(),
        env: std::env::vars().collect::<BTreeMap<_, _>>(),
    }
}

/// Runs every reachable task in the graph, persists the result to run
/// history, and returns the process exit code per §6.2's exit table.
pub async fn cmd_run(args: RunArgs, config: &EngineConfig) -> Result<(RunReport, i32), SykliError> {
    if !args.allow_dirty {
        let dirty = sykli_git::is_dirty(&args.root).map_err(|e| SykliError::new(ErrorCode::DirtyWorkdir, e.to_string()))?;
        if dirty {
            return Err(SykliError::new(ErrorCode::DirtyWorkdir, "working copy has uncommitted changes")
                .with_help("pass --allow-dirty to run anyway"));
        }
    }

    let (graph, levels) = build_graph(&args.root).await?;
    let levels = apply_filter(levels, args.filter.as_deref())?;

    let cache = Cache::open(config.cache_root_path()).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))?;
    let bus = EventBus::new();
    let targets = build_targets(args.target)?;
    let exchangers = build_exchangers();
    let condition_ctx = build_condition_context(&args.root);

    let global_timeout = args
        .timeout_seconds
        .or(config.global_timeout_seconds)
        .map(Duration::from_secs);
    let options = ScheduleOptions { parallelism: config.parallelism, global_timeout };

    let graph_for_history = graph.clone();
    let scheduler = Scheduler::new(graph, levels, args.root.clone(), cache, bus, targets, exchangers, condition_ctx, options);

    let run_id = ulid::Ulid::new().to_string();
    let report = scheduler.run(&run_id).await.map_err(SykliError::from)?;

    let history = RunHistory::open(config.history_root_path(&args.root)).map_err(SykliError::from)?;
    let git_ref = sykli_git::head_ref(&args.root).unwrap_or_else(|_| "unknown".to_string());
    let git_branch = sykli_git::current_branch(&args.root).unwrap_or_else(|_| "unknown".to_string());
    let run = history.save(&report, &graph_for_history, &args.root, git_ref, git_branch).map_err(SykliError::from)?;

    let occurrences = OccurrenceStore::hydrate(&history).map_err(SykliError::from)?;
    occurrences.record(run);

    let exit_code = if report.overall == sykli_scheduler::OverallStatus::Passed { 0 } else { 1 };
    Ok((report, exit_code))
}

/// Only runs tasks whose declared `inputs` intersect the git diff against
/// the last good run (§6.2's `delta`); falls back to a full run when there
/// is no prior good run to diff against.
pub async fn cmd_delta(args: RunArgs, config: &EngineConfig) -> Result<(RunReport, i32), SykliError> {
    let history = RunHistory::open(config.history_root_path(&args.root)).map_err(SykliError::from)?;
    let last_good = history.load_last_good().map_err(SykliError::from)?;

    let Some(last_good) = last_good else {
        return cmd_run(args, config).await;
    };

    let changed = sykli_git::changed_paths(&args.root, &last_good.git_ref)
        .map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;

    let (graph, levels) = build_graph(&args.root).await?;
    let mut delta_pattern_matches: HashMap<String, bool> = HashMap::new();
    for name in levels.iter().flatten() {
        let matches = task_touched_by_diff(graph.task(name), &changed)?;
        delta_pattern_matches.insert(name.clone(), matches);
    }

    let narrowed: Vec<Vec<String>> = levels
        .into_iter()
        .map(|level| level.into_iter().filter(|n| delta_pattern_matches[n]).collect::<Vec<_>>())
        .filter(|level: &Vec<String>| !level.is_empty())
        .collect();

    let cache = Cache::open(config.cache_root_path()).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))?;
    let bus = EventBus::new();
    let targets = build_targets(args.target)?;
    let exchangers = build_exchangers();
    let condition_ctx = build_condition_context(&args.root);
    let global_timeout = args
        .timeout_seconds
        .or(config.global_timeout_seconds)
        .map(Duration::from_secs);
    let options = ScheduleOptions { parallelism: config.parallelism, global_timeout };

    let graph_for_history = graph.clone();
    let scheduler = Scheduler::new(graph, narrowed, args.root.clone(), cache, bus, targets, exchangers, condition_ctx, options);
    let run_id = ulid::Ulid::new().to_string();
    let report = scheduler.run(&run_id).await.map_err(SykliError::from)?;

    let git_ref = sykli_git::head_ref(&args.root).unwrap_or_else(|_| "unknown".to_string());
    let git_branch = sykli_git::current_branch(&args.root).unwrap_or_else(|_| "unknown".to_string());
    let run = history.save(&report, &graph_for_history, &args.root, git_ref, git_branch).map_err(SykliError::from)?;

    let occurrences = OccurrenceStore::hydrate(&history).map_err(SykliError::from)?;
    occurrences.record(run);

    let exit_code = if report.overall == sykli_scheduler::OverallStatus::Passed { 0 } else { 1 };
    Ok((report, exit_code))
}

fn task_touched_by_diff(task: Option<&Task>, changed: &[PathBuf]) -> Result<bool, SykliError> {
    let Some(task) = task else { return Ok(false) };
    if task.inputs.is_empty() {
        return Ok(true);
    }
    let decision = sykli_glob::IncludeExcludeGlobs::new(&task.inputs, &[])
        .map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;
    for path in changed {
        if decision.decide_path(path).is_allowed() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Serialize)]
struct GraphDump {
    levels: Vec<Vec<String>>,
    tasks: BTreeMap<String, Task>,
}

/// Prints the parsed graph and its scheduling levels as JSON (§6.2's
/// `graph` subcommand, JSON-only — Mermaid/DOT rendering is out of scope).
pub async fn cmd_graph(root: &Path) -> Result<String, SykliError> {
    let (graph, levels) = build_graph(root).await?;
    let dump = GraphDump { levels, tasks: graph.tasks().clone() };
    serde_json::to_string_pretty(&dump).map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))
}

/// Writes the most recent occurrences to `<root>/.sykli/context.json`, the
/// AI-consumable snapshot named in the glossary: denormalized runs with
/// git context and per-task history stats.
pub fn cmd_context(root: &Path, config: &EngineConfig) -> Result<PathBuf, SykliError> {
    let history = RunHistory::open(config.history_root_path(root)).map_err(SykliError::from)?;
    let recent = history.list(10).map_err(SykliError::from)?;

    let dir = root.join(".sykli");
    std::fs::create_dir_all(&dir).map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;
    let path = dir.join("context.json");
    let bytes = serde_json::to_vec_pretty(&recent).map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;
    std::fs::write(&path, bytes).map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?;
    Ok(path)
}

pub fn cmd_cache_stats(config: &EngineConfig) -> Result<sykli_cache::CacheStats, SykliError> {
    let cache = Cache::open(config.cache_root_path()).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))?;
    cache.stats().map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))
}

pub fn cmd_cache_clean(config: &EngineConfig) -> Result<sykli_cache::CleanReport, SykliError> {
    let cache = Cache::open(config.cache_root_path()).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))?;
    cache.clean().map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))
}

/// Garbage-collects cache entries older than 30 days.
pub fn cmd_cache_gc(config: &EngineConfig) -> Result<sykli_cache::CleanReport, SykliError> {
    const THIRTY_DAYS_SECONDS: u64 = 30 * 24 * 60 * 60;
    let cache = Cache::open(config.cache_root_path()).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))?;
    let cutoff = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| SykliError::new(ErrorCode::Internal, e.to_string()))?
        .as_secs()
        .saturating_sub(THIRTY_DAYS_SECONDS);
    cache.clean_older_than(cutoff).map_err(|e| SykliError::new(ErrorCode::CacheIoError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_choice_parses_local_and_k8s() {
        assert_eq!("local".parse::<TargetChoice>().unwrap(), TargetChoice::Local);
        assert_eq!("k8s".parse::<TargetChoice>().unwrap(), TargetChoice::K8s);
        assert!("nope".parse::<TargetChoice>().is_err());
    }

    #[test]
    fn apply_filter_keeps_matching_tasks_and_drops_empty_levels() {
        let levels = vec![vec!["build".to_string(), "lint".to_string()], vec!["deploy".to_string()]];
        let filtered = apply_filter(levels, Some("build")).unwrap();
        assert_eq!(filtered, vec![vec!["build".to_string()]]);
    }

    #[test]
    fn apply_filter_with_no_pattern_is_identity() {
        let levels = vec![vec!["build".to_string()]];
        let filtered = apply_filter(levels.clone(), None).unwrap();
        assert_eq!(filtered, levels);
    }

    #[test]
    fn detect_ci_platform_reads_known_env_vars() {
        std::env::remove_var("GITHUB_ACTIONS");
        std::env::remove_var("GITLAB_CI");
        std::env::remove_var("CI");
        assert_eq!(detect_ci_platform(), None);

        std::env::set_var("GITHUB_ACTIONS", "true");
        assert_eq!(detect_ci_platform(), Some("github".to_string()));
        std::env::remove_var("GITHUB_ACTIONS");
    }
}
