// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Target` abstraction (§4.9): `available?`, `prepare`, `run_task`,
//! implemented by [`crate::local::LocalTarget`] and [`crate::k8s::K8sTarget`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sykli_core::Task;
use sykli_runtime::{CancellationToken, OutputStream};
use tokio::sync::mpsc;

use crate::error::TargetError;

/// What `prepare` produced, carried into the matching `run_task` call.
/// `Local` needs nothing; `K8s` needs the resolved source-provisioning
/// strategy so the Job manifest can build its git-clone init container.
#[derive(Debug, Clone)]
pub enum PrepareContext {
    Local,
    K8s { git_source: Option<sykli_k8s::GitSource> },
}

/// Everything a backend needs to actually run a task that the scheduler
/// has already resolved (mount sources, merged env, output sink).
pub struct RunOptions {
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<sykli_runtime::MountSpec>,
    pub network: Option<String>,
    pub timeout: Option<Duration>,
    pub output_tx: Option<mpsc::Sender<(OutputStream, Vec<u8>)>>,
    /// Unique per-invocation identifier used for container/Job naming.
    pub job_name: String,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub tail: Vec<u8>,
    pub duration: Duration,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

impl From<sykli_runtime::ExecOutcome> for TaskOutcome {
    fn from(outcome: sykli_runtime::ExecOutcome) -> Self {
        Self {
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            cancelled: outcome.cancelled,
            tail: outcome.tail,
            duration: outcome.duration,
        }
    }
}

#[async_trait]
pub trait Target: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can accept work right now (tool on `PATH`,
    /// cluster reachable, etc).
    async fn available(&self) -> bool;

    /// One-time, per-run setup: a no-op for Local, git context validation
    /// and source-strategy selection for K8s.
    async fn prepare(&self, workdir: &Path) -> Result<PrepareContext, TargetError>;

    async fn run_task(
        &self,
        task: &Task,
        opts: &RunOptions,
        context: &PrepareContext,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, TargetError>;
}
