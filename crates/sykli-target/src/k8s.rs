// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Kubernetes backend: one Job per task, git-clone-in-init-container
//! source provisioning, and teardown on every exit path.

use std::time::Duration;

use async_trait::async_trait;
use sykli_core::Task;
use sykli_k8s::{
    detect_auth, job_name, AuthConfig, GitSource, JobHandle, JobPhase, JobSpec, K8sClient, K8sError,
    ResourceRequests, VolumeSpec,
};
use sykli_runtime::{CancellationToken, MountSpec};
use tracing::warn;

use crate::error::TargetError;
use crate::target::{PrepareContext, RunOptions, Target, TaskOutcome};

const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_TTL_SECONDS: u32 = 3600;
/// Job and pod deletion use `Background` propagation so `run_task` doesn't
/// block on dependent-object cleanup before returning.
const DELETE_PROPAGATION: &str = "Background";

pub struct K8sTarget {
    auth: AuthConfig,
    allow_dirty: bool,
    ssh_secret_name: Option<String>,
    ssh_host: Option<String>,
    https_token_env: Option<String>,
}

impl K8sTarget {
    pub fn new(context: Option<&str>, allow_dirty: bool) -> Result<Self, TargetError> {
        let auth = detect_auth(context)?;
        Ok(Self {
            auth,
            allow_dirty,
            ssh_secret_name: None,
            ssh_host: None,
            https_token_env: None,
        })
    }

    pub fn with_ssh_source(mut self, secret_name: impl Into<String>, host: impl Into<String>) -> Self {
        self.ssh_secret_name = Some(secret_name.into());
        self.ssh_host = Some(host.into());
        self
    }

    pub fn with_https_token_env(mut self, var: impl Into<String>) -> Self {
        self.https_token_env = Some(var.into());
        self
    }

    fn build_git_source(&self, workdir: &std::path::Path) -> Result<GitSource, TargetError> {
        let url = sykli_git::remote_url(workdir, "origin")?;
        let sha = sykli_git::head_ref(workdir)?;
        let branch = sykli_git::current_branch(workdir).ok();
        let is_ssh = url.starts_with("git@") || url.starts_with("ssh://");
        Ok(GitSource {
            url,
            branch,
            sha,
            full_clone: false,
            checkout_path: None,
            ssh_secret_name: if is_ssh { self.ssh_secret_name.clone() } else { None },
            ssh_host: if is_ssh { self.ssh_host.clone() } else { None },
            https_token_env: if is_ssh { None } else { self.https_token_env.clone() },
        })
    }

    fn resources_for(task: &Task) -> ResourceRequests {
        match &task.k8s {
            Some(opts) => ResourceRequests {
                memory: opts.memory.clone(),
                cpu: opts.cpu.clone(),
                gpu: opts.gpu.as_ref().and_then(|s| s.parse().ok()),
            },
            None => ResourceRequests::default(),
        }
    }

    fn volumes_for(mounts: &[MountSpec]) -> Vec<VolumeSpec> {
        mounts
            .iter()
            .filter_map(|mount| match mount {
                MountSpec::Directory { host, container } => Some(VolumeSpec {
                    name: sanitize_volume_name(container),
                    host_path: host.clone(),
                    mount_path: container.clone(),
                }),
                MountSpec::Cache { name, .. } => {
                    warn!(cache = %name, "cache mounts have no Kubernetes volume equivalent; skipped");
                    None
                }
            })
            .collect()
    }
}

fn sanitize_volume_name(container_path: &str) -> String {
    let sanitized: String = container_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("vol{sanitized}")
}

#[async_trait]
impl Target for K8sTarget {
    fn name(&self) -> &'static str {
        "k8s"
    }

    async fn available(&self) -> bool {
        match K8sClient::new(self.auth.clone()) {
            Ok(client) => client
                .request(reqwest::Method::GET, "/version", None)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    async fn prepare(&self, workdir: &std::path::Path) -> Result<PrepareContext, TargetError> {
        if sykli_git::is_dirty(workdir)? && !self.allow_dirty {
            return Err(TargetError::DirtyWorkdir);
        }
        let git_source = self.build_git_source(workdir).ok();
        Ok(PrepareContext::K8s { git_source })
    }

    async fn run_task(
        &self,
        task: &Task,
        opts: &RunOptions,
        context: &PrepareContext,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, TargetError> {
        let image = task.container.clone().ok_or(TargetError::NoCommand)?;
        let command = task.command.clone().ok_or(TargetError::NoCommand)?;
        let git_source = match context {
            PrepareContext::K8s { git_source } => git_source.clone(),
            PrepareContext::Local => None,
        };

        let spec = JobSpec {
            name: job_name_or(&opts.job_name, &task.name),
            namespace: self.auth.namespace.clone(),
            image,
            command: vec!["sh".to_string(), "-c".to_string(), command],
            labels: [("app".to_string(), "sykli".to_string())].into_iter().collect(),
            env: opts.env.clone(),
            volumes: Self::volumes_for(&opts.mounts),
            backoff_limit: task.retry,
            ttl_seconds_after_finished: Some(DEFAULT_TTL_SECONDS),
            resources: Self::resources_for(task),
            git_source,
        };

        let start = std::time::Instant::now();
        let client = K8sClient::new(self.auth.clone())?;
        let handle = JobHandle::create(client, &spec).await?;
        let timeout = opts.timeout.unwrap_or(DEFAULT_JOB_TIMEOUT);

        let result = tokio::select! {
            phase = handle.wait_complete(timeout) => Settled::Phase(phase),
            _ = cancel.cancelled() => Settled::Cancelled,
        };

        let tail = handle.logs().await.unwrap_or_default();
        let delete_result = handle.delete(DELETE_PROPAGATION).await;
        if let Err(err) = delete_result {
            warn!(job = %handle.name, error = %err, "failed to delete job during cleanup");
        }

        let duration = start.elapsed();
        match result {
            Settled::Phase(Ok(JobPhase::Succeeded)) => Ok(TaskOutcome {
                exit_code: Some(0),
                timed_out: false,
                cancelled: false,
                tail: tail.into_bytes(),
                duration,
            }),
            Settled::Phase(Ok(JobPhase::Failed)) => Ok(TaskOutcome {
                exit_code: Some(1),
                timed_out: false,
                cancelled: false,
                tail: tail.into_bytes(),
                duration,
            }),
            Settled::Phase(Ok(JobPhase::Active)) => Ok(TaskOutcome {
                exit_code: None,
                timed_out: true,
                cancelled: false,
                tail: tail.into_bytes(),
                duration,
            }),
            Settled::Phase(Err(K8sError::JobTimedOut(_))) => Ok(TaskOutcome {
                exit_code: None,
                timed_out: true,
                cancelled: false,
                tail: tail.into_bytes(),
                duration,
            }),
            Settled::Phase(Err(other)) => Err(other.into()),
            Settled::Cancelled => Ok(TaskOutcome {
                exit_code: None,
                timed_out: false,
                cancelled: true,
                tail: tail.into_bytes(),
                duration,
            }),
        }
    }
}

enum Settled {
    Phase(Result<JobPhase, K8sError>),
    Cancelled,
}

fn job_name_or(requested: &str, task_name: &str) -> String {
    if requested.is_empty() {
        job_name("run", task_name)
    } else {
        requested.to_string()
    }
}
