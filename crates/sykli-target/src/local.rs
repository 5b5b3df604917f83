// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Local backend: shell commands directly, or inside a container when
//! the task names an image.

use std::path::Path;

use async_trait::async_trait;
use sykli_core::Task;
use sykli_runtime::{is_tool_on_path, run_container, run_shell, CancellationToken, ContainerRequest, ShellRequest};

use crate::error::TargetError;
use crate::target::{PrepareContext, RunOptions, Target, TaskOutcome};

pub struct LocalTarget {
    container_tool: String,
}

impl LocalTarget {
    /// Auto-detects `docker`, falling back to `podman`, on `PATH`.
    pub fn new() -> Self {
        let tool = if is_tool_on_path("docker") {
            "docker"
        } else if is_tool_on_path("podman") {
            "podman"
        } else {
            "docker"
        };
        Self { container_tool: tool.to_string() }
    }

    pub fn with_container_tool(tool: impl Into<String>) -> Self {
        Self { container_tool: tool.into() }
    }
}

impl Default for LocalTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Target for LocalTarget {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn available(&self) -> bool {
        is_tool_on_path("sh")
    }

    async fn prepare(&self, _workdir: &Path) -> Result<PrepareContext, TargetError> {
        Ok(PrepareContext::Local)
    }

    async fn run_task(
        &self,
        task: &Task,
        opts: &RunOptions,
        _context: &PrepareContext,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, TargetError> {
        let command = task.command.as_deref().ok_or(TargetError::NoCommand)?;

        let outcome = if let Some(image) = &task.container {
            if !is_tool_on_path(&self.container_tool) {
                return Err(TargetError::Runtime(sykli_runtime::RuntimeError::ToolNotFound(self.container_tool.clone())));
            }
            let workdir = opts.workdir.to_string_lossy().to_string();
            let req = ContainerRequest {
                tool: &self.container_tool,
                image,
                name: &opts.job_name,
                command,
                workdir: &workdir,
                env: &opts.env,
                mounts: &opts.mounts,
                network: opts.network.as_deref(),
            };
            run_container(req, cancel.clone(), opts.timeout, opts.output_tx.clone()).await?
        } else {
            let req = ShellRequest { command, workdir: &opts.workdir, env: &opts.env };
            run_shell(req, cancel.clone(), opts.timeout, opts.output_tx.clone()).await?
        };

        Ok(outcome.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use sykli_core::Task;

    fn base_task(command: &str) -> Task {
        Task {
            name: "t".to_string(),
            command: Some(command.to_string()),
            container: None,
            workdir: None,
            env: BTreeMap::new(),
            timeout_seconds: None,
            retry: 0,
            inputs: vec![],
            outputs: BTreeMap::new(),
            task_inputs: vec![],
            depends_on: Default::default(),
            condition: None,
            mounts: vec![],
            services: vec![],
            matrix: Default::default(),
            matrix_values: Default::default(),
            secrets: vec![],
            secret_refs: vec![],
            requires: vec![],
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

    fn opts(workdir: &Path) -> RunOptions {
        RunOptions {
            workdir: workdir.to_path_buf(),
            env: BTreeMap::new(),
            mounts: vec![],
            network: None,
            timeout: Some(Duration::from_secs(5)),
            output_tx: None,
            job_name: "sykli-test-task".to_string(),
        }
    }

    #[tokio::test]
    async fn runs_a_plain_shell_command() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new();
        let task = base_task("echo hi");
        let outcome = target
            .run_task(&task, &opts(dir.path()), &PrepareContext::Local, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(String::from_utf8_lossy(&outcome.tail).trim(), "hi");
    }

    #[tokio::test]
    async fn command_without_command_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = LocalTarget::new();
        let mut task = base_task("echo hi");
        task.command = None;
        let err = target
            .run_task(&task, &opts(dir.path()), &PrepareContext::Local, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::NoCommand));
    }

    #[tokio::test]
    async fn available_is_true_when_sh_is_on_path() {
        assert!(LocalTarget::new().available().await);
    }
}
