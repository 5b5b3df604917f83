// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Container adapter (Docker/Podman): argv construction, cache volumes,
//! and out-of-band `kill`/`stop` for cancellation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;
use crate::exec::{exec_with_tee, ExecOutcome, OutputStream};

#[derive(Debug, Clone)]
pub enum MountSpec {
    Directory { host: PathBuf, container: String },
    Cache { name: String, container: String },
}

/// Deterministic named-volume id for a cache mount, stable across runs.
pub fn cache_volume_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("sykli-cache-{sanitized}")
}

pub struct ContainerRequest<'a> {
    pub tool: &'a str,
    pub image: &'a str,
    pub name: &'a str,
    pub command: &'a str,
    pub workdir: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub mounts: &'a [MountSpec],
    pub network: Option<&'a str>,
}

fn build_command(req: &ContainerRequest<'_>) -> Command {
    let mut cmd = Command::new(req.tool);
    cmd.arg("run").arg("--rm").arg("--name").arg(req.name);
    if let Some(network) = req.network {
        cmd.arg("--network").arg(network);
    }
    for mount in req.mounts {
        match mount {
            MountSpec::Directory { host, container } => {
                cmd.arg("-v").arg(format!("{}:{}", host.display(), container));
            }
            MountSpec::Cache { name, container } => {
                cmd.arg("-v").arg(format!("{}:{}", cache_volume_name(name), container));
            }
        }
    }
    cmd.arg("-w").arg(req.workdir);
    for (k, v) in req.env {
        cmd.arg("-e").arg(format!("{k}={v}"));
    }
    cmd.arg(req.image);
    cmd.arg("sh").arg("-c").arg(req.command);
    cmd
}

/// Run a task inside a container. Cancellation first issues `docker kill
/// <name>` so the daemon tears the container down promptly, then falls back
/// to the shared process-group termination for the client process itself.
pub async fn run_container(
    req: ContainerRequest<'_>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    output_tx: Option<mpsc::Sender<(OutputStream, Vec<u8>)>>,
) -> Result<ExecOutcome, RuntimeError> {
    let tool = req.tool.to_string();
    let name = req.name.to_string();
    let cmd = build_command(&req);

    let kill_cancel = cancel.clone();
    let kill_guard = tokio::spawn(async move {
        kill_cancel.cancelled().await;
        let _ = tokio::process::Command::new(&tool).arg("kill").arg(&name).status().await;
    });

    let outcome = exec_with_tee(cmd, cancel, timeout, output_tx).await;
    kill_guard.abort();
    outcome
}

/// Whether `tool` resolves on `PATH`, used for the `available?()` contract.
pub fn is_tool_on_path(tool: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_volume_name_sanitizes_special_characters() {
        assert_eq!(cache_volume_name("node modules/v1"), "sykli-cache-node_modules_v1");
    }

    #[test]
    fn cache_volume_name_is_deterministic() {
        assert_eq!(cache_volume_name("build"), cache_volume_name("build"));
    }

    #[test]
    fn build_command_includes_mounts_and_env() {
        let mut env = BTreeMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        let mounts = vec![
            MountSpec::Directory { host: PathBuf::from("/src"), container: "/work".to_string() },
            MountSpec::Cache { name: "deps".to_string(), container: "/cache".to_string() },
        ];
        let req = ContainerRequest {
            tool: "docker",
            image: "alpine",
            name: "sykli-run1-build",
            command: "make",
            workdir: "/work",
            env: &env,
            mounts: &mounts,
            network: Some("sykli-net"),
        };
        let cmd = build_command(&req);
        let args: Vec<String> = cmd.as_std().get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert!(args.contains(&"--network".to_string()));
        assert!(args.iter().any(|a| a == "/src:/work"));
        assert!(args.iter().any(|a| a == "sykli-cache-deps:/cache"));
        assert!(args.iter().any(|a| a == "FOO=bar"));
    }

    #[test]
    fn is_tool_on_path_finds_sh() {
        assert!(is_tool_on_path("sh"));
    }

    #[test]
    fn is_tool_on_path_rejects_unknown_tool() {
        assert!(!is_tool_on_path("definitely-not-a-real-tool-xyz"));
    }
}
