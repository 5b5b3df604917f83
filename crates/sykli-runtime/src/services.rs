// SPDX-License-Identifier: MIT OR Apache-2.0
//! Service sidecars: a bridge network shared by the task container and its
//! declared services, torn down on task exit.

use tokio::process::Command;

use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub alias: String,
    pub container_name: String,
}

async fn run_tool(tool: &str, args: &[&str]) -> Result<(), RuntimeError> {
    let status = Command::new(tool)
        .args(args)
        .status()
        .await
        .map_err(RuntimeError::Spawn)?;
    if !status.success() {
        return Err(RuntimeError::Spawn(std::io::Error::other(format!(
            "{tool} {args:?} exited with {status}"
        ))));
    }
    Ok(())
}

pub async fn create_network(tool: &str, name: &str) -> Result<(), RuntimeError> {
    run_tool(tool, &["network", "create", name]).await
}

pub async fn remove_network(tool: &str, name: &str) -> Result<(), RuntimeError> {
    run_tool(tool, &["network", "rm", name]).await
}

/// Start a declared service, reachable from the task container at `alias`.
pub async fn start_service(
    tool: &str,
    network: &str,
    alias: &str,
    image: &str,
    container_name: &str,
) -> Result<ServiceHandle, RuntimeError> {
    run_tool(
        tool,
        &[
            "run",
            "-d",
            "--rm",
            "--network",
            network,
            "--network-alias",
            alias,
            "--name",
            container_name,
            image,
        ],
    )
    .await?;
    Ok(ServiceHandle {
        alias: alias.to_string(),
        container_name: container_name.to_string(),
    })
}

pub async fn stop_service(tool: &str, handle: &ServiceHandle) -> Result<(), RuntimeError> {
    run_tool(tool, &["stop", &handle.container_name]).await
}
