// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors from local process execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait on process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("container tool '{0}' not found on PATH")]
    ToolNotFound(String),
}
