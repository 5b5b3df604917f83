// SPDX-License-Identifier: MIT OR Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("task has no command to run")]
    NoCommand,

    #[error("git workdir is dirty; pass --allow-dirty to run anyway")]
    DirtyWorkdir,

    #[error("local runtime error: {0}")]
    Runtime(#[from] sykli_runtime::RuntimeError),

    #[error("k8s backend error: {0}")]
    K8s(#[from] sykli_k8s::K8sError),

    #[error("git error: {0}")]
    Git(#[from] sykli_git::GitError),

    #[error("credential exchange failed: {0}")]
    Credential(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
