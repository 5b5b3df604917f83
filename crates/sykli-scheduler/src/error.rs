// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scheduler errors, convertible into the shared [`sykli_error::SykliError`]
//! taxonomy at the boundary where a run's outcome crosses into the CLI.

use sykli_error::{ErrorCode, SykliError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("condition evaluation failed: {0}")]
    Condition(#[from] sykli_condition::ConditionError),

    #[error("glob expansion failed: {0}")]
    Glob(#[from] sykli_glob::GlobError),

    #[error("cache write failed: {0}")]
    Cache(#[from] sykli_cache::CacheError),

    #[error("gate error: {0}")]
    Gate(#[from] sykli_gate::GateError),

    #[error("target error: {0}")]
    Target(#[from] sykli_target::TargetError),

    #[error("task '{task}' stages task_inputs dest '{dest}' outside its workdir")]
    PathTraversal { task: String, dest: String },

    #[error("task '{task}' has no backend available for target '{target}'")]
    NoTargetAvailable { task: String, target: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SchedulerError> for SykliError {
    fn from(err: SchedulerError) -> Self {
        let code = match &err {
            SchedulerError::Condition(_) => ErrorCode::Internal,
            SchedulerError::Glob(_) => ErrorCode::Internal,
            SchedulerError::Cache(_) => ErrorCode::CacheIoError,
            SchedulerError::Gate(_) => ErrorCode::GateMisconfigured,
            SchedulerError::Target(_) => ErrorCode::CommandFailed,
            SchedulerError::PathTraversal { .. } => ErrorCode::PathTraversal,
            SchedulerError::NoTargetAvailable { .. } => ErrorCode::ToolNotFound,
            SchedulerError::Io(_) => ErrorCode::Internal,
        };
        SykliError::new(code, err.to_string())
    }
}
