// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-building errors, convertible into the shared [`sykli_error::SykliError`]
//! taxonomy at crate boundaries.

use sykli_error::{ErrorCode, SykliError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported wire version '{version}'")]
    UnsupportedVersion { version: String },

    #[error("task '{task}' declares a container/mount and requires wire version 2")]
    RequiresVersion2 { task: String },

    #[error("duplicate task name '{name}'")]
    DuplicateTaskName { name: String },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("task '{consumer}' task_inputs references unknown task '{producer}'")]
    UnknownArtifactProducer { consumer: String, producer: String },

    #[error(
        "task '{consumer}' task_inputs references output '{output}' not declared by '{producer}'"
    )]
    UnknownArtifactOutput {
        consumer: String,
        producer: String,
        output: String,
    },

    #[error(
        "task '{consumer}' task_inputs references '{producer}' which is not a predecessor"
    )]
    ArtifactProducerNotPredecessor { consumer: String, producer: String },

    #[error("capability resolution failed: {0}")]
    Capability(#[from] sykli_capability::CapabilityError),

    #[error("SDK invocation failed: {0}")]
    Sdk(String),

    #[error("no pipeline file found in '{0}'")]
    NoPipelineFile(String),
}

impl From<CoreError> for SykliError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::Json(_) => ErrorCode::SdkOutputInvalid,
            CoreError::UnsupportedVersion { .. } => ErrorCode::SdkOutputInvalid,
            CoreError::RequiresVersion2 { .. } => ErrorCode::SdkOutputInvalid,
            CoreError::DuplicateTaskName { .. } => ErrorCode::DuplicateTaskName,
            CoreError::UnknownDependency { .. } => ErrorCode::UnknownTaskReference,
            CoreError::Cycle { .. } => ErrorCode::CycleDetected,
            CoreError::UnknownArtifactProducer { .. } => ErrorCode::InvalidArtifactReference,
            CoreError::UnknownArtifactOutput { .. } => ErrorCode::InvalidArtifactReference,
            CoreError::ArtifactProducerNotPredecessor { .. } => ErrorCode::InvalidArtifactReference,
            CoreError::Capability(inner) => match inner {
                sykli_capability::CapabilityError::MatrixTaskProvides { .. } => {
                    ErrorCode::MatrixProvidesCapability
                }
                _ => ErrorCode::CapabilityConflict,
            },
            CoreError::Sdk(_) => ErrorCode::SdkInvocationFailed,
            CoreError::NoPipelineFile(_) => ErrorCode::NoSdkFile,
        };
        SykliError::new(code, err.to_string())
    }
}
