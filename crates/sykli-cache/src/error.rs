// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cache miss reasons and I/O error wrapping.

use thiserror::Error;

/// Why a cache lookup missed, surfaced for observability per the spec's
/// enumerated reason list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    NoCache,
    CommandChanged,
    InputsChanged,
    ContainerChanged,
    EnvChanged,
    MountsChanged,
    ConfigChanged,
    Corrupted,
    BlobsMissing,
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissReason::NoCache => "no_cache",
            MissReason::CommandChanged => "command_changed",
            MissReason::InputsChanged => "inputs_changed",
            MissReason::ContainerChanged => "container_changed",
            MissReason::EnvChanged => "env_changed",
            MissReason::MountsChanged => "mounts_changed",
            MissReason::ConfigChanged => "config_changed",
            MissReason::Corrupted => "corrupted",
            MissReason::BlobsMissing => "blobs_missing",
        }
    }
}

/// Errors from cache filesystem operations that genuinely cannot degrade to
/// a miss (e.g. the cache root itself is unwritable). Lookup failures use
/// [`MissReason`] instead, per the propagation policy: cache I/O errors
/// degrade to a miss, they never fail the task.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
