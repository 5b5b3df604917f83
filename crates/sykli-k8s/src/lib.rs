// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kubernetes Job backend: auth detection, a hand-rolled HTTP transport,
//! and Job manifest construction with a git-clone init container.

mod auth;
mod error;
mod http;
mod job;
mod manifest;

pub use auth::{detect_auth, AuthConfig, AuthMethod};
pub use error::{classify_status, is_retryable, K8sError};
pub use http::{with_retry, K8sClient};
pub use job::{unique_job_name, JobHandle, JobPhase};
pub use manifest::{build_job_manifest, job_name, GitSource, JobSpec, ResourceRequests, VolumeSpec};
