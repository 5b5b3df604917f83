// SPDX-License-Identifier: MIT OR Apache-2.0
//! K8s client errors, mapped from HTTP status codes per §4.5.2.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum K8sError {
    #[error("no in-cluster service account and no kubeconfig found")]
    AuthNotFound,

    #[error("exec and auth-provider kubeconfig credential plugins are not supported")]
    ExecAuthNotSupported,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest input: {0}")]
    InvalidManifestInput(String),

    #[error("job '{0}' timed out waiting for completion")]
    JobTimedOut(String),

    #[error("no pods found for job '{0}'")]
    NoPods(String),
}

/// Maps an HTTP status code to the error taxonomy of §4.5.2. `Ok(())` for
/// any 2xx status.
pub fn classify_status(status: u16, body: &str) -> Result<(), K8sError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(K8sError::AuthFailed(body.to_string())),
        403 => Err(K8sError::Forbidden(body.to_string())),
        404 => Err(K8sError::NotFound(body.to_string())),
        409 => Err(K8sError::Conflict(body.to_string())),
        422 => Err(K8sError::ValidationError(body.to_string())),
        other => Err(K8sError::ApiError {
            status: other,
            body: body.to_string(),
        }),
    }
}

/// Only 5xx responses, connection errors, and timeouts are retry-eligible;
/// 4xx never retries.
pub fn is_retryable(err: &K8sError) -> bool {
    match err {
        K8sError::ApiError { status, .. } => *status >= 500,
        K8sError::Request(e) => e.is_connect() || e.is_timeout(),
        _ => false,
    }
}
