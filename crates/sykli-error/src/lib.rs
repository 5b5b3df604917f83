// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Unified error taxonomy for the Sykli execution engine.
//!
//! Every Sykli error carries a stable, machine-readable [`ErrorCode`], a
//! human-readable message, optional `task`/`step`/`command` context, and a
//! captured output tail. Crate-local errors implement `From<LocalError> for
//! SykliError` at the boundary where they cross into the scheduler or CLI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Graph parse/validation errors (duplicate names, cycles, bad artifacts).
    Validation,
    /// Task execution errors (non-zero exit, timeout, killed).
    Execution,
    /// SDK invocation errors (missing pipeline file, bad JSON, SDK crash).
    Sdk,
    /// Runtime errors (missing tool, auth failure, dirty workdir).
    Runtime,
    /// Cache I/O and coherence errors.
    Cache,
    /// Kubernetes backend errors.
    K8s,
    /// Approval gate errors.
    Gate,
    /// Capability resolution errors.
    Capability,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Sdk => "sdk",
            Self::Runtime => "runtime",
            Self::Cache => "cache",
            Self::K8s => "k8s",
            Self::Gate => "gate",
            Self::Capability => "capability",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases; exit codes and
/// documentation links key off these strings, not the `Display` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// Two tasks declare the same name.
    DuplicateTaskName,
    /// A `depends_on` or `task_inputs.from_task` references a task that does not exist.
    UnknownTaskReference,
    /// The dependency graph contains a cycle.
    CycleDetected,
    /// A `task_inputs` entry references an output the producer never declares,
    /// or a producer that is not a transitive predecessor.
    InvalidArtifactReference,
    /// A capability name is malformed, duplicated, or self-conflicting.
    CapabilityConflict,
    /// A matrix task declares `provides`, which is forbidden.
    MatrixProvidesCapability,

    // -- Execution --
    /// The task command exited with a non-zero status.
    CommandFailed,
    /// The task exceeded its configured timeout.
    Timeout,
    /// The task was killed by a cancellation signal.
    Cancelled,

    // -- SDK --
    /// No supported pipeline file was found in the project root.
    NoSdkFile,
    /// The SDK binary exited non-zero or could not be spawned.
    SdkInvocationFailed,
    /// The SDK's stdout was not valid JSON (or failed schema validation).
    SdkOutputInvalid,

    // -- Runtime --
    /// A required external tool (docker, git, ...) is missing from PATH.
    ToolNotFound,
    /// The local working copy has uncommitted changes and `allow_dirty` was not set.
    DirtyWorkdir,
    /// A mount or staged path would escape the task workdir.
    PathTraversal,

    // -- Cache --
    /// Reading or writing the cache failed; the task must fall back to a live run.
    CacheIoError,
    /// A cache entry references a blob that no longer exists.
    CacheCorrupted,

    // -- K8s --
    /// No usable kubeconfig or in-cluster credentials were found.
    K8sAuthNotFound,
    /// The kubeconfig uses an `exec`/auth-provider credential plugin, which is unsupported.
    ExecAuthNotSupported,
    /// The Kubernetes API returned an authentication failure (401).
    K8sAuthFailed,
    /// The Kubernetes API returned a forbidden response (403).
    K8sForbidden,
    /// The Kubernetes API returned not-found (404).
    K8sNotFound,
    /// The Kubernetes API returned a conflict (409).
    K8sConflict,
    /// The Kubernetes API rejected the request body (422).
    K8sValidationError,
    /// An unclassified Kubernetes API error (other 4xx/5xx).
    K8sApiError,
    /// A manifest field would require interpolating an unsafe character into a shell script.
    UnsafeManifestInterpolation,

    // -- Gate --
    /// The gate strategy's required input (env var, file path) is empty/misconfigured.
    GateMisconfigured,
    /// A `prompt` gate was requested outside of a TTY.
    GateRequiresTty,
    /// The approval gate was denied.
    GateDenied,
    /// The approval gate timed out waiting for a decision.
    GateTimedOut,

    // -- Capability --
    /// A consumer needs a capability with no matching provider.
    CapabilityUnresolved,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            DuplicateTaskName
            | UnknownTaskReference
            | CycleDetected
            | InvalidArtifactReference
            | CapabilityConflict
            | MatrixProvidesCapability => ErrorCategory::Validation,

            CommandFailed | Timeout | Cancelled => ErrorCategory::Execution,

            NoSdkFile | SdkInvocationFailed | SdkOutputInvalid => ErrorCategory::Sdk,

            ToolNotFound | DirtyWorkdir | PathTraversal => ErrorCategory::Runtime,

            CacheIoError | CacheCorrupted => ErrorCategory::Cache,

            K8sAuthNotFound
            | ExecAuthNotSupported
            | K8sAuthFailed
            | K8sForbidden
            | K8sNotFound
            | K8sConflict
            | K8sValidationError
            | K8sApiError
            | UnsafeManifestInterpolation => ErrorCategory::K8s,

            GateMisconfigured | GateRequiresTty | GateDenied | GateTimedOut => ErrorCategory::Gate,

            CapabilityUnresolved => ErrorCategory::Capability,

            Internal => ErrorCategory::Internal,
        }
    }

    /// The process exit code this error should produce when it surfaces at
    /// the top level, per §6.2 of the specification.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Validation => 2,
            ErrorCategory::Sdk => {
                if matches!(self, ErrorCode::NoSdkFile) {
                    3
                } else {
                    4
                }
            }
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialize via serde to keep the Display and wire representations in lockstep.
        let json = serde_json::to_string(self).unwrap_or_default();
        f.write_str(json.trim_matches('"'))
    }
}

/// A captured slice of process output, truncated for diagnostic display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputTail {
    /// Up to the last 10 lines of output (per §7), newest last.
    pub lines: Vec<String>,
    /// Whether the tail was truncated from a longer stream.
    pub truncated: bool,
}

impl OutputTail {
    /// Build a tail from full output, keeping at most `max_lines` lines.
    #[must_use]
    pub fn from_output(output: &str, max_lines: usize) -> Self {
        let all: Vec<&str> = output.lines().collect();
        let truncated = all.len() > max_lines;
        let lines = all[all.len().saturating_sub(max_lines)..]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self { lines, truncated }
    }
}

/// A fully-qualified Sykli error: stable code, message, optional execution
/// context, and diagnostic hints.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SykliError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Task name this error pertains to, if any.
    pub task: Option<String>,
    /// Step within task execution (e.g. "cache lookup", "gate wait").
    pub step: Option<String>,
    /// The command that was being run, if applicable.
    pub command: Option<String>,
    /// Captured output tail, if available.
    pub output: Option<OutputTail>,
    /// `help:` hints shown to the user.
    pub help: Vec<String>,
    /// `note:` annotations shown to the user.
    pub notes: Vec<String>,
}

impl SykliError {
    /// Start building an error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            task: None,
            step: None,
            command: None,
            output: None,
            help: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Attach the task name this error occurred in.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attach the step this error occurred during.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attach the command that was running.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Attach a captured output tail.
    #[must_use]
    pub fn with_output(mut self, output: OutputTail) -> Self {
        self.output = Some(output);
        self
    }

    /// Append a `help:` hint.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Append a `note:` annotation.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// The process exit code this error maps to.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Render a compact, single-line form: `error[CODE]: message (task)`.
    #[must_use]
    pub fn to_compact_string(&self) -> String {
        match &self.task {
            Some(task) => format!("error[{}]: {} ({task})", self.code, self.message),
            None => format!("error[{}]: {}", self.code, self.message),
        }
    }
}
