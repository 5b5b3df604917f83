// SPDX-License-Identifier: MIT OR Apache-2.0
//! The validated, in-memory task model.
//!
//! These types are never constructed directly from untrusted JSON; they are
//! produced by [`crate::wire::Graph::from_wire`] (see `wire.rs`), which
//! translates the wire DTOs into this model and applies the renames the two
//! shapes disagree on (`when` → `condition`, `timeout` → `timeout_seconds`,
//! top-level `provides`/`needs` → nested `capability`).

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A unit of work. Immutable after the graph finishes building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub name: String,
    pub command: Option<String>,
    pub container: Option<String>,
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub task_inputs: Vec<TaskInputRef>,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    pub condition: Option<String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Dimension order here is the order the task declared them in; it
    /// drives the suffix order of expanded variant names (e.g. `os` before
    /// `arch` yields `t-linux-x86`, not `t-x86-linux`).
    #[serde(default)]
    pub matrix: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub matrix_values: IndexMap<String, String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub secret_refs: Vec<SecretRef>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub target: Option<TargetKind>,
    pub k8s: Option<K8sOptions>,
    pub semantic: Option<SemanticInfo>,
    pub ai_hooks: Option<AiHooks>,
    pub capability: Option<CapabilitySpec>,
    pub gate: Option<GateSpec>,
    pub credential_binding: Option<CredentialBinding>,
    pub verify: Option<VerifyPolicy>,
    /// Free-text hint consumed by run history's likely-cause correlation;
    /// carried through unchanged, never interpreted by the graph builder.
    pub history_hint: Option<String>,
}

impl Task {
    /// A gate task carries no command: its status is decided by the gate
    /// state machine rather than by process execution.
    pub fn is_gate(&self) -> bool {
        self.gate.is_some()
    }

    /// A task produced by matrix expansion (carries non-empty `matrix_values`).
    pub fn is_matrix_variant(&self) -> bool {
        !self.matrix_values.is_empty()
    }

    /// The base name before matrix suffixing, e.g. `t` for `t-linux-x86`.
    pub fn base_name(&self) -> &str {
        self.name
            .split_once('-')
            .map(|(base, _)| base)
            .filter(|_| self.is_matrix_variant())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Local,
    K8s,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInputRef {
    pub from_task: String,
    pub output_name: String,
    pub dest_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    Directory,
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    pub resource_id: String,
    pub container_path: String,
    pub kind: MountKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSpec {
    pub image: String,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    Env,
    File,
    Vault,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRef {
    pub name: String,
    pub source: SecretSource,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct K8sOptions {
    pub memory: Option<String>,
    pub cpu: Option<String>,
    pub gpu: Option<String>,
    /// Opaque passthrough merged into the manifest builder by `sykli-k8s`.
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SemanticInfo {
    #[serde(default)]
    pub covers: Vec<String>,
    pub intent: Option<String>,
    pub criticality: Option<Criticality>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiHooks {
    pub on_fail: Option<String>,
    pub select: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvidesEntry {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CapabilitySpec {
    #[serde(default)]
    pub provides: Vec<ProvidesEntry>,
    #[serde(default)]
    pub needs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStrategy {
    Prompt,
    Env,
    File,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateSpec {
    pub strategy: GateStrategy,
    #[serde(default)]
    pub timeout_seconds: u64,
    pub message: Option<String>,
    pub env_var: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialBinding {
    pub provider: CloudProvider,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// AWS: IAM role to assume via `AssumeRoleWithWebIdentity`.
    pub role_arn: Option<String>,
    /// GCP: workload identity provider resource name.
    pub workload_identity_provider: Option<String>,
    /// GCP: service account to impersonate.
    pub service_account: Option<String>,
    /// Azure: federated credential client id.
    pub client_id: Option<String>,
    /// Azure: tenant id.
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    Never,
    Always,
    CrossPlatform,
    #[default]
    Default,
}
