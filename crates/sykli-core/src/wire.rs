// SPDX-License-Identifier: MIT OR Apache-2.0
//! The SDK-facing JSON wire format and its conversion into the domain model.
//!
//! The wire shape intentionally differs from the domain [`Task`] in a few
//! names (`when` vs `condition`, `timeout` vs `timeout_seconds`, top-level
//! `provides`/`needs` vs nested `capability`) because it mirrors what the
//! language SDKs actually emit (§6.1), while the domain model groups related
//! fields the way the engine reasons about them.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::resource::Resource as DomainResource;
use crate::task::{
    AiHooks, CapabilitySpec, CredentialBinding, GateSpec, K8sOptions, Mount, ProvidesEntry,
    SecretRef, SemanticInfo, ServiceSpec, Task, TargetKind, TaskInputRef, VerifyPolicy,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGraph {
    pub version: String,
    pub tasks: Vec<WireTask>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, WireResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_inputs: Vec<TaskInputRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<SecretRef>,
    /// Dimension order here is whatever order the SDK emitted the object's
    /// keys in; it is preserved straight through to variant naming.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub matrix: IndexMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s: Option<K8sOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_hooks: Option<AiHooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<ProvidesEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_binding: Option<CredentialBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireResource {
    Directory { path: String },
    Cache { name: String },
}

impl From<WireResource> for DomainResource {
    fn from(wire: WireResource) -> Self {
        match wire {
            WireResource::Directory { path } => DomainResource::Directory { path },
            WireResource::Cache { name } => DomainResource::Cache { name },
        }
    }
}

fn uses_container_features(task: &WireTask) -> bool {
    task.container.is_some() || !task.mounts.is_empty()
}

impl Graph {
    /// Parse the SDK's stdout JSON into a validated [`Graph`], running the
    /// full build pipeline (matrix expansion, capability resolution, cycle
    /// detection, artifact validation).
    pub fn parse(json_bytes: &[u8]) -> Result<(Graph, Vec<Vec<String>>), CoreError> {
        let wire: WireGraph = serde_json::from_slice(json_bytes)?;
        if wire.version != "1" && wire.version != "2" {
            return Err(CoreError::UnsupportedVersion {
                version: wire.version,
            });
        }
        if wire.version == "1" {
            if let Some(task) = wire.tasks.iter().find(|t| uses_container_features(t)) {
                return Err(CoreError::RequiresVersion2 {
                    task: task.name.clone(),
                });
            }
        }

        let mut tasks = BTreeMap::new();
        for wire_task in wire.tasks {
            let name = wire_task.name.clone();
            if tasks.contains_key(&name) {
                return Err(CoreError::DuplicateTaskName { name });
            }
            tasks.insert(name, Task::from_wire(wire_task));
        }
        let resources = wire
            .resources
            .into_iter()
            .map(|(id, res)| (id, DomainResource::from(res)))
            .collect();

        Graph::new(tasks, resources).build()
    }
}

impl Task {
    fn from_wire(wire: WireTask) -> Task {
        let capability = if wire.provides.is_empty() && wire.needs.is_empty() {
            None
        } else {
            Some(CapabilitySpec {
                provides: wire.provides,
                needs: wire.needs,
            })
        };
        Task {
            name: wire.name,
            command: wire.command,
            container: wire.container,
            workdir: wire.workdir,
            env: wire.env,
            timeout_seconds: wire.timeout,
            retry: wire.retry.unwrap_or(0),
            inputs: wire.inputs,
            outputs: wire.outputs,
            task_inputs: wire.task_inputs,
            depends_on: wire.depends_on,
            condition: wire.when,
            mounts: wire.mounts,
            services: wire.services,
            matrix: wire.matrix,
            matrix_values: IndexMap::new(),
            secrets: wire.secrets,
            secret_refs: wire.secret_refs,
            requires: wire.requires,
            target: wire.target,
            k8s: wire.k8s,
            semantic: wire.semantic,
            ai_hooks: wire.ai_hooks,
            capability,
            gate: wire.gate,
            credential_binding: wire.credential_binding,
            verify: wire.verify,
            history_hint: wire.history_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_linear_graph() {
        let json = br#"{
            "version": "1",
            "tasks": [
                {"name": "a", "command": "echo A"},
                {"name": "b", "command": "echo B", "depends_on": ["a"]}
            ]
        }"#;
        let (graph, levels) = Graph::parse(json).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(levels, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn version_1_rejects_container_tasks() {
        let json = br#"{
            "version": "1",
            "tasks": [{"name": "a", "container": "alpine"}]
        }"#;
        let err = Graph::parse(json).unwrap_err();
        assert!(matches!(err, CoreError::RequiresVersion2 { .. }));
    }

    #[test]
    fn duplicate_task_name_is_rejected() {
        let json = br#"{
            "version": "1",
            "tasks": [
                {"name": "a", "command": "true"},
                {"name": "a", "command": "true"}
            ]
        }"#;
        let err = Graph::parse(json).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTaskName { .. }));
    }

    #[test]
    fn when_maps_to_condition() {
        let json = br#"{
            "version": "1",
            "tasks": [{"name": "a", "command": "true", "when": "branch == \"main\""}]
        }"#;
        let (graph, _) = Graph::parse(json).unwrap();
        assert_eq!(
            graph.task("a").unwrap().condition.as_deref(),
            Some("branch == \"main\"")
        );
    }

    #[test]
    fn top_level_provides_needs_become_capability_spec() {
        let json = br#"{
            "version": "1",
            "tasks": [
                {"name": "migrate", "command": "true", "provides": [{"name": "db-ready"}]},
                {"name": "app", "command": "true", "needs": ["db-ready"]}
            ]
        }"#;
        let (graph, _) = Graph::parse(json).unwrap();
        let app = graph.task("app").unwrap();
        assert!(app.depends_on.contains("migrate"));
    }
}
