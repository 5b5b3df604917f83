// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job manifest construction (§4.5.3), including the git-clone
//! init-container source-provisioning strategy and its shell-injection
//! allow-list.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::K8sError;

/// Characters permitted in any value interpolated into the init container's
/// shell script. Anything outside this set fails manifest construction
/// rather than being shell-escaped, since the script is assembled as plain
/// text, not invoked with argv-level separation.
const ALLOWLIST_PATTERN: &str = r"^[A-Za-z0-9._/@:-]+$";

fn validate_allowlisted(value: &str, field: &str) -> Result<(), K8sError> {
    let re = Regex::new(ALLOWLIST_PATTERN).expect("static regex is valid");
    if value.is_empty() || !re.is_match(value) {
        return Err(K8sError::InvalidManifestInput(format!(
            "{field} contains characters outside the allow-list: {value:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GitSource {
    pub url: String,
    pub branch: Option<String>,
    pub sha: String,
    pub full_clone: bool,
    pub checkout_path: Option<String>,
    pub ssh_secret_name: Option<String>,
    pub ssh_host: Option<String>,
    /// Name of an env var (populated from a Secret by the caller) holding
    /// an HTTPS token, injected into the clone URL at script runtime —
    /// never embedded as a literal secret value in the manifest.
    pub https_token_env: Option<String>,
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")).unwrap_or(url)
}

/// Build the init container's clone/checkout shell script, validating every
/// interpolated value against the allow-list first.
fn build_clone_script(source: &GitSource) -> Result<String, K8sError> {
    validate_allowlisted(&source.url, "git url")?;
    validate_allowlisted(&source.sha, "git sha")?;
    if let Some(branch) = &source.branch {
        validate_allowlisted(branch, "git branch")?;
    }
    if let Some(host) = &source.ssh_host {
        validate_allowlisted(host, "ssh host")?;
    }
    if let Some(path) = &source.checkout_path {
        validate_allowlisted(path, "checkout path")?;
    }
    if let Some(var) = &source.https_token_env {
        validate_allowlisted(var, "https token env name")?;
    }

    let mut script = String::from("set -eu\n");

    if source.ssh_secret_name.is_some() {
        script.push_str("mkdir -p ~/.ssh\n");
        script.push_str("cp /ssh-keys/id_rsa ~/.ssh/id_rsa\n");
        script.push_str("chmod 600 ~/.ssh/id_rsa\n");
        if let Some(host) = &source.ssh_host {
            script.push_str(&format!("ssh-keyscan {host} >> ~/.ssh/known_hosts 2>/dev/null\n"));
        }
    }

    let clone_url = match &source.https_token_env {
        Some(var) => format!("https://${{{var}}}@{}", strip_scheme(&source.url)),
        None => source.url.clone(),
    };
    let depth_flag = if source.full_clone { String::new() } else { "--depth=1 ".to_string() };
    let branch_flag = source
        .branch
        .as_ref()
        .map(|b| format!("--branch {b} "))
        .unwrap_or_default();

    script.push_str(&format!("git clone {depth_flag}{branch_flag}{clone_url} /workspace/src\n"));
    script.push_str("cd /workspace/src\n");
    script.push_str(&format!("git checkout {}\n", source.sha));
    if let Some(path) = &source.checkout_path {
        script.push_str(&format!("test -e {path}\n"));
    }
    Ok(script)
}

#[derive(Debug, Clone, Default)]
pub struct VolumeSpec {
    pub name: String,
    pub host_path: PathBuf,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceRequests {
    pub memory: Option<String>,
    pub cpu: Option<String>,
    pub gpu: Option<u32>,
}

impl ResourceRequests {
    fn to_json(&self) -> Option<Value> {
        let mut map = serde_json::Map::new();
        if let Some(memory) = &self.memory {
            map.insert("memory".to_string(), json!(memory));
        }
        if let Some(cpu) = &self.cpu {
            map.insert("cpu".to_string(), json!(cpu));
        }
        if let Some(gpu) = self.gpu {
            map.insert("nvidia.com/gpu".to_string(), json!(gpu.to_string()));
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub volumes: Vec<VolumeSpec>,
    pub backoff_limit: u32,
    pub ttl_seconds_after_finished: Option<u32>,
    pub resources: ResourceRequests,
    pub git_source: Option<GitSource>,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: "default".to_string(),
            image: String::new(),
            command: Vec::new(),
            labels: BTreeMap::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            backoff_limit: 0,
            ttl_seconds_after_finished: None,
            resources: ResourceRequests::default(),
            git_source: None,
        }
    }
}

/// Sanitize a task name into the `sykli-<run_id>-<task_name>` Job name
/// format — Kubernetes object names are lowercase DNS labels.
pub fn job_name(run_id: &str, task_name: &str) -> String {
    let sanitized: String = task_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("sykli-{run_id}-{sanitized}")
}

/// Build the Job manifest as raw JSON — deliberately hand-rolled rather
/// than going through `k8s-openapi` typed structs.
pub fn build_job_manifest(spec: &JobSpec) -> Result<Value, K8sError> {
    if spec.image.is_empty() {
        return Err(K8sError::InvalidManifestInput("image is required".to_string()));
    }
    if spec.command.is_empty() {
        return Err(K8sError::InvalidManifestInput("command is required".to_string()));
    }

    let env_list: Vec<Value> = spec
        .env
        .iter()
        .map(|(k, v)| json!({ "name": k, "value": v }))
        .collect();

    let mut volume_mounts: Vec<Value> = spec
        .volumes
        .iter()
        .map(|v| json!({ "name": v.name, "mountPath": v.mount_path }))
        .collect();
    let mut volumes: Vec<Value> = spec
        .volumes
        .iter()
        .map(|v| json!({ "name": v.name, "hostPath": { "path": v.host_path.to_string_lossy() } }))
        .collect();

    let mut init_containers: Vec<Value> = Vec::new();
    if let Some(source) = &spec.git_source {
        let script = build_clone_script(source)?;
        volumes.push(json!({ "name": "workspace", "emptyDir": {} }));
        volume_mounts.push(json!({ "name": "workspace", "mountPath": "/workspace" }));

        let mut clone_mounts = vec![json!({ "name": "workspace", "mountPath": "/workspace" })];
        if let Some(secret) = &source.ssh_secret_name {
            volumes.push(json!({
                "name": "ssh-keys",
                "secret": { "secretName": secret, "defaultMode": 0o600 }
            }));
            clone_mounts.push(json!({ "name": "ssh-keys", "mountPath": "/ssh-keys", "readOnly": true }));
        }

        let mut clone_env = Vec::new();
        if let Some(var) = &source.https_token_env {
            clone_env.push(json!({
                "name": var,
                "valueFrom": { "secretKeyRef": { "name": format!("{}-token", spec.name), "key": "token" } }
            }));
        }

        init_containers.push(json!({
            "name": "clone-source",
            "image": "alpine/git",
            "command": ["sh", "-c", script],
            "volumeMounts": clone_mounts,
            "env": clone_env,
        }));
    }

    let mut container = serde_json::Map::new();
    container.insert("name".to_string(), json!("task"));
    container.insert("image".to_string(), json!(spec.image));
    container.insert("command".to_string(), json!(spec.command));
    container.insert("env".to_string(), json!(env_list));
    container.insert("volumeMounts".to_string(), json!(volume_mounts));
    if spec.git_source.is_some() {
        container.insert("workingDir".to_string(), json!("/workspace/src"));
    }
    if let Some(resources) = spec.resources.to_json() {
        container.insert("resources".to_string(), json!({ "requests": resources }));
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert("name".to_string(), json!(spec.name));
    metadata.insert("namespace".to_string(), json!(spec.namespace));
    if !spec.labels.is_empty() {
        metadata.insert("labels".to_string(), json!(spec.labels));
    }

    Ok(json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": metadata,
        "spec": {
            "backoffLimit": spec.backoff_limit,
            "ttlSecondsAfterFinished": spec.ttl_seconds_after_finished,
            "template": {
                "metadata": { "labels": spec.labels },
                "spec": {
                    "restartPolicy": "Never",
                    "initContainers": init_containers,
                    "containers": [Value::Object(container)],
                    "volumes": volumes,
                }
            }
        }
    }))
}
