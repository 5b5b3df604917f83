// SPDX-License-Identifier: MIT OR Apache-2.0
//! Job lifecycle: create, poll for completion, fetch logs, delete (§4.5.4).

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::K8sError;
use crate::http::{with_retry, K8sClient};
use crate::manifest::JobSpec;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Bytes of log tail kept when a job fails, mirroring the local runtime's
/// tail buffer sizing.
const LOG_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Active,
    Succeeded,
    Failed,
}

pub struct JobHandle {
    client: K8sClient,
    pub name: String,
    pub namespace: String,
}

fn jobs_path(namespace: &str) -> String {
    format!("/apis/batch/v1/namespaces/{namespace}/jobs")
}

fn job_path(namespace: &str, name: &str) -> String {
    format!("/apis/batch/v1/namespaces/{namespace}/jobs/{name}")
}

fn pods_path(namespace: &str, job_name: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/pods?labelSelector=job-name%3D{job_name}")
}

fn pod_log_path(namespace: &str, pod_name: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/pods/{pod_name}/log?tailLines=200")
}

impl JobHandle {
    pub async fn create(client: K8sClient, spec: &JobSpec) -> Result<Self, K8sError> {
        let manifest = crate::manifest::build_job_manifest(spec)?;
        let path = jobs_path(&spec.namespace);
        with_retry(|| client.request(Method::POST, &path, Some(&manifest))).await?;
        Ok(Self {
            client,
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        })
    }

    pub async fn get(&self) -> Result<Value, K8sError> {
        let path = job_path(&self.namespace, &self.name);
        with_retry(|| self.client.request(Method::GET, &path, None)).await
    }

    pub async fn delete(&self, propagation_policy: &str) -> Result<(), K8sError> {
        let path = job_path(&self.namespace, &self.name);
        let body = serde_json::json!({ "propagationPolicy": propagation_policy });
        with_retry(|| self.client.request(Method::DELETE, &path, Some(&body))).await?;
        Ok(())
    }

    fn phase_of(status: &Value) -> JobPhase {
        let succeeded = status["status"]["succeeded"].as_u64().unwrap_or(0);
        let failed = status["status"]["failed"].as_u64().unwrap_or(0);
        if succeeded > 0 {
            JobPhase::Succeeded
        } else if failed > 0 {
            JobPhase::Failed
        } else {
            JobPhase::Active
        }
    }

    /// Poll the Job at a 1s interval until it reaches a terminal phase or
    /// `timeout` elapses.
    pub async fn wait_complete(&self, timeout: Duration) -> Result<JobPhase, K8sError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.get().await?;
            match Self::phase_of(&status) {
                JobPhase::Active => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(K8sError::JobTimedOut(self.name.clone()));
                    }
                    tokio::time::sleep(POLL_INTERVAL.min(deadline - tokio::time::Instant::now())).await;
                }
                phase => return Ok(phase),
            }
        }
    }

    async fn find_pod_name(&self) -> Result<String, K8sError> {
        let path = pods_path(&self.namespace, &self.name);
        let list = with_retry(|| self.client.request(Method::GET, &path, None)).await?;
        list["items"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|pod| pod["metadata"]["name"].as_str())
            .map(str::to_string)
            .ok_or_else(|| K8sError::NoPods(self.name.clone()))
    }

    /// Fetch the job's pod logs, retrying once on a scheduling race where
    /// the pod doesn't exist yet.
    pub async fn logs(&self) -> Result<String, K8sError> {
        let pod_name = match self.find_pod_name().await {
            Ok(name) => name,
            Err(K8sError::NoPods(_)) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                self.find_pod_name().await?
            }
            Err(e) => return Err(e),
        };
        let path = pod_log_path(&self.namespace, &pod_name);
        let raw = self.client.request(Method::GET, &path, None).await;
        match raw {
            Ok(Value::String(s)) => Ok(tail(&s, LOG_TAIL_BYTES)),
            Ok(other) => Ok(tail(&other.to_string(), LOG_TAIL_BYTES)),
            Err(e) => {
                warn!(job = %self.name, error = %e, "failed to fetch job logs");
                Err(e)
            }
        }
    }
}

fn tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let start = s.len() - max_bytes;
    let boundary = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
    s[boundary..].to_string()
}

/// Build the unique, DNS-label-safe Job name for a run/task pair.
pub fn unique_job_name(run_id: &str, task_name: &str) -> String {
    let name = crate::manifest::job_name(run_id, task_name);
    debug!(job = %name, "generated job name");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn active_job_has_no_succeeded_or_failed_count() {
        let status = json!({ "status": {} });
        assert_eq!(JobHandle::phase_of(&status), JobPhase::Active);
    }

    #[test]
    fn succeeded_count_above_zero_is_succeeded() {
        let status = json!({ "status": { "succeeded": 1 } });
        assert_eq!(JobHandle::phase_of(&status), JobPhase::Succeeded);
    }

    #[test]
    fn failed_count_above_zero_is_failed() {
        let status = json!({ "status": { "failed": 1 } });
        assert_eq!(JobHandle::phase_of(&status), JobPhase::Failed);
    }

    #[test]
    fn succeeded_takes_priority_over_failed() {
        let status = json!({ "status": { "succeeded": 1, "failed": 1 } });
        assert_eq!(JobHandle::phase_of(&status), JobPhase::Succeeded);
    }

    #[test]
    fn tail_keeps_only_the_trailing_bytes() {
        let long = "a".repeat(5000);
        let tailed = tail(&long, 4096);
        assert_eq!(tailed.len(), 4096);
    }

    #[test]
    fn tail_is_a_no_op_under_the_limit() {
        assert_eq!(tail("short", 4096), "short");
    }

    #[test]
    fn unique_job_name_is_deterministic() {
        assert_eq!(unique_job_name("run1", "build"), unique_job_name("run1", "build"));
    }
}
