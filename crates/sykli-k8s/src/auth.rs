// SPDX-License-Identifier: MIT OR Apache-2.0
//! Auth detection: in-cluster service account, then kubeconfig (§4.5.1).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::K8sError;

const DEFAULT_SA_MOUNT: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone)]
pub enum AuthMethod {
    Bearer(String),
    ClientCert { cert_pem: String, key_pem: String },
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_url: String,
    pub auth: AuthMethod,
    pub ca_cert: Option<Vec<u8>>,
    pub namespace: String,
}

/// Detect auth configuration: in-cluster first, then kubeconfig.
pub fn detect_auth(context: Option<&str>) -> Result<AuthConfig, K8sError> {
    if let Some(cfg) = try_in_cluster(Path::new(DEFAULT_SA_MOUNT))? {
        return Ok(cfg);
    }
    let path = kubeconfig_path()?;
    from_kubeconfig_file(&path, context)
}

fn try_in_cluster(mount: &Path) -> Result<Option<AuthConfig>, K8sError> {
    let token_path = mount.join("token");
    let ca_path = mount.join("ca.crt");
    let ns_path = mount.join("namespace");
    if !token_path.is_file() {
        return Ok(None);
    }
    let token = std::fs::read_to_string(&token_path)?.trim().to_string();
    let ca_cert = std::fs::read(&ca_path).ok();
    let namespace = std::fs::read_to_string(&ns_path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string());
    let host = std::env::var("KUBERNETES_SERVICE_HOST").unwrap_or_else(|_| "kubernetes.default.svc".to_string());
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    Ok(Some(AuthConfig {
        api_url: format!("https://{host}:{port}"),
        auth: AuthMethod::Bearer(token),
        ca_cert,
        namespace,
    }))
}

fn kubeconfig_path() -> Result<PathBuf, K8sError> {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME").map_err(|_| K8sError::AuthNotFound)?;
    Ok(PathBuf::from(home).join(".kube").join("config"))
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: Option<String>,
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterInfo,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority")]
    certificate_authority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextInfo,
}

#[derive(Debug, Deserialize)]
struct ContextInfo {
    cluster: String,
    user: String,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserInfo,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    token: Option<String>,
    #[serde(rename = "client-certificate-data")]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-key-data")]
    client_key_data: Option<String>,
    exec: Option<serde_yaml::Value>,
    #[serde(rename = "auth-provider")]
    auth_provider: Option<serde_yaml::Value>,
}

fn from_kubeconfig_file(path: &Path, context: Option<&str>) -> Result<AuthConfig, K8sError> {
    let raw = std::fs::read_to_string(path).map_err(|_| K8sError::AuthNotFound)?;
    from_kubeconfig_str(&raw, context)
}

fn from_kubeconfig_str(raw: &str, context: Option<&str>) -> Result<AuthConfig, K8sError> {
    let config: Kubeconfig = serde_yaml::from_str(raw)?;

    let context_name = context
        .map(str::to_string)
        .or_else(|| config.current_context.clone())
        .ok_or(K8sError::AuthNotFound)?;

    let ctx = config
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .ok_or(K8sError::AuthNotFound)?;

    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == ctx.context.cluster)
        .ok_or(K8sError::AuthNotFound)?;

    let user = config
        .users
        .iter()
        .find(|u| u.name == ctx.context.user)
        .ok_or(K8sError::AuthNotFound)?;

    if user.user.exec.is_some() || user.user.auth_provider.is_some() {
        return Err(K8sError::ExecAuthNotSupported);
    }

    use base64::Engine;
    let decode = |s: &str| -> Result<Vec<u8>, K8sError> {
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| K8sError::InvalidManifestInput(e.to_string()))
    };

    let ca_cert = match (&cluster.cluster.certificate_authority_data, &cluster.cluster.certificate_authority) {
        (Some(data), _) => Some(decode(data)?),
        (None, Some(path)) => Some(std::fs::read(path)?),
        (None, None) => None,
    };

    let auth = if let Some(token) = &user.user.token {
        AuthMethod::Bearer(token.clone())
    } else if let (Some(cert), Some(key)) = (&user.user.client_certificate_data, &user.user.client_key_data) {
        AuthMethod::ClientCert {
            cert_pem: String::from_utf8_lossy(&decode(cert)?).to_string(),
            key_pem: String::from_utf8_lossy(&decode(key)?).to_string(),
        }
    } else {
        return Err(K8sError::AuthNotFound);
    };

    Ok(AuthConfig {
        api_url: cluster.cluster.server.clone(),
        auth,
        ca_cert,
        namespace: ctx.context.namespace.clone().unwrap_or_else(|| "default".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE_KUBECONFIG: &str = r#"
apiVersion: v1
clusters:
- name: dev
  cluster:
    server: https://dev.example.com:6443
current-context: dev-ctx
contexts:
- name: dev-ctx
  context:
    cluster: dev
    user: dev-user
    namespace: staging
users:
- name: dev-user
  user:
    token: abc123
"#;

    #[test]
    fn parses_bearer_token_context() {
        let cfg = from_kubeconfig_str(SAMPLE_KUBECONFIG, None).unwrap();
        assert_eq!(cfg.api_url, "https://dev.example.com:6443");
        assert_eq!(cfg.namespace, "staging");
        assert!(matches!(cfg.auth, AuthMethod::Bearer(ref t) if t == "abc123"));
    }

    #[test]
    fn exec_auth_is_rejected() {
        let yaml = r#"
clusters:
- name: dev
  cluster: { server: https://x }
current-context: dev-ctx
contexts:
- name: dev-ctx
  context: { cluster: dev, user: dev-user }
users:
- name: dev-user
  user:
    exec:
      command: aws
"#;
        let err = from_kubeconfig_str(yaml, None).unwrap_err();
        assert!(matches!(err, K8sError::ExecAuthNotSupported));
    }

    #[test]
    fn missing_context_is_auth_not_found() {
        let err = from_kubeconfig_str(SAMPLE_KUBECONFIG, Some("nope")).unwrap_err();
        assert!(matches!(err, K8sError::AuthNotFound));
    }

    #[test]
    fn in_cluster_mount_is_detected_when_present() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("token"), "sa-token").unwrap();
        fs::write(dir.path().join("namespace"), "prod").unwrap();
        let cfg = try_in_cluster(dir.path()).unwrap().unwrap();
        assert!(matches!(cfg.auth, AuthMethod::Bearer(ref t) if t == "sa-token"));
        assert_eq!(cfg.namespace, "prod");
    }

    #[test]
    fn in_cluster_absent_returns_none() {
        let dir = tempdir().unwrap();
        assert!(try_in_cluster(dir.path()).unwrap().is_none());
    }
}
