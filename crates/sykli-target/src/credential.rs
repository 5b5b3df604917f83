// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cloud credential exchange (§4.10): trade the CI platform's OIDC token for
//! short-lived AWS/GCP/Azure credentials via each provider's federated-identity
//! endpoint. Endpoints are injectable so tests can point at a local mock
//! server instead of the real STS/IAM/AAD hosts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use sykli_core::CredentialBinding;

use crate::error::TargetError;

#[derive(Debug, Clone)]
pub struct ExchangedCredential {
    /// Env vars to merge into the task's environment.
    pub env: BTreeMap<String, String>,
}

#[async_trait]
pub trait CredentialExchanger: Send + Sync {
    async fn exchange(&self, binding: &CredentialBinding, oidc_token: &str) -> Result<ExchangedCredential, TargetError>;
}

/// Reads the CI platform's OIDC identity token: GitLab's job JWT directly,
/// or GitHub Actions' token-issuance endpoint.
pub async fn ci_oidc_token(http: &reqwest::Client) -> Result<String, TargetError> {
    if let Ok(token) = std::env::var("CI_JOB_JWT") {
        return Ok(token);
    }
    let (url, bearer) = match (
        std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL"),
        std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN"),
    ) {
        (Ok(url), Ok(bearer)) => (url, bearer),
        _ => return Err(TargetError::Credential("no OIDC token source found in environment".to_string())),
    };

    #[derive(Deserialize)]
    struct TokenResponse {
        value: String,
    }
    let resp: TokenResponse = http
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await?
        .json()
        .await?;
    Ok(resp.value)
}

/// Writes `contents` to a fresh file under the OS temp directory with
/// owner-only permissions, for credential formats providers expect on disk
/// (e.g. GCP's `GOOGLE_APPLICATION_CREDENTIALS`).
pub fn write_credential_file(contents: &str) -> Result<PathBuf, TargetError> {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let path = std::env::temp_dir().join(format!("sykli-cred-{}-{nanos}.json", std::process::id()));
    std::fs::write(&path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(path)
}

fn extract_xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

/// AWS: `sts:AssumeRoleWithWebIdentity`. No XML crate exists in the stack
/// this workspace draws from, so the handful of tags in the response are
/// pulled out with plain string search rather than pulling one in.
pub struct AwsExchanger {
    endpoint: String,
    http: reqwest::Client,
}

impl AwsExchanger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), http: reqwest::Client::new() }
    }
}

impl Default for AwsExchanger {
    fn default() -> Self {
        Self::new("https://sts.amazonaws.com")
    }
}

#[async_trait]
impl CredentialExchanger for AwsExchanger {
    async fn exchange(&self, binding: &CredentialBinding, oidc_token: &str) -> Result<ExchangedCredential, TargetError> {
        let role_arn = binding
            .role_arn
            .as_deref()
            .ok_or_else(|| TargetError::Credential("aws credential binding requires role_arn".to_string()))?;
        let duration = binding.duration_seconds.unwrap_or(3600);

        let body = self
            .http
            .post(&self.endpoint)
            .query(&[
                ("Action", "AssumeRoleWithWebIdentity"),
                ("Version", "2011-06-15"),
                ("RoleArn", role_arn),
                ("RoleSessionName", "sykli"),
                ("WebIdentityToken", oidc_token),
                ("DurationSeconds", &duration.to_string()),
            ])
            .send()
            .await?
            .text()
            .await?;

        let access_key = extract_xml_tag(&body, "AccessKeyId")
            .ok_or_else(|| TargetError::Credential("AssumeRoleWithWebIdentity response missing AccessKeyId".to_string()))?;
        let secret_key = extract_xml_tag(&body, "SecretAccessKey")
            .ok_or_else(|| TargetError::Credential("AssumeRoleWithWebIdentity response missing SecretAccessKey".to_string()))?;
        let session_token = extract_xml_tag(&body, "SessionToken")
            .ok_or_else(|| TargetError::Credential("AssumeRoleWithWebIdentity response missing SessionToken".to_string()))?;

        let mut env = BTreeMap::new();
        env.insert("AWS_ACCESS_KEY_ID".to_string(), access_key);
        env.insert("AWS_SECRET_ACCESS_KEY".to_string(), secret_key);
        env.insert("AWS_SESSION_TOKEN".to_string(), session_token);
        Ok(ExchangedCredential { env })
    }
}

#[derive(Deserialize)]
struct StsTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GenerateAccessTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// GCP: workload identity federation STS token exchange, then IAM
/// Credentials `generateAccessToken` to impersonate the target service
/// account.
pub struct GcpExchanger {
    sts_endpoint: String,
    iam_endpoint: String,
    http: reqwest::Client,
}

impl GcpExchanger {
    pub fn new(sts_endpoint: impl Into<String>, iam_endpoint: impl Into<String>) -> Self {
        Self { sts_endpoint: sts_endpoint.into(), iam_endpoint: iam_endpoint.into(), http: reqwest::Client::new() }
    }
}

impl Default for GcpExchanger {
    fn default() -> Self {
        Self::new("https://sts.googleapis.com/v1/token", "https://iamcredentials.googleapis.com/v1")
    }
}

#[async_trait]
impl CredentialExchanger for GcpExchanger {
    async fn exchange(&self, binding: &CredentialBinding, oidc_token: &str) -> Result<ExchangedCredential, TargetError> {
        let audience = binding.workload_identity_provider.as_deref().ok_or_else(|| {
            TargetError::Credential("gcp credential binding requires workload_identity_provider".to_string())
        })?;
        let service_account = binding
            .service_account
            .as_deref()
            .ok_or_else(|| TargetError::Credential("gcp credential binding requires service_account".to_string()))?;

        let federated: StsTokenResponse = self
            .http
            .post(&self.sts_endpoint)
            .json(&serde_json::json!({
                "audience": audience,
                "grantType": "urn:ietf:params:oauth:grant-type:token-exchange",
                "requestedTokenType": "urn:ietf:params:oauth:token-type:access_token",
                "scope": "https://www.googleapis.com/auth/cloud-platform",
                "subjectTokenType": "urn:ietf:params:oauth:token-type:jwt",
                "subjectToken": oidc_token,
            }))
            .send()
            .await?
            .json()
            .await?;

        let impersonate_url = format!(
            "{}/projects/-/serviceAccounts/{service_account}:generateAccessToken",
            self.iam_endpoint
        );
        let duration = binding.duration_seconds.unwrap_or(3600);
        let impersonated: GenerateAccessTokenResponse = self
            .http
            .post(impersonate_url)
            .bearer_auth(&federated.access_token)
            .json(&serde_json::json!({
                "scope": ["https://www.googleapis.com/auth/cloud-platform"],
                "lifetime": format!("{duration}s"),
            }))
            .send()
            .await?
            .json()
            .await?;

        let mut env = BTreeMap::new();
        env.insert("CLOUDSDK_AUTH_ACCESS_TOKEN".to_string(), impersonated.access_token);
        Ok(ExchangedCredential { env })
    }
}

#[derive(Deserialize)]
struct AzureTokenResponse {
    access_token: String,
}

/// Azure: federated-credential OAuth2 client-credentials exchange against
/// Azure AD.
pub struct AzureExchanger {
    endpoint_template: String,
    http: reqwest::Client,
}

impl AzureExchanger {
    pub fn new(endpoint_template: impl Into<String>) -> Self {
        Self { endpoint_template: endpoint_template.into(), http: reqwest::Client::new() }
    }
}

impl Default for AzureExchanger {
    fn default() -> Self {
        Self::new("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
    }
}

#[async_trait]
impl CredentialExchanger for AzureExchanger {
    async fn exchange(&self, binding: &CredentialBinding, oidc_token: &str) -> Result<ExchangedCredential, TargetError> {
        let client_id = binding
            .client_id
            .as_deref()
            .ok_or_else(|| TargetError::Credential("azure credential binding requires client_id".to_string()))?;
        let tenant_id = binding
            .tenant_id
            .as_deref()
            .ok_or_else(|| TargetError::Credential("azure credential binding requires tenant_id".to_string()))?;
        let url = self.endpoint_template.replace("{tenant}", tenant_id);

        let form = [
            ("client_id", client_id),
            ("client_assertion", oidc_token),
            ("client_assertion_type", "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"),
            ("grant_type", "client_credentials"),
            ("scope", "https://management.azure.com/.default"),
        ];
        let resp: AzureTokenResponse = self.http.post(url).form(&form).send().await?.json().await?;

        let mut env = BTreeMap::new();
        env.insert("AZURE_ACCESS_TOKEN".to_string(), resp.access_token);
        Ok(ExchangedCredential { env })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_core::CloudProvider;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn aws_binding(role_arn: &str) -> CredentialBinding {
        CredentialBinding {
            provider: CloudProvider::Aws,
            duration_seconds: Some(900),
            role_arn: Some(role_arn.to_string()),
            workload_identity_provider: None,
            service_account: None,
            client_id: None,
            tenant_id: None,
        }
    }

    #[test]
    fn extract_xml_tag_finds_the_nested_value() {
        let body = "<a><AccessKeyId>AKIA123</AccessKeyId></a>";
        assert_eq!(extract_xml_tag(body, "AccessKeyId").as_deref(), Some("AKIA123"));
    }

    #[test]
    fn extract_xml_tag_is_none_when_absent() {
        assert!(extract_xml_tag("<a></a>", "AccessKeyId").is_none());
    }

    #[test]
    fn write_credential_file_is_owner_only() {
        let path = write_credential_file("{}").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn aws_exchange_parses_the_sts_xml_response() {
        let server = MockServer::start().await;
        let xml = r#"<AssumeRoleWithWebIdentityResponse>
            <AssumeRoleWithWebIdentityResult>
                <Credentials>
                    <AccessKeyId>AKIAEXAMPLE</AccessKeyId>
                    <SecretAccessKey>secret</SecretAccessKey>
                    <SessionToken>token</SessionToken>
                </Credentials>
            </AssumeRoleWithWebIdentityResult>
        </AssumeRoleWithWebIdentityResponse>"#;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;

        let exchanger = AwsExchanger::new(server.uri());
        let result = exchanger.exchange(&aws_binding("arn:aws:iam::123:role/ci"), "fake-oidc").await.unwrap();
        assert_eq!(result.env["AWS_ACCESS_KEY_ID"], "AKIAEXAMPLE");
        assert_eq!(result.env["AWS_SESSION_TOKEN"], "token");
    }

    #[tokio::test]
    async fn aws_exchange_requires_role_arn() {
        let exchanger = AwsExchanger::new("http://127.0.0.1:0");
        let mut binding = aws_binding("unused");
        binding.role_arn = None;
        let err = exchanger.exchange(&binding, "fake-oidc").await.unwrap_err();
        assert!(matches!(err, TargetError::Credential(_)));
    }

    #[tokio::test]
    async fn gcp_exchange_chains_sts_and_impersonation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "federated" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/-/serviceAccounts/ci@proj.iam.gserviceaccount.com:generateAccessToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "accessToken": "impersonated" })))
            .mount(&server)
            .await;

        let exchanger = GcpExchanger::new(format!("{}/token", server.uri()), server.uri());
        let binding = CredentialBinding {
            provider: CloudProvider::Gcp,
            duration_seconds: None,
            role_arn: None,
            workload_identity_provider: Some("//iam.googleapis.com/projects/123/pool".to_string()),
            service_account: Some("ci@proj.iam.gserviceaccount.com".to_string()),
            client_id: None,
            tenant_id: None,
        };
        let result = exchanger.exchange(&binding, "fake-oidc").await.unwrap();
        assert_eq!(result.env["CLOUDSDK_AUTH_ACCESS_TOKEN"], "impersonated");
    }

    #[tokio::test]
    async fn azure_exchange_substitutes_tenant_into_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/my-tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "azure-token" })))
            .mount(&server)
            .await;

        let exchanger = AzureExchanger::new(format!("{}/{{tenant}}/oauth2/v2.0/token", server.uri()));
        let binding = CredentialBinding {
            provider: CloudProvider::Azure,
            duration_seconds: None,
            role_arn: None,
            workload_identity_provider: None,
            service_account: None,
            client_id: Some("client-1".to_string()),
            tenant_id: Some("my-tenant".to_string()),
        };
        let result = exchanger.exchange(&binding, "fake-oidc").await.unwrap();
        assert_eq!(result.env["AZURE_ACCESS_TOKEN"], "azure-token");
    }

    #[tokio::test]
    async fn ci_oidc_token_reads_gitlab_job_jwt_directly() {
        std::env::set_var("CI_JOB_JWT", "gitlab-jwt");
        let token = ci_oidc_token(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "gitlab-jwt");
        std::env::remove_var("CI_JOB_JWT");
    }

    #[tokio::test]
    async fn ci_oidc_token_errors_when_no_source_is_configured() {
        std::env::remove_var("CI_JOB_JWT");
        std::env::remove_var("ACTIONS_ID_TOKEN_REQUEST_URL");
        std::env::remove_var("ACTIONS_ID_TOKEN_REQUEST_TOKEN");
        let err = ci_oidc_token(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, TargetError::Credential(_)));
    }
}
