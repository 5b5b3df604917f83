// SPDX-License-Identifier: MIT OR Apache-2.0
//! The hand-rolled HTTP transport: TLS setup, request/response mapping, and
//! the fixed-delay retry table of §4.5.2.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::auth::{AuthConfig, AuthMethod};
use crate::error::{classify_status, is_retryable, K8sError};

/// Fixed retry delays; only 5xx, connection errors, and timeouts retry.
const RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

pub struct K8sClient {
    http: reqwest::Client,
    pub api_url: String,
    pub namespace: String,
    auth: AuthMethod,
}

impl K8sClient {
    pub fn new(config: AuthConfig) -> Result<Self, K8sError> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca) = &config.ca_cert {
            let cert = reqwest::Certificate::from_pem(ca)?;
            builder = builder.add_root_certificate(cert);
        }
        if let AuthMethod::ClientCert { cert_pem, key_pem } = &config.auth {
            let combined = format!("{cert_pem}\n{key_pem}");
            let identity = reqwest::Identity::from_pem(combined.as_bytes())?;
            builder = builder.identity(identity);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            api_url: config.api_url,
            namespace: config.namespace,
            auth: config.auth,
        })
    }

    /// Issue one request and map the response per the status-code table.
    /// Callers that want retry semantics should wrap this with
    /// [`with_retry`].
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, K8sError> {
        let url = format!("{}{}", self.api_url, path);
        let mut req = self.http.request(method, url);
        if let AuthMethod::Bearer(token) = &self.auth {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        classify_status(status, &text)?;
        if text.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&text).map_err(|e| K8sError::ApiError {
                status,
                body: format!("invalid JSON response: {e}"),
            })
        }
    }
}

/// Retry `op` with the fixed delay table, stopping at the first
/// non-retryable error or once the table is exhausted.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, K8sError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, K8sError>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= RETRY_DELAYS_MS.len() || !is_retryable(&err) {
                    return Err(err);
                }
                tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                attempt += 1;
            }
        }
    }
}
