// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `webhook` strategy: a one-shot token keyed registry plus a
//! bounded-lifetime callback future. No HTTP listener is started here —
//! that belongs to whatever process actually binds a port and calls
//! [`WebhookRegistry::resolve`] when a callback request arrives. Without a
//! configured listener address this strategy degrades to a configuration
//! error rather than waiting forever for a callback nothing will ever send.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use ulid::Ulid;

use crate::error::GateError;
use crate::strategies::Resolution;

#[derive(Debug, Clone)]
pub struct WebhookDecision {
    pub approved: bool,
    pub approver: Option<String>,
}

#[derive(Default)]
pub struct WebhookRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<WebhookDecision>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token and register a receiver for it.
    pub fn issue(&self) -> (String, oneshot::Receiver<WebhookDecision>) {
        let token = Ulid::new().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("webhook registry poisoned").insert(token.clone(), tx);
        (token, rx)
    }

    /// Called by an external callback handler when it receives a request
    /// bearing `token`. Returns `false` if the token is unknown (already
    /// resolved, expired, or never issued).
    pub fn resolve(&self, token: &str, decision: WebhookDecision) -> bool {
        if let Some(tx) = self.pending.lock().expect("webhook registry poisoned").remove(token) {
            tx.send(decision).is_ok()
        } else {
            false
        }
    }

    fn cancel(&self, token: &str) {
        self.pending.lock().expect("webhook registry poisoned").remove(token);
    }
}

/// Wait for the webhook callback, or `None` if `listen_addr` was never
/// configured — the caller should treat that as a configuration error.
pub async fn wait_for_callback(
    registry: &WebhookRegistry,
    listen_addr: Option<&str>,
) -> Result<(String, Resolution), GateError> {
    let Some(_addr) = listen_addr else {
        return Err(GateError::Configuration(
            "webhook gate requires a configured listener address".to_string(),
        ));
    };
    let (token, rx) = registry.issue();
    match rx.await {
        Ok(decision) => {
            let resolution = if decision.approved {
                Resolution::Approved(decision.approver)
            } else {
                Resolution::Denied
            };
            Ok((token, resolution))
        }
        Err(_) => {
            registry.cancel(&token);
            Ok((token, Resolution::Pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_listener_address_is_a_configuration_error() {
        let registry = WebhookRegistry::new();
        let err = wait_for_callback(&registry, None).await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[tokio::test]
    async fn resolve_approves_the_waiting_future() {
        let registry = WebhookRegistry::new();
        let (token, rx) = registry.issue();
        registry.resolve(&token, WebhookDecision { approved: true, approver: Some("alice".to_string()) });
        let decision = rx.await.unwrap();
        assert!(decision.approved);
        assert_eq!(decision.approver.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn resolving_an_unknown_token_returns_false() {
        let registry = WebhookRegistry::new();
        assert!(!registry.resolve("bogus", WebhookDecision { approved: true, approver: None }));
    }

    #[tokio::test]
    async fn dropped_sender_without_resolution_yields_pending() {
        let registry = WebhookRegistry::new();
        let (token, rx) = registry.issue();
        drop(rx);
        assert!(!registry.resolve(&token, WebhookDecision { approved: true, approver: None }));
    }
}
