// SPDX-License-Identifier: MIT OR Apache-2.0
//! The approval gate state machine (§4.8): `initial -> waiting ->
//! (approved | denied | timed_out)`, with `prompt`, `env`, `file`, and
//! `webhook` strategies.

mod config;
mod error;
mod state;
mod strategies;
mod webhook;

pub use config::{GateConfig, GateStrategy};
pub use error::GateError;
pub use state::{GateOutcome, GateState};
pub use webhook::{WebhookDecision, WebhookRegistry};

use std::time::{Duration, Instant};

use serde_json::json;
use sykli_events::{Event, EventBus, EventType};
use sykli_runtime::CancellationToken;

use strategies::{check_env, check_file, read_prompt_decision, Resolution, POLL_INTERVAL};

enum Settled {
    Approved(Option<String>),
    Denied,
    TimedOut,
    Cancelled,
}

async fn poll_until(mut check: impl FnMut() -> Resolution, timeout: Duration, cancel: &CancellationToken) -> Settled {
    let deadline = Instant::now() + timeout;
    loop {
        match check() {
            Resolution::Approved(who) => return Settled::Approved(who),
            Resolution::Denied => return Settled::Denied,
            Resolution::Pending => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return Settled::TimedOut;
        }
        let wait = POLL_INTERVAL.min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return Settled::Cancelled,
        }
    }
}

/// Optional webhook wiring: the shared registry plus the listener address
/// an external process is bound to, if any.
pub struct WebhookContext<'a> {
    pub registry: &'a WebhookRegistry,
    pub listen_addr: Option<&'a str>,
}

/// Run a gate task to completion. Emits `gate_waiting` on entry to
/// `waiting` and `gate_resolved` on exit.
pub async fn run_gate(
    config: &GateConfig,
    run_id: &str,
    node: &str,
    bus: &EventBus,
    cancel: &CancellationToken,
    webhook: Option<WebhookContext<'_>>,
) -> Result<GateOutcome, GateError> {
    config.validate()?;
    let strategy = config.strategy()?;
    let timeout = config.timeout();

    debug_assert!(GateState::Initial.can_transition_to(GateState::Waiting));
    bus.publish(Event::new(
        EventType::GateWaiting,
        run_id,
        node,
        json!({
            "strategy": strategy,
            "timeout_seconds": timeout.as_secs(),
            "message": config.message,
        }),
    ));

    let started = Instant::now();
    let settled = match strategy {
        GateStrategy::Env => {
            let var = config.env_var.clone().expect("validated non-empty");
            poll_until(move || check_env(&var), timeout, cancel).await
        }
        GateStrategy::File => {
            let path = config.file_path.clone().expect("validated non-empty");
            poll_until(move || check_file(&path), timeout, cancel).await
        }
        GateStrategy::Prompt => {
            tokio::select! {
                res = read_prompt_decision(config.message.as_deref(), timeout) => {
                    match res? {
                        Resolution::Approved(who) => Settled::Approved(who),
                        Resolution::Denied => Settled::Denied,
                        Resolution::Pending => Settled::TimedOut,
                    }
                }
                _ = cancel.cancelled() => Settled::Cancelled,
            }
        }
        GateStrategy::Webhook => {
            let Some(ctx) = webhook else {
                return Err(GateError::Configuration(
                    "webhook gate requires a registry to be configured".to_string(),
                ));
            };
            tokio::select! {
                res = webhook::wait_for_callback(ctx.registry, ctx.listen_addr) => {
                    let (_, resolution) = res?;
                    match resolution {
                        Resolution::Approved(who) => Settled::Approved(who),
                        Resolution::Denied => Settled::Denied,
                        Resolution::Pending => Settled::TimedOut,
                    }
                }
                _ = tokio::time::sleep(timeout) => Settled::TimedOut,
                _ = cancel.cancelled() => Settled::Cancelled,
            }
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let (state, approver, reason) = match settled {
        Settled::Approved(who) => (GateState::Approved, who, None),
        Settled::Denied => (GateState::Denied, None, Some("denied".to_string())),
        Settled::TimedOut => (GateState::TimedOut, None, Some("timed_out".to_string())),
        Settled::Cancelled => (GateState::Denied, None, Some("cancelled".to_string())),
    };
    debug_assert!(GateState::Waiting.can_transition_to(state));

    let outcome = GateOutcome { state, approver, duration_ms, reason };
    bus.publish(Event::new(
        EventType::GateResolved,
        run_id,
        node,
        json!({
            "outcome": if outcome.passed() { "approved" } else { "failed" },
            "state": outcome.state,
            "approver": outcome.approver,
            "reason": outcome.reason,
            "duration_ms": outcome.duration_ms,
        }),
    ));

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sykli_events::EventSubscription;

    async fn next_of_type(sub: &mut EventSubscription, ty: EventType) -> Event {
        loop {
            let ev = sub.recv().await.unwrap();
            if ev.event_type == ty {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn env_gate_approves_when_var_is_preset() {
        std::env::set_var("SYKLI_GATE_LIB_TEST_1", "yes");
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let cancel = CancellationToken::new();
        let config = GateConfig {
            strategy: Some(GateStrategy::Env),
            env_var: Some("SYKLI_GATE_LIB_TEST_1".to_string()),
            timeout_seconds: Some(5),
            ..Default::default()
        };
        let outcome = run_gate(&config, "run1", "approve", &bus, &cancel, None).await.unwrap();
        assert!(outcome.passed());
        let waiting = next_of_type(&mut sub, EventType::GateWaiting).await;
        assert_eq!(waiting.run_id, "run1");
        let resolved = next_of_type(&mut sub, EventType::GateResolved).await;
        assert_eq!(resolved.data["outcome"], "approved");
        std::env::remove_var("SYKLI_GATE_LIB_TEST_1");
    }

    #[tokio::test]
    async fn env_gate_times_out_when_var_never_set() {
        std::env::remove_var("SYKLI_GATE_LIB_TEST_2");
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let config = GateConfig {
            strategy: Some(GateStrategy::Env),
            env_var: Some("SYKLI_GATE_LIB_TEST_2".to_string()),
            timeout_seconds: Some(1),
            ..Default::default()
        };
        let outcome = run_gate(&config, "run1", "approve", &bus, &cancel, None).await.unwrap();
        assert_eq!(outcome.state, GateState::TimedOut);
        assert!(!outcome.passed());
    }

    #[tokio::test]
    async fn cancellation_resolves_as_denied_with_reason() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let config = GateConfig {
            strategy: Some(GateStrategy::Env),
            env_var: Some("SYKLI_GATE_LIB_TEST_3".to_string()),
            timeout_seconds: Some(30),
            ..Default::default()
        };
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel2.cancel();
        });
        let outcome = run_gate(&config, "run1", "approve", &bus, &cancel, None).await.unwrap();
        assert_eq!(outcome.state, GateState::Denied);
        assert_eq!(outcome.reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn webhook_without_registry_is_a_configuration_error() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let config = GateConfig { strategy: Some(GateStrategy::Webhook), timeout_seconds: Some(5), ..Default::default() };
        let err = run_gate(&config, "run1", "approve", &bus, &cancel, None).await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[tokio::test]
    async fn webhook_without_listener_address_degrades_to_configuration_error() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let registry = WebhookRegistry::new();
        let config = GateConfig { strategy: Some(GateStrategy::Webhook), timeout_seconds: Some(5), ..Default::default() };
        let ctx = WebhookContext { registry: &registry, listen_addr: None };
        let err = run_gate(&config, "run1", "approve", &bus, &cancel, Some(ctx)).await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_entering_waiting() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let cancel = CancellationToken::new();
        let config = GateConfig { strategy: Some(GateStrategy::Env), ..Default::default() };
        let err = run_gate(&config, "run1", "approve", &bus, &cancel, None).await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
        assert!(sub.try_recv().is_none());
    }
}
