// SPDX-License-Identifier: MIT OR Apache-2.0
//! The internal event shape broadcast on the bus, and its external wire
//! representation (§6.4).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Every event kind the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    TaskStarted,
    TaskCompleted,
    TaskOutput,
    RunCompleted,
    GateWaiting,
    GateResolved,
    CredentialExchange,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RunStarted => "run_started",
            EventType::TaskStarted => "task_started",
            EventType::TaskCompleted => "task_completed",
            EventType::TaskOutput => "task_output",
            EventType::RunCompleted => "run_completed",
            EventType::GateWaiting => "gate_waiting",
            EventType::GateResolved => "gate_resolved",
            EventType::CredentialExchange => "credential_exchange",
        }
    }

    /// External consumers speak `ci_run_*` / `ci_task_*`; everything else
    /// passes through unchanged since §6.4 only documents the run/task
    /// mapping.
    fn external_type(self) -> &'static str {
        match self {
            EventType::RunStarted => "ci_run_started",
            EventType::RunCompleted => "ci_run_completed",
            EventType::TaskStarted => "ci_task_started",
            EventType::TaskCompleted => "ci_task_completed",
            EventType::TaskOutput => "ci_task_output",
            EventType::GateWaiting => "gate_waiting",
            EventType::GateResolved => "gate_resolved",
            EventType::CredentialExchange => "credential_exchange",
        }
    }

    fn is_task_scoped(self) -> bool {
        !matches!(self, EventType::RunStarted | EventType::RunCompleted)
    }
}

/// An event as produced internally and carried on the bus. `timestamp` is
/// milliseconds since the Unix epoch, taken from the ULID itself so the two
/// never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Ulid,
    pub timestamp: u64,
    pub event_type: EventType,
    pub run_id: String,
    pub node: String,
    pub data: serde_json::Value,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub duration_us: Option<u64>,
}

impl Event {
    pub fn new(event_type: EventType, run_id: impl Into<String>, node: impl Into<String>, data: serde_json::Value) -> Self {
        let id = Ulid::new();
        Self {
            timestamp: id.timestamp_ms(),
            id,
            event_type,
            run_id: run_id.into(),
            node: node.into(),
            data,
            trace_id: None,
            span_id: None,
            duration_us: None,
        }
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_duration_us(mut self, duration_us: u64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    fn failed(&self) -> bool {
        matches!(
            self.data.get("outcome").and_then(|v| v.as_str()),
            Some("failed") | Some("failure") | Some("error")
        )
    }

    /// Render the AHTI-compatible external shape described in §6.4.
    pub fn to_wire(&self) -> WireEvent {
        let severity = if self.failed() { "error" } else { "info" };
        let outcome = self
            .data
            .get("outcome")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let subtype = self
            .data
            .get("subtype")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut entities = Vec::new();
        if self.event_type.is_task_scoped() {
            entities.push(WireEntity {
                entity_type: "task".to_string(),
                id: self.node.clone(),
                name: self.node.clone(),
                state: outcome.clone().unwrap_or_else(|| "running".to_string()),
                attributes: BTreeMap::new(),
            });
        }
        entities.push(WireEntity {
            entity_type: "run".to_string(),
            id: self.run_id.clone(),
            name: self.run_id.clone(),
            state: outcome.clone().unwrap_or_else(|| "running".to_string()),
            attributes: BTreeMap::new(),
        });

        WireEvent {
            id: self.id.to_string(),
            timestamp: self.timestamp,
            event_type: self.event_type.external_type().to_string(),
            subtype,
            severity: severity.to_string(),
            outcome,
            cluster: None,
            namespace: None,
            source: "sykli".to_string(),
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            entities,
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    pub name: String,
    pub state: String,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    pub entities: Vec<WireEntity>,
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_event_maps_to_ci_run_prefix() {
        let ev = Event::new(EventType::RunStarted, "run-1", "", serde_json::json!({}));
        let wire = ev.to_wire();
        assert_eq!(wire.event_type, "ci_run_started");
        assert_eq!(wire.source, "sykli");
    }

    #[test]
    fn task_event_carries_a_task_entity() {
        let ev = Event::new(EventType::TaskStarted, "run-1", "build", serde_json::json!({}));
        let wire = ev.to_wire();
        assert_eq!(wire.entities.len(), 2);
        assert_eq!(wire.entities[0].entity_type, "task");
        assert_eq!(wire.entities[0].id, "build");
    }

    #[test]
    fn failed_outcome_is_error_severity() {
        let ev = Event::new(
            EventType::TaskCompleted,
            "run-1",
            "build",
            serde_json::json!({ "outcome": "failed" }),
        );
        assert_eq!(ev.to_wire().severity, "error");
    }

    #[test]
    fn successful_outcome_is_info_severity() {
        let ev = Event::new(
            EventType::TaskCompleted,
            "run-1",
            "build",
            serde_json::json!({ "outcome": "succeeded" }),
        );
        assert_eq!(ev.to_wire().severity, "info");
    }

    #[test]
    fn timestamp_matches_ulid_embedded_time() {
        let ev = Event::new(EventType::RunStarted, "run-1", "", serde_json::json!({}));
        assert_eq!(ev.timestamp, ev.id.timestamp_ms());
    }
}
