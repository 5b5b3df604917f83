// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability `provides`/`needs` resolution.
//!
//! This crate is deliberately decoupled from `sykli-core`'s `Task`/`Graph`
//! types: it operates on plain borrowed views (`Provider`, `Consumer`) so
//! the graph builder can extract the relevant fields, resolve, and apply
//! the result without a circular crate dependency.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// One task's capability offering.
#[derive(Debug, Clone, Copy)]
pub struct Provider<'a> {
    pub task: &'a str,
    pub name: &'a str,
    pub value: Option<&'a str>,
    pub is_matrix: bool,
}

/// One task's capability requirement.
#[derive(Debug, Clone, Copy)]
pub struct Consumer<'a> {
    pub task: &'a str,
    pub needs: &'a [String],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("invalid capability name '{name}': must match [a-z][a-z0-9_-]*")]
    InvalidName { name: String },
    #[error("capability '{name}' is provided by both '{first}' and '{second}'")]
    DuplicateProvider {
        name: String,
        first: String,
        second: String,
    },
    #[error("task '{task}' both provides and needs capability '{name}'")]
    SelfProvideAndNeed { task: String, name: String },
    #[error("matrix task '{task}' must not declare provides")]
    MatrixTaskProvides { task: String },
}

/// The outcome of resolving a graph's capability wiring: edges to add to the
/// dependency graph, and environment variables to inject into consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// `(consumer_task, provider_task)` pairs to add as implicit dependencies.
    pub implicit_edges: Vec<(String, String)>,
    /// `(consumer_task, env_var_name, value)` to inject into the consumer's env.
    pub env_injections: Vec<(String, String, String)>,
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Upper-cases and replaces `-` with `_` to build `SYKLI_CAP_<NAME>`.
pub fn env_var_name(capability: &str) -> String {
    let normalized = capability.to_ascii_uppercase().replace('-', "_");
    format!("SYKLI_CAP_{normalized}")
}

/// Resolve `providers`/`consumers` into a [`ResolutionPlan`].
///
/// Validation order matches the spec: name syntax, matrix-provides
/// rejection, duplicate-provider rejection, then self-provide-and-need
/// rejection. A `needs` entry with no matching provider is left
/// unconnected rather than treated as an error — nothing in the wire
/// format requires every capability to have a producer in a given graph.
pub fn resolve(
    providers: &[Provider<'_>],
    consumers: &[Consumer<'_>],
) -> Result<ResolutionPlan, CapabilityError> {
    for provider in providers {
        if !is_valid_name(provider.name) {
            return Err(CapabilityError::InvalidName {
                name: provider.name.to_string(),
            });
        }
        if provider.is_matrix {
            return Err(CapabilityError::MatrixTaskProvides {
                task: provider.task.to_string(),
            });
        }
    }

    let mut by_name: HashMap<&str, &Provider<'_>> = HashMap::new();
    for provider in providers {
        if let Some(existing) = by_name.get(provider.name) {
            return Err(CapabilityError::DuplicateProvider {
                name: provider.name.to_string(),
                first: existing.task.to_string(),
                second: provider.task.to_string(),
            });
        }
        by_name.insert(provider.name, provider);
    }

    let provided_by_task: HashSet<(&str, &str)> =
        providers.iter().map(|p| (p.task, p.name)).collect();
    for consumer in consumers {
        for need in consumer.needs {
            if provided_by_task.contains(&(consumer.task, need.as_str())) {
                return Err(CapabilityError::SelfProvideAndNeed {
                    task: consumer.task.to_string(),
                    name: need.clone(),
                });
            }
        }
    }

    let mut plan = ResolutionPlan::default();
    for consumer in consumers {
        for need in consumer.needs {
            if let Some(provider) = by_name.get(need.as_str()) {
                plan.implicit_edges
                    .push((consumer.task.to_string(), provider.task.to_string()));
                plan.env_injections.push((
                    consumer.task.to_string(),
                    env_var_name(need),
                    provider.value.unwrap_or("").to_string(),
                ));
            }
        }
    }
    Ok(plan)
}
