// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task graph model, JSON wire parsing, matrix expansion, and validation.
//!
//! This is the leaf data-model crate every other Sykli crate builds on:
//! `Task`, `Graph`, `Resource` (§3), the wire DTOs that mirror the SDK
//! output shape (§6.1), and the graph-building pipeline (§4.1) that turns
//! one into the other.

pub mod error;
pub mod graph;
pub mod resource;
pub mod sdk;
pub mod task;
pub mod wire;

pub use error::CoreError;
pub use graph::Graph;
pub use resource::Resource;
pub use task::{
    AiHooks, CapabilitySpec, CloudProvider, CredentialBinding, Criticality, GateSpec,
    GateStrategy, K8sOptions, Mount, MountKind, ProvidesEntry, SecretRef, SecretSource,
    SemanticInfo, ServiceSpec, Task, TargetKind, TaskInputRef, VerifyPolicy,
};
pub use wire::{WireGraph, WireResource, WireTask};
