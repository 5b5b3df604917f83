// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed event bus and buffered external reporter (§4.6).

pub mod bus;
pub mod event;
pub mod reporter;

pub use bus::{EventBus, EventBusStats, EventSubscription, FilteredSubscription};
pub use event::{Event, EventType, WireEntity, WireEvent};
pub use reporter::{Reporter, ReporterAction, ReporterStatus};
