// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drives a built task graph to completion: the per-task lifecycle (§4.2)
//! and the level-parallel executor (§4.3) that runs it over every
//! scheduling level produced by [`sykli_core::Graph::build`].

mod artifact;
mod backoff;
mod caching;
mod error;
mod executor;
mod lifecycle;
mod mounts;
mod status;

pub use error::SchedulerError;
pub use executor::{ScheduleOptions, Scheduler};
pub use lifecycle::RunContext;
pub use status::{OverallStatus, RunReport, TaskRecord, TaskStatus};
