// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library half of the `sykli` binary: command implementations, config
//! loading, and diagnostic rendering, kept separate from `main.rs` so they
//! can be unit tested without spawning the process.

pub mod commands;
pub mod config;
pub mod diagnostic;
