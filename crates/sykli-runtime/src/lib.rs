// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local execution backends (§4.4): the Shell adapter, the Container
//! adapter, and service sidecars, all sharing one process-group-aware
//! executor with graduated TERM→KILL teardown.

pub mod cancel;
pub mod container;
pub mod error;
pub mod exec;
pub mod services;
pub mod shell;
pub mod tail;

pub use cancel::CancellationToken;
pub use container::{cache_volume_name, is_tool_on_path, run_container, ContainerRequest, MountSpec};
pub use error::RuntimeError;
pub use exec::{ExecOutcome, OutputStream};
pub use services::{create_network, remove_network, start_service, stop_service, ServiceHandle};
pub use shell::{run_shell, ShellRequest};
pub use tail::TailBuffer;
