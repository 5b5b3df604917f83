// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Shell adapter: run a command via `/bin/sh -c` on the host.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;
use crate::exec::{exec_with_tee, ExecOutcome, OutputStream};

pub struct ShellRequest<'a> {
    pub command: &'a str,
    pub workdir: &'a Path,
    pub env: &'a BTreeMap<String, String>,
}

/// Run `req.command` under `/bin/sh -c` in a fresh process group, with the
/// task's env merged on top of the inherited host environment.
pub async fn run_shell(
    req: ShellRequest<'_>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    output_tx: Option<mpsc::Sender<(OutputStream, Vec<u8>)>>,
) -> Result<ExecOutcome, RuntimeError> {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(req.command).current_dir(req.workdir);
    for (k, v) in req.env {
        cmd.env(k, v);
    }
    exec_with_tee(cmd, cancel, timeout, output_tx).await
}
