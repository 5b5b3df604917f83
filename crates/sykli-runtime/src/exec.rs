// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared process execution: spawn into a fresh process group, tee
//! stdout/stderr to a bounded tail buffer and an optional output channel,
//! and apply graduated TERM→KILL termination on timeout or cancellation.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;
use crate::tail::TailBuffer;

/// Grace period between SIGTERM and SIGKILL for a process group, per §4.4.
const TERM_GRACE: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub tail: Vec<u8>,
    pub duration: Duration,
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn kill_group(pid: i32, signal: libc::c_int) {
    unsafe {
        libc::kill(-pid, signal);
    }
}

async fn graceful_kill(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_group(pid as i32, libc::SIGTERM);
        tokio::select! {
            _ = child.wait() => return,
            _ = tokio::time::sleep(TERM_GRACE) => {}
        }
        kill_group(pid as i32, libc::SIGKILL);
        return;
    }
    let _ = child.start_kill();
}

fn spawn_reader<R>(
    mut reader: R,
    stream: OutputStream,
    tail: Arc<Mutex<TailBuffer>>,
    output_tx: Option<mpsc::Sender<(OutputStream, Vec<u8>)>>,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = &buf[..n];
                    tail.lock().unwrap().push(chunk);
                    if let Some(tx) = &output_tx {
                        if tx.send((stream, chunk.to_vec())).await.is_err() {
                            // Receiver gone; keep draining the pipe so the
                            // child never blocks on a full stdout buffer.
                        }
                    }
                }
            }
        }
    })
}

/// Run `cmd`, streaming its combined output and tearing it down on
/// cancellation or timeout. `cmd` must not already have stdio configured.
pub async fn exec_with_tee(
    mut cmd: Command,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    output_tx: Option<mpsc::Sender<(OutputStream, Vec<u8>)>>,
) -> Result<ExecOutcome, RuntimeError> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(RuntimeError::Spawn)?;
    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");
    let tail = Arc::new(Mutex::new(TailBuffer::new()));

    let out_handle = spawn_reader(stdout, OutputStream::Stdout, tail.clone(), output_tx.clone());
    let err_handle = spawn_reader(stderr, OutputStream::Stderr, tail.clone(), output_tx.clone());

    let pid = child.id();
    let mut timed_out = false;
    let mut cancelled = false;

    let status = tokio::select! {
        status = child.wait() => status.map_err(RuntimeError::Wait)?,
        _ = sleep_or_pending(timeout) => {
            timed_out = true;
            graceful_kill(&mut child, pid).await;
            child.wait().await.map_err(RuntimeError::Wait)?
        }
        _ = cancel.cancelled() => {
            cancelled = true;
            graceful_kill(&mut child, pid).await;
            child.wait().await.map_err(RuntimeError::Wait)?
        }
    };

    let _ = out_handle.await;
    let _ = err_handle.await;

    let tail_bytes = tail.lock().unwrap().clone().into_vec();
    Ok(ExecOutcome {
        exit_code: status.code(),
        timed_out,
        cancelled,
        tail: tail_bytes,
        duration: start.elapsed(),
    })
}
