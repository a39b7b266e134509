//! Streaming subprocess runner
//!
//! [`run_command_lines`] starts an external program in its own process group and exposes
//! its combined stdout/stderr as a bounded channel of lines, plus a side channel for errors.
//! Readers never block on a slow consumer: when the line buffer is full the line is dropped
//! with a warning, so back-pressure never reaches the child process.
//!
//! Shutdown order is fixed: the line channel closes first, then a non-zero exit (if any) is
//! reported on the error channel, then the whole process group receives SIGTERM so that
//! grandchildren (transcoders spawned by the tool) do not outlive it. Cancelling the token
//! kills the group immediately; the line channel still closes afterwards.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ERROR_BUFFER: usize = 4;

/// Output of a running command
#[derive(Debug)]
pub struct LineStream {
    /// Lines read from stdout and stderr, trailing newline removed
    pub lines: mpsc::Receiver<String>,
    /// Read errors and an unsuccessful exit status
    pub errors: mpsc::Receiver<Error>,
}

/// Start `program` and stream its output lines
///
/// Returns [`Error::Spawn`] if the program cannot be started. All other failures arrive on
/// [`LineStream::errors`]. A cancelled run never reports its exit status.
pub fn run_command_lines(
    cancel: CancellationToken,
    program: &Path,
    args: &[String],
    buffer: usize,
) -> Result<LineStream> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    tracing::debug!(program = %program.display(), args = ?args, "command start");

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: program.to_path_buf(),
        source,
    })?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Other("child stdout was not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Other("child stderr was not captured".into()))?;

    let (line_tx, lines) = mpsc::channel(buffer.max(1));
    let (error_tx, errors) = mpsc::channel(ERROR_BUFFER);
    let program: Arc<PathBuf> = Arc::new(program.to_path_buf());

    let mut stdout_task = tokio::spawn(forward_lines(
        stdout,
        line_tx.clone(),
        error_tx.clone(),
        Arc::clone(&program),
    ));
    let mut stderr_task = tokio::spawn(forward_lines(
        stderr,
        line_tx,
        error_tx.clone(),
        Arc::clone(&program),
    ));

    tokio::spawn(async move {
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = async {
                let _ = (&mut stdout_task).await;
                let _ = (&mut stderr_task).await;
            } => false,
        };

        if cancelled {
            tracing::debug!(program = %program.display(), "command cancelled, killing process group");
            signal_group(pid, Signal::Kill);
            if let Err(e) = child.start_kill() {
                tracing::debug!(program = %program.display(), error = %e, "kill after cancel failed");
            }
            // Readers see EOF once the group is gone; abort covers descendants that escaped it.
            stdout_task.abort();
            stderr_task.abort();
        }

        match child.wait().await {
            Ok(status) if !status.success() && !cancelled => {
                send_nonblocking(
                    &error_tx,
                    Error::ProcessExit {
                        program: program.as_ref().clone(),
                        status: status.to_string(),
                    },
                    &program,
                );
            }
            Ok(status) => {
                tracing::debug!(program = %program.display(), %status, "command exited");
            }
            Err(e) if !cancelled => send_nonblocking(&error_tx, Error::Io(e), &program),
            Err(_) => {}
        }
        drop(error_tx);

        signal_group(pid, Signal::Term);
    });

    Ok(LineStream { lines, errors })
}

/// Run `program` to completion and return its stdout
///
/// The process is killed if it does not finish within `timeout`.
pub async fn run_command(program: &Path, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|source| Error::Spawn {
            program: program.to_path_buf(),
            source,
        })?,
        Err(_) => {
            return Err(Error::ExternalTool(format!(
                "{} timed out after {:?}",
                program.display(),
                timeout
            )));
        }
    };

    if !output.status.success() {
        tracing::debug!(
            program = %program.display(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command exit error"
        );
        return Err(Error::ProcessExit {
            program: program.to_path_buf(),
            status: output.status.to_string(),
        });
    }

    Ok(output.stdout)
}

async fn forward_lines<R>(
    reader: R,
    lines: mpsc::Sender<String>,
    errors: mpsc::Sender<Error>,
    program: Arc<PathBuf>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                send_nonblocking(&lines, line, &program);
            }
            Err(e) => {
                send_nonblocking(&errors, Error::Io(e), &program);
                return;
            }
        }
    }
}

fn send_nonblocking<T>(tx: &mpsc::Sender<T>, value: T, program: &Path) {
    match tx.try_send(value) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(program = %program.display(), "output buffer full, message dropped");
        }
        // Receiver gone; the consumer stopped listening.
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: Signal) {
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    if let Some(pid) = pid
        && let Ok(pid) = libc::pid_t::try_from(pid)
        && pid > 0
    {
        // SAFETY: kill(2) has no memory-safety preconditions; a negative pid addresses the
        // process group created for this child. Errors (group already gone) are ignored.
        unsafe {
            libc::kill(-pid, signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: Signal) {}
