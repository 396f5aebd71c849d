//! Process execution with streamed output.
//!
//! A [`VfsProcessHandler`] lives for exactly one `exec` call and receives
//! stdout/stderr chunks as the child produces them.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::error::{VfsError, VfsResult};

const PIPE_CHUNK: usize = 8192;

/// Receives a child's output while it runs.
///
/// Both callbacks discard by default.
#[async_trait]
pub trait VfsProcessHandler: Send {
    /// A chunk of stdout.
    async fn on_out(&mut self, _data: &[u8]) -> VfsResult<()> {
        Ok(())
    }

    /// A chunk of stderr.
    async fn on_err(&mut self, _data: &[u8]) -> VfsResult<()> {
        Ok(())
    }
}

/// Drops both streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOutput;

impl VfsProcessHandler for DiscardOutput {}

/// Buffers stdout and stderr interleaved in arrival order.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    combined: Vec<u8>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.combined
    }

    /// Captured output as UTF-8, replacing invalid sequences.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}

#[async_trait]
impl VfsProcessHandler for CaptureOutput {
    async fn on_out(&mut self, data: &[u8]) -> VfsResult<()> {
        self.combined.extend_from_slice(data);
        Ok(())
    }

    async fn on_err(&mut self, data: &[u8]) -> VfsResult<()> {
        self.combined.extend_from_slice(data);
        Ok(())
    }
}

/// Forwards chunks live to this process's stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthruOutput;

#[async_trait]
impl VfsProcessHandler for PassthruOutput {
    async fn on_out(&mut self, data: &[u8]) -> VfsResult<()> {
        let mut out = tokio::io::stdout();
        out.write_all(data).await?;
        out.flush().await?;
        Ok(())
    }

    async fn on_err(&mut self, data: &[u8]) -> VfsResult<()> {
        let mut err = tokio::io::stderr();
        err.write_all(data).await?;
        err.flush().await?;
        Ok(())
    }
}

/// Spawn `cmd_and_args` in `cwd`, stream its output into `handler`, and
/// return the exit code.
///
/// A child killed by a signal reports `128 + signal` on unix. The child is
/// killed if this future is dropped before it exits.
pub(crate) async fn run_process(
    cwd: &Path,
    cmd_and_args: &[String],
    handler: &mut dyn VfsProcessHandler,
) -> VfsResult<i32> {
    let (program, args) = cmd_and_args
        .split_first()
        .ok_or_else(|| VfsError::other("exec: empty command"))?;

    tracing::debug!(program = %program, cwd = %cwd.display(), "spawning process");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::not_found(program.clone()),
            _ => VfsError::from(e),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| VfsError::other("exec: stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| VfsError::other("exec: stderr not captured"))?;

    pump(stdout, stderr, handler).await?;

    let status = child.wait().await?;
    let code = exit_code(&status);
    tracing::debug!(program = %program, code, "process exited");
    Ok(code)
}

/// Drain both pipes concurrently, delivering chunks as they arrive.
async fn pump<O, E>(mut stdout: O, mut stderr: E, handler: &mut dyn VfsProcessHandler) -> VfsResult<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = vec![0u8; PIPE_CHUNK];
    let mut err_buf = vec![0u8; PIPE_CHUNK];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            n = stdout.read(&mut out_buf), if out_open => {
                match n? {
                    0 => out_open = false,
                    n => handler.on_out(&out_buf[..n]).await?,
                }
            }
            n = stderr.read(&mut err_buf), if err_open => {
                match n? {
                    0 => err_open = false,
                    n => handler.on_err(&err_buf[..n]).await?,
                }
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
