//! Bounded execution of external command-line tools.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, VigilError};

/// Per-stream capture limit.
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Stdout exceeded the capture limit and was cut short.
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stderr, or a generic exit description when stderr is empty.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs `program args...` with stdin closed, capturing stdout and stderr.
///
/// The child is killed if it outlives `timeout`. A missing binary surfaces
/// as [`VigilError::Command`], never as a panic.
pub async fn run(program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, ?args, "Spawning external command");

    let mut child = cmd
        .spawn()
        .map_err(|e| VigilError::Command(format!("failed to run {}: {}", program, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_stream(stdout));
    let stderr_task = tokio::spawn(read_stream(stderr));

    // On timeout `child` is dropped here and kill_on_drop reaps it.
    let status = tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| {
            VigilError::Timeout(format!("{} did not finish within {:?}", program, timeout))
        })?
        .map_err(|e| VigilError::Command(format!("{} failed: {}", program, e)))?;

    let (stdout, truncated) = stdout_task.await.unwrap_or_default();
    let (stderr, _) = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code(),
        truncated,
    })
}

/// Reads up to [`MAX_OUTPUT_BYTES`] and discards the rest, so a chatty child
/// never blocks on a full pipe. Returns the captured bytes and whether
/// anything was dropped.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return (buf, false);
    };
    if (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await.is_err() {
        return (buf, false);
    }
    let dropped = tokio::io::copy(&mut h, &mut tokio::io::sink()).await.unwrap_or(0);
    (buf, dropped > 0)
}
