//! Subprocess execution for the UCS command-line tools.
//!
//! [`run_command`] spawns the prepared [`tokio::process::Command`] with
//! stdin closed, captures stdout/stderr and enforces a timeout. A non-zero
//! exit status is an error carrying the captured stderr.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::DirectoryError;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Run `cmd` to completion within `timeout`.
///
/// `program` is only used for error messages and logging.
pub async fn run_command(
    program: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> Result<CommandOutput, DirectoryError> {
    // The child is killed when dropped, e.g. on timeout.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();

    let mut child = cmd.spawn().map_err(|source| DirectoryError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(DirectoryError::Spawn {
                program: program.to_string(),
                source,
            })
        }
        Err(_elapsed) => {
            return Err(DirectoryError::Timeout {
                program: program.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    tracing::debug!(
        program,
        exit_code = status.code(),
        duration_ms,
        "Command finished"
    );

    if !status.success() {
        return Err(DirectoryError::CommandFailed {
            program: program.to_string(),
            exit_code: status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        duration_ms,
    })
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run_command("sh", &mut sh("echo hello"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn successful_run_keeps_stderr_and_duration() {
        let out = run_command(
            "sh",
            &mut sh("echo 'W: slow replication' >&2; sleep 0.2; echo ok"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.trim(), "ok");
        assert_eq!(out.stderr.trim(), "W: slow replication");
        assert!(out.duration_ms >= 150, "duration_ms = {}", out.duration_ms);
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_with_stderr() {
        let err = run_command("sh", &mut sh("echo boom >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DirectoryError::CommandFailed { exit_code: 3, ref stderr, .. } if stderr == "boom"
        );
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let err = run_command("sh", &mut sh("sleep 5"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_matches!(err, DirectoryError::Timeout { .. });
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let mut cmd = Command::new("/nonexistent/dllp-test-binary");
        let err = run_command("dllp-test-binary", &mut cmd, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_matches!(err, DirectoryError::Spawn { .. });
    }
}
