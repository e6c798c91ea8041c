//! Engine subprocess invocation.
//!
//! Runs an external executable with a hard wall-clock timeout and a cap on
//! captured output, and normalizes success, failure, and timeout into one
//! [`ExecutionResult`]. Ordinary process failure never returns `Err`; only
//! an inability to launch the executable at all does.

use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{EngineError, Result};

/// How long the capture tasks get to observe EOF after the child is killed.
/// A grandchild that inherited the pipes (a wrapper script, the virtual
/// display shim) can hold the write ends open past the timeout; the partial
/// capture is abandoned after this grace rather than waiting the runaway
/// tree out.
const READER_GRACE: Duration = Duration::from_millis(250);

/// How an engine invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process exited with code 0.
    Success,

    /// Process exited with a non-zero code.
    Failed(i32),

    /// Process was killed after exceeding its wall-clock budget.
    TimedOut,

    /// Process produced more output than the configured cap.
    OutputOverflow,
}

impl ExitStatus {
    /// Whether the invocation completed successfully.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Synthetic exit code (-1 for timeout/overflow).
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failed(code) => *code,
            ExitStatus::TimedOut | ExitStatus::OutputOverflow => -1,
        }
    }
}

/// Result of one engine invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// How the process ended.
    pub status: ExitStatus,

    /// Captured stdout (possibly truncated at the output cap).
    pub stdout: String,

    /// Captured stderr (possibly truncated at the output cap).
    pub stderr: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Options for one engine invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Hard wall-clock timeout.
    pub timeout: Duration,

    /// Cap on combined captured stdout+stderr bytes.
    pub max_output_bytes: usize,

    /// Whether the operation needs an on-screen rendering surface.
    ///
    /// When set and no `DISPLAY` is available, the invocation is wrapped in
    /// `xvfb-run -a` transparently.
    pub needs_display: bool,
}

/// Resolve the actual command line, applying the virtual-display shim when
/// the operation needs a display and none is available.
fn resolve_command(
    executable: &str,
    args: &[String],
    needs_display: bool,
    has_display: bool,
) -> (String, Vec<String>) {
    if needs_display && !has_display {
        let mut wrapped = Vec::with_capacity(args.len() + 2);
        wrapped.push("-a".to_string());
        wrapped.push(executable.to_string());
        wrapped.extend(args.iter().cloned());
        ("xvfb-run".to_string(), wrapped)
    } else {
        (executable.to_string(), args.to_vec())
    }
}

/// Claim up to `want` bytes from the shared capture budget.
fn claim_budget(budget: &AtomicUsize, want: usize) -> usize {
    let mut remaining = budget.load(Ordering::Relaxed);
    loop {
        let take = want.min(remaining);
        if take == 0 {
            return 0;
        }
        match budget.compare_exchange_weak(
            remaining,
            remaining - take,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return take,
            Err(actual) => remaining = actual,
        }
    }
}

/// Read a pipe to EOF, storing bytes while the shared budget lasts.
///
/// The budget spans both streams, so combined retained output never exceeds
/// the configured cap. Returns the stored bytes and the total byte count
/// seen, so the caller can detect truncation. Draining to EOF keeps the
/// child from blocking on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    budget: Arc<AtomicUsize>,
) -> (Vec<u8>, usize) {
    let mut stored = Vec::new();
    let mut total = 0usize;
    let Some(mut reader) = reader else {
        return (stored, total);
    };
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                let take = claim_budget(&budget, n);
                stored.extend_from_slice(&buf[..take]);
            }
            Err(_) => break,
        }
    }
    (stored, total)
}

/// Collect a capture task's result, abandoning it after the grace period.
///
/// Used on the timeout path, where EOF is not guaranteed: a pipe inherited
/// by a surviving grandchild would otherwise block the return indefinitely.
async fn settle_capture(mut task: JoinHandle<(Vec<u8>, usize)>) -> (Vec<u8>, usize) {
    match tokio::time::timeout(READER_GRACE, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            (Vec::new(), 0)
        }
    }
}

/// Invoke an engine executable and capture its output.
///
/// Non-zero exit and timeout both resolve to a normal [`ExecutionResult`];
/// only a spawn failure (missing binary, permission denied) returns `Err`.
pub async fn run_engine(
    executable: &str,
    args: &[String],
    opts: &RunOptions,
) -> Result<ExecutionResult> {
    let has_display = std::env::var_os("DISPLAY").is_some();
    let (exe, full_args) = resolve_command(executable, args, opts.needs_display, has_display);

    debug!(executable = %exe, args = ?full_args, "spawning engine");
    let start = Instant::now();

    let mut child = Command::new(&exe)
        .args(&full_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| EngineError::Spawn {
            executable: exe.clone(),
            source,
        })?;

    let cap = opts.max_output_bytes;
    let budget = Arc::new(AtomicUsize::new(cap));
    let stdout_task = tokio::spawn(read_capped(child.stdout.take(), Arc::clone(&budget)));
    let stderr_task = tokio::spawn(read_capped(child.stderr.take(), Arc::clone(&budget)));

    let (wait_status, timed_out) = match tokio::time::timeout(opts.timeout, child.wait()).await {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(err)) => {
            debug!(error = %err, "engine wait failed");
            (None, false)
        }
        Err(_) => {
            // Budget exceeded: kill and reap so the readers reach EOF.
            let _ = child.start_kill();
            let _ = child.wait().await;
            (None, true)
        }
    };

    let ((stdout_bytes, stdout_total), (stderr_bytes, stderr_total)) = if timed_out {
        (
            settle_capture(stdout_task).await,
            settle_capture(stderr_task).await,
        )
    } else {
        (
            stdout_task.await.unwrap_or_default(),
            stderr_task.await.unwrap_or_default(),
        )
    };

    let status = if timed_out {
        ExitStatus::TimedOut
    } else if stdout_total + stderr_total > cap {
        ExitStatus::OutputOverflow
    } else {
        match wait_status {
            Some(status) if status.success() => ExitStatus::Success,
            Some(status) => ExitStatus::Failed(status.code().unwrap_or(-1)),
            None => ExitStatus::Failed(-1),
        }
    };

    Ok(ExecutionResult {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(timeout_ms: u64) -> RunOptions {
        RunOptions {
            timeout: Duration::from_millis(timeout_ms),
            max_output_bytes: 10 * 1024 * 1024,
            needs_display: false,
        }
    }

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failed(2).code(), 2);
        assert_eq!(ExitStatus::TimedOut.code(), -1);
        assert!(ExitStatus::Success.success());
        assert!(!ExitStatus::TimedOut.success());
    }

    #[test]
    fn test_resolve_command_no_fallback_with_display() {
        let (exe, args) = resolve_command("openscad", &["-o".to_string()], true, true);
        assert_eq!(exe, "openscad");
        assert_eq!(args, vec!["-o".to_string()]);
    }

    #[test]
    fn test_resolve_command_wraps_in_xvfb() {
        let (exe, args) = resolve_command("openscad", &["-o".to_string()], true, false);
        assert_eq!(exe, "xvfb-run");
        assert_eq!(
            args,
            vec!["-a".to_string(), "openscad".to_string(), "-o".to_string()]
        );
    }

    #[test]
    fn test_resolve_command_headless_not_needed() {
        let (exe, _) = resolve_command("openscad", &[], false, false);
        assert_eq!(exe, "openscad");
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let result = run_engine("echo", &["hello".to_string()], &opts(5_000))
            .await
            .expect("spawn failed");
        assert_eq!(result.status, ExitStatus::Success);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_not_err() {
        let result = run_engine("false", &[], &opts(5_000))
            .await
            .expect("spawn failed");
        assert!(!result.status.success());
        assert_ne!(result.status.code(), 0);
    }

    #[tokio::test]
    async fn test_run_timeout_kills_child() {
        let start = Instant::now();
        let result = run_engine("sleep", &["5".to_string()], &opts(200))
            .await
            .expect("spawn failed");
        assert_eq!(result.status, ExitStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_timeout_with_surviving_grandchild_returns_promptly() {
        // The shell forks a background child that inherits the stdout pipe
        // and outlives the kill. The runner must not wait for that pipe to
        // close before returning.
        let start = Instant::now();
        let result = run_engine(
            "sh",
            &["-c".to_string(), "sleep 30 & sleep 30".to_string()],
            &opts(200),
        )
        .await
        .expect("spawn failed");
        assert_eq!(result.status, ExitStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_output_cap_is_combined_across_streams() {
        let mut options = opts(5_000);
        options.max_output_bytes = 4096;
        let result = run_engine(
            "sh",
            &[
                "-c".to_string(),
                "head -c 8192 /dev/zero; head -c 8192 /dev/zero >&2".to_string(),
            ],
            &options,
        )
        .await
        .expect("spawn failed");
        assert_eq!(result.status, ExitStatus::OutputOverflow);
        assert!(result.stdout.len() + result.stderr.len() <= 4096);
    }

    #[tokio::test]
    async fn test_run_output_overflow() {
        let mut options = opts(5_000);
        options.max_output_bytes = 1024;
        let result = run_engine(
            "sh",
            &["-c".to_string(), "head -c 65536 /dev/zero".to_string()],
            &options,
        )
        .await
        .expect("spawn failed");
        assert_eq!(result.status, ExitStatus::OutputOverflow);
        assert!(result.stdout.len() <= 1024);
    }

    #[tokio::test]
    async fn test_missing_executable_is_err() {
        let result = run_engine("cadpipe-no-such-binary", &[], &opts(1_000)).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }
}
