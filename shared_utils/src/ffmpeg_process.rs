//! FFmpeg process runner
//!
//! Piping stderr without reading it deadlocks once ffmpeg fills the pipe
//! buffer (64KB on most systems), so stderr is drained on its own thread
//! for the whole lifetime of the child. Stdout gets the same treatment when
//! the caller wants raw frames back. The runner also enforces a wall-clock
//! ceiling: the child is polled and killed once the deadline passes.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::{FfmpegProcess, WaitOutcome};
//! use std::process::Command;
//! use std::time::Duration;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.args(["-y", "-i", "in.mp4", "out.mp4"]);
//! match FfmpegProcess::spawn(&mut cmd)?.wait_with_timeout(Duration::from_secs(300))? {
//!     WaitOutcome::Exited { status, stderr } => { /* ... */ }
//!     WaitOutcome::TimedOut { stderr, .. } => { /* ... */ }
//! }
//! ```

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a supervised ffmpeg run ended.
#[derive(Debug)]
pub enum WaitOutcome {
    Exited { status: ExitStatus, stderr: String },
    TimedOut { after: Duration, stderr: String },
}

/// FFmpeg child process with a dedicated stderr drain thread.
pub struct FfmpegProcess {
    child: Child,
    command: String,
    started: Instant,
    stderr_thread: Option<JoinHandle<String>>,
    stdout_thread: Option<JoinHandle<Vec<u8>>>,
}

impl FfmpegProcess {
    /// Spawn `cmd` with stdout discarded and stderr captured.
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        Self::spawn_inner(cmd, false)
    }

    /// Spawn `cmd` with both stdout and stderr captured.
    ///
    /// For commands that write raw frames to `pipe:1`; collect the bytes
    /// with [`FfmpegProcess::wait_with_stdout`].
    pub fn spawn_capturing_stdout(cmd: &mut Command) -> Result<Self> {
        Self::spawn_inner(cmd, true)
    }

    fn spawn_inner(cmd: &mut Command, capture_stdout: bool) -> Result<Self> {
        let command = format!("{:?}", cmd);
        info!(command = %command, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn FFmpeg process")?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture FFmpeg stderr"))?;

        // ffmpeg echoes input paths, which need not be UTF-8
        let stderr_thread = thread::spawn(move || {
            String::from_utf8_lossy(&drain(stderr, "stderr")).into_owned()
        });

        let stdout_thread = child
            .stdout
            .take()
            .map(|stdout| thread::spawn(move || drain(stdout, "stdout")));

        Ok(Self {
            child,
            command,
            started: Instant::now(),
            stderr_thread: Some(stderr_thread),
            stdout_thread,
        })
    }

    /// Wait for the process, killing it once `timeout` has elapsed.
    pub fn wait_with_timeout(mut self, timeout: Duration) -> Result<WaitOutcome> {
        let outcome = self.supervise(timeout)?;
        self.collect_stdout();
        Ok(outcome)
    }

    /// Like [`FfmpegProcess::wait_with_timeout`], also returning every byte
    /// the child wrote to stdout. Empty unless spawned with
    /// [`FfmpegProcess::spawn_capturing_stdout`].
    pub fn wait_with_stdout(mut self, timeout: Duration) -> Result<(WaitOutcome, Vec<u8>)> {
        let outcome = self.supervise(timeout)?;
        let stdout = self.collect_stdout();
        Ok((outcome, stdout))
    }

    fn supervise(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .context("Failed to check FFmpeg status")?
            {
                let stderr = self.collect_stderr();
                self.log_exit(&status, &stderr);
                return Ok(WaitOutcome::Exited { status, stderr });
            }

            let elapsed = self.started.elapsed();
            if elapsed >= timeout {
                warn!(
                    command = %self.command,
                    timeout_secs = timeout.as_secs_f64(),
                    "FFmpeg exceeded time limit, killing process"
                );
                if let Err(e) = self.child.kill() {
                    warn!(error = %e, "Failed to kill FFmpeg process");
                }
                // reap the child so the pipes close
                let _ = self.child.wait();
                let stderr = self.collect_stderr();
                return Ok(WaitOutcome::TimedOut {
                    after: elapsed,
                    stderr,
                });
            }

            thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
        }
    }

    fn collect_stdout(&mut self) -> Vec<u8> {
        self.stdout_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default()
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default()
    }

    fn log_exit(&self, status: &ExitStatus, stderr: &str) {
        let elapsed = self.started.elapsed().as_secs_f64();
        if status.success() {
            info!(
                exit_code = status.code(),
                duration_secs = elapsed,
                "FFmpeg process completed successfully"
            );
            debug!(stderr_output = %stderr, "FFmpeg stderr output");
        } else {
            error!(
                exit_code = status.code(),
                duration_secs = elapsed,
                summary = %format_ffmpeg_error(stderr),
                suggestion = ?get_error_suggestion(stderr),
                "FFmpeg process failed"
            );
            debug!(stderr_output = %stderr, "FFmpeg stderr output");
        }
    }
}

fn drain(mut pipe: impl Read, name: &'static str) -> Vec<u8> {
    let mut raw = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut raw) {
        debug!(error = %e, pipe = name, "FFmpeg pipe read ended early");
    }
    raw
}

/// Pick the most useful single line out of an ffmpeg stderr dump.
///
/// Prefers the last line mentioning an error, then the last line that is not
/// a progress line, then a fixed placeholder.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

pub fn get_error_suggestion(stderr: &str) -> Option<String> {
    let patterns = [
        ("No such file or directory", "Check that the input path exists"),
        ("Invalid data found", "The input file may be corrupt or not a video"),
        ("Unknown encoder", "Install an ffmpeg build with libx264"),
        ("Permission denied", "Check read/write permissions on input and output"),
        ("Output file is empty", "Encoding produced nothing; inspect the filter chain"),
        ("moov atom not found", "The MP4 input is truncated"),
        ("Too many packets buffered", "Add -max_muxing_queue_size to the encoder arguments"),
        ("Error reinitializing filters", "The filter chain is invalid for this input"),
    ];

    patterns
        .iter()
        .find(|(pattern, _)| stderr.contains(pattern))
        .map(|(_, suggestion)| suggestion.to_string())
}
