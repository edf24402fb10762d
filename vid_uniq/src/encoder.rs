//! The seam between the dispatcher and the external encoder.

use crate::errors::EncodeFailure;
use crate::pipeline::EncodeJob;
use shared_utils::ffmpeg_process::{FfmpegProcess, WaitOutcome};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

/// Runs one encode job to completion.
///
/// Implementations must be safe to call from several worker threads at
/// once; each call owns its job's output path.
pub trait VariantEncoder: Send + Sync {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeFailure>;
}

/// Encodes through an ffmpeg binary with a wall-clock ceiling.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, timeout }
    }

    pub fn ffmpeg(&self) -> &PathBuf {
        &self.ffmpeg
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl VariantEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeFailure> {
        info!(
            variant = %job.name,
            command = %job.command_line(&self.ffmpeg.to_string_lossy()),
            "Encoding variant"
        );

        run_ffmpeg(&self.ffmpeg, &job.ffmpeg_args(), self.timeout)?;
        debug!(variant = %job.name, output = %job.output.display(), "Variant written");
        Ok(())
    }
}

/// Run one ffmpeg invocation to completion under `timeout`.
///
/// Shared by variant encoding and the platform reformatting jobs.
pub fn run_ffmpeg(
    ffmpeg: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<(), EncodeFailure> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(args);

    let process =
        FfmpegProcess::spawn(&mut cmd).map_err(|e| EncodeFailure::Spawn(format!("{:#}", e)))?;

    let outcome = process
        .wait_with_timeout(timeout)
        .map_err(|e| EncodeFailure::Spawn(format!("{:#}", e)))?;

    match outcome {
        WaitOutcome::Exited { status, .. } if status.success() => Ok(()),
        WaitOutcome::Exited { status, stderr } => Err(EncodeFailure::Exit {
            code: status.code(),
            stderr,
        }),
        WaitOutcome::TimedOut { after, stderr } => Err(EncodeFailure::Timeout {
            after_secs: after.as_secs(),
            stderr,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderSettings;
    use crate::params::TransformationParameters;

    fn job() -> EncodeJob {
        EncodeJob::new(
            0,
            "V01",
            PathBuf::from("missing-input.mp4"),
            PathBuf::from("V01.mp4"),
            TransformationParameters::identity(),
            None,
            &EncoderSettings::default(),
        )
    }

    #[test]
    fn test_missing_binary_is_spawn_failure() {
        let encoder = FfmpegEncoder::new(
            PathBuf::from("/nonexistent/bin/ffmpeg-does-not-exist"),
            Duration::from_secs(5),
        );
        let err = encoder.encode(&job()).unwrap_err();
        assert!(matches!(err, EncodeFailure::Spawn(_)), "{:?}", err);
        assert!(!err.detail().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_exit_failure() {
        // `false` ignores its arguments and exits 1
        let encoder = FfmpegEncoder::new(PathBuf::from("false"), Duration::from_secs(5));
        let err = encoder.encode(&job()).unwrap_err();
        assert!(
            matches!(err, EncodeFailure::Exit { code: Some(1), .. }),
            "{:?}",
            err
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_zero_exit_is_success() {
        let encoder = FfmpegEncoder::new(PathBuf::from("true"), Duration::from_secs(5));
        assert!(encoder.encode(&job()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_ffmpeg_timeout_is_timeout_failure() {
        let args = vec![OsString::from("-c"), OsString::from("exec sleep 5")];
        let err = run_ffmpeg(Path::new("sh"), &args, Duration::from_millis(200)).unwrap_err();
        assert!(
            matches!(err, EncodeFailure::Timeout { after_secs: 0, .. }),
            "{:?}",
            err
        );
    }
}
