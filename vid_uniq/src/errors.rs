use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UniqError {
    #[error("Invalid variant count {count}: must be between 1 and {max}")]
    InvalidCount { count: usize, max: usize },

    #[error("Unknown category '{0}' (expected one of: noise, zoom, gamma, hue, horizontal_flip, crop, speed, pitch, frame_rate, metadata)")]
    UnknownCategory(String),

    #[error("Source video not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Unknown platform '{0}' (expected tiktok, instagram_reels or youtube_shorts)")]
    UnknownPlatform(String),

    #[error("Invalid aspect ratio '{0}' (expected W:H, e.g. 9:16)")]
    InvalidAspectRatio(String),

    #[error("Invalid clip length {0}: must be a positive number of seconds")]
    InvalidClipLength(f64),

    #[error("Unrecognized fingerprint '{0}'")]
    InvalidFingerprint(String),

    #[error("Could not sample frames from {}: {detail}", path.display())]
    FrameSampling { path: PathBuf, detail: String },

    #[error("Processing {} failed: {}", path.display(), failure.detail())]
    Processing {
        path: PathBuf,
        failure: EncodeFailure,
    },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Tracking store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Tool(#[from] shared_utils::ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UniqError>;

/// Why one external encode did not produce an output.
///
/// Returned as data from [`crate::encoder::VariantEncoder::encode`]; the
/// dispatcher never lets it escape past a single task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeFailure {
    #[error("Failed to start encoder: {0}")]
    Spawn(String),

    #[error("Encoder exited with code {code:?}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("Encoder timed out after {after_secs}s")]
    Timeout { after_secs: u64, stderr: String },
}

impl EncodeFailure {
    /// Diagnostic text stored with the failed result.
    ///
    /// Exit failures carry the encoder's stderr verbatim. Timeouts get a
    /// synthesized line naming the ceiling, followed by whatever stderr was
    /// captured before the kill.
    pub fn detail(&self) -> String {
        match self {
            EncodeFailure::Spawn(msg) => format!("Failed to start encoder: {}", msg),
            EncodeFailure::Exit { code, stderr } => {
                if stderr.trim().is_empty() {
                    format!("Encoder exited with code {:?} and no diagnostic output", code)
                } else {
                    stderr.clone()
                }
            }
            EncodeFailure::Timeout { after_secs, stderr } => {
                let mut detail = format!(
                    "Encoding exceeded the {}s time limit and was terminated",
                    after_secs
                );
                if !stderr.trim().is_empty() {
                    detail.push('\n');
                    detail.push_str(stderr);
                }
                detail
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_detail_is_verbatim_stderr() {
        let f = EncodeFailure::Exit {
            code: Some(1),
            stderr: "in.mp4: No such file or directory\n".to_string(),
        };
        assert_eq!(f.detail(), "in.mp4: No such file or directory\n");
    }

    #[test]
    fn test_empty_stderr_still_gives_detail() {
        let f = EncodeFailure::Exit {
            code: Some(69),
            stderr: String::new(),
        };
        assert!(f.detail().contains("69"));
    }

    #[test]
    fn test_timeout_detail_names_ceiling() {
        let f = EncodeFailure::Timeout {
            after_secs: 300,
            stderr: "frame=  10".to_string(),
        };
        let d = f.detail();
        assert!(d.starts_with("Encoding exceeded the 300s time limit"));
        assert!(d.ends_with("frame=  10"));
    }

    #[test]
    fn test_invalid_count_message() {
        let e = UniqError::InvalidCount { count: 0, max: 99 };
        assert_eq!(e.to_string(), "Invalid variant count 0: must be between 1 and 99");
    }

    #[test]
    fn test_processing_error_carries_stderr() {
        let e = UniqError::Processing {
            path: PathBuf::from("clip01.mp4"),
            failure: EncodeFailure::Exit {
                code: Some(1),
                stderr: "Unknown encoder 'libx264'".to_string(),
            },
        };
        assert_eq!(e.to_string(), "Processing clip01.mp4 failed: Unknown encoder 'libx264'");
    }
}
