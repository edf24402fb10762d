//! Shared Utilities for vid-uniq
//!
//! External-tool plumbing and ambient helpers used by the generator crate:
//! - FFmpeg process runner (stderr draining, timeout, error summaries)
//! - FFprobe wrapper
//! - Tool discovery (`which` + environment overrides)
//! - Logging bootstrap (tracing + rolling file)
//! - Progress bars, batch tallies and summary reports

pub mod batch;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod logging;
pub mod progress;
pub mod report;
pub mod tools;

pub use batch::{collect_files, expand_inputs, has_extension, BatchResult, VIDEO_EXTENSIONS};
pub use errors::{Result, ToolError};
pub use ffmpeg_process::{format_ffmpeg_error, get_error_suggestion, FfmpegProcess, WaitOutcome};
pub use ffprobe::{parse_frame_rate, parse_probe_json, probe_video, FFprobeResult};
pub use progress::{create_progress_bar, format_bytes, format_duration};
pub use report::{print_simple_summary, print_summary_report};
pub use tools::{find_ffmpeg, find_ffprobe, resolve_tool};
