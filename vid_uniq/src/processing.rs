//! Platform reformatting: fit to a platform canvas, vertical crop, and
//! splitting long sources into short clips.
//!
//! Each operation is a single ffmpeg invocation run through
//! [`crate::encoder::run_ffmpeg`]; failures carry the encoder's stderr.

use crate::encoder::run_ffmpeg;
use crate::errors::{Result, UniqError};
use crate::platform::PlatformProfile;
use shared_utils::ffprobe::probe_video;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const PROCESSING_CRF: u8 = 20;
pub const DEFAULT_CLIP_SECS: f64 = 30.0;
const REFORMAT_TIMEOUT: Duration = Duration::from_secs(300);
const CLIP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const VERTICAL: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    /// Full-height centered crop to this ratio.
    pub fn crop_filter(&self) -> String {
        format!("crop=ih*{}/{}:ih", self.width, self.height)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::VERTICAL
    }
}

impl FromStr for AspectRatio {
    type Err = UniqError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || UniqError::InvalidAspectRatio(s.to_string());
        let (w, h) = s.trim().split_once(':').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(AspectRatio { width, height })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

pub fn resize_args(input: &Path, output: &Path, profile: PlatformProfile) -> Vec<OsString> {
    let (w, h) = profile.canvas();
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    for arg in [
        "-vf".to_string(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        PROCESSING_CRF.to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// Audio is stream-copied; only the picture is re-encoded.
pub fn smart_crop_args(input: &Path, output: &Path, ratio: AspectRatio) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    for arg in [
        "-vf".to_string(),
        ratio.crop_filter(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        PROCESSING_CRF.to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// One clip cut out of a longer source.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpan {
    /// 1-based.
    pub number: usize,
    pub start: f64,
    pub duration: f64,
}

/// Consecutive spans of `clip_secs` covering `total_secs`. The last span
/// keeps the full length; ffmpeg stops at end of input.
pub fn plan_clips(total_secs: f64, clip_secs: f64) -> Vec<ClipSpan> {
    let mut spans = Vec::new();
    if !(clip_secs > 0.0 && clip_secs.is_finite() && total_secs.is_finite()) {
        return spans;
    }
    let mut start = 0.0;
    while start < total_secs {
        spans.push(ClipSpan {
            number: spans.len() + 1,
            start,
            duration: clip_secs,
        });
        start += clip_secs;
    }
    spans
}

/// `<dir>/<stem>_clipNN.mp4`
pub fn clip_path(output_dir: &Path, stem: &str, number: usize) -> PathBuf {
    output_dir.join(format!("{}_clip{:02}.mp4", stem, number))
}

pub fn clip_args(input: &Path, output: &Path, span: &ClipSpan) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
    for arg in [
        "-ss".to_string(),
        span.start.to_string(),
        "-t".to_string(),
        span.duration.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        PROCESSING_CRF.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// Runs the reformatting jobs against one ffmpeg/ffprobe pair.
#[derive(Debug, Clone)]
pub struct VideoProcessor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl VideoProcessor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// Letterbox `input` onto the platform's canvas.
    pub fn resize_for_platform(
        &self,
        input: &Path,
        output: &Path,
        profile: PlatformProfile,
    ) -> Result<()> {
        require_source(input)?;
        info!(input = %input.display(), platform = profile.slug(), "Resizing for platform");
        self.run(output, resize_args(input, output, profile), REFORMAT_TIMEOUT)
    }

    pub fn smart_crop(&self, input: &Path, output: &Path, ratio: AspectRatio) -> Result<()> {
        require_source(input)?;
        info!(input = %input.display(), ratio = %ratio, "Cropping");
        self.run(output, smart_crop_args(input, output, ratio), REFORMAT_TIMEOUT)
    }

    /// Cut `input` into `clip_secs` pieces under `output_dir`.
    ///
    /// Stops at the first clip that fails.
    pub fn split_into_clips(
        &self,
        input: &Path,
        output_dir: &Path,
        clip_secs: f64,
    ) -> Result<Vec<PathBuf>> {
        if !(clip_secs > 0.0 && clip_secs.is_finite()) {
            return Err(UniqError::InvalidClipLength(clip_secs));
        }
        require_source(input)?;
        let duration = probe_video(&self.ffprobe, input)?.duration;
        fs::create_dir_all(output_dir)?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());

        let spans = plan_clips(duration, clip_secs);
        info!(
            input = %input.display(),
            duration,
            clips = spans.len(),
            "Splitting into clips"
        );

        let mut clips = Vec::with_capacity(spans.len());
        for span in &spans {
            let output = clip_path(output_dir, &stem, span.number);
            self.run(&output, clip_args(input, &output, span), CLIP_TIMEOUT)?;
            clips.push(output);
        }
        Ok(clips)
    }

    fn run(&self, output: &Path, args: Vec<OsString>, timeout: Duration) -> Result<()> {
        run_ffmpeg(&self.ffmpeg, &args, timeout).map_err(|failure| UniqError::Processing {
            path: output.to_path_buf(),
            failure,
        })
    }
}

fn require_source(input: &Path) -> Result<()> {
    if input.is_file() {
        Ok(())
    } else {
        Err(UniqError::SourceNotFound(input.to_path_buf()))
    }
}
