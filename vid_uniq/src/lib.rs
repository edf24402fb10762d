//! vid-uniq - Batch video uniquifier
//!
//! Produces N near-identical but bit-distinct variants of a source video:
//! - Bounded random parameter sampling per intensity tier
//! - Typed filter pipeline rendered to an ffmpeg invocation
//! - Bounded worker pool with index-ordered, per-task results
//! - Heuristic evasion score per variant
//! - Perceptual fingerprints for comparing variants and spotting duplicates
//! - Platform readiness checks and reformatting (canvas fit, crop, clips)
//!
//! ```rust,ignore
//! use vid_uniq::{dispatch, BatchRequest, FfmpegEncoder, GenerationConfig, IntensityTier};
//! use std::time::Duration;
//!
//! let config = GenerationConfig::new(IntensityTier::High);
//! let encoder = FfmpegEncoder::new(shared_utils::find_ffmpeg()?, config.timeout);
//! let request = BatchRequest::new("clip.mp4", "out/session", 10);
//! let results = dispatch(&request, &config, &encoder, |done, total| {
//!     println!("{done}/{total}");
//! })?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod errors;
pub mod intensity;
pub mod metadata;
pub mod params;
pub mod pipeline;
pub mod platform;
pub mod processing;
pub mod sampler;
pub mod scoring;
pub mod session;
pub mod similarity;
pub mod store;

pub use config::{Category, EnabledCategories, EncoderSettings, GenerationConfig};
pub use dispatcher::{dispatch, BatchRequest, GenerationResult, MAX_VARIANTS};
pub use encoder::{run_ffmpeg, FfmpegEncoder, VariantEncoder};
pub use errors::{EncodeFailure, Result, UniqError};
pub use intensity::{IntensityPreset, IntensityTier};
pub use metadata::MetadataTags;
pub use params::TransformationParameters;
pub use pipeline::{AudioStep, EncodeJob, FilterPipeline, VideoStep};
pub use platform::{
    assess, check_against_library, check_file, PlatformProfile, ProbeSummary, ReadinessReport,
    RiskLevel,
};
pub use processing::{AspectRatio, VideoProcessor};
pub use sampler::ParameterSampler;
pub use scoring::{preview_score, score, EvasionScore, ScoreBreakdown, ScoreTier};
pub use session::{
    bulk_folder_name, create_unique_dir, run_bulk, run_session, session_folder_name, BulkReport,
    ScoredVariant, SessionContext, SessionMode, SessionReport,
};
pub use similarity::{
    compare_all, compare_videos, fingerprint, Comparison, HashLibrary, VideoFingerprint, Verdict,
};
pub use store::{Analytics, TrackingStore};
