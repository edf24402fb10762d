//! Platform readiness check for a finished file.
//!
//! Duration, canvas and audio presence are compared against what each
//! short-video platform expects. When a hash library is available the
//! file's best match against it adds duplicate deductions on top.

use crate::errors::{Result, UniqError};
use crate::similarity::{fingerprint, HashLibrary, LibraryScores, DUPLICATE_THRESHOLD};
use serde::Serialize;
use shared_utils::ffprobe::{probe_video, FFprobeResult};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSummary {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub frame_rate: f64,
    pub bit_rate: u64,
    pub has_audio: bool,
}

impl From<&FFprobeResult> for ProbeSummary {
    fn from(probe: &FFprobeResult) -> Self {
        Self {
            duration: probe.duration,
            width: probe.width,
            height: probe.height,
            codec: probe.video_codec.clone(),
            frame_rate: probe.frame_rate,
            bit_rate: probe.bit_rate,
            has_audio: probe.has_audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlatformProfile {
    TikTok,
    InstagramReels,
    YouTubeShorts,
}

impl PlatformProfile {
    pub const ALL: [PlatformProfile; 3] = [
        PlatformProfile::TikTok,
        PlatformProfile::InstagramReels,
        PlatformProfile::YouTubeShorts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PlatformProfile::TikTok => "TikTok",
            PlatformProfile::InstagramReels => "Instagram Reels",
            PlatformProfile::YouTubeShorts => "YouTube Shorts",
        }
    }

    /// Lowercase identifier used on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            PlatformProfile::TikTok => "tiktok",
            PlatformProfile::InstagramReels => "instagram_reels",
            PlatformProfile::YouTubeShorts => "youtube_shorts",
        }
    }

    /// Target `(width, height)`; every profile is a 1080x1920 portrait.
    pub fn canvas(&self) -> (u32, u32) {
        (CANVAS_WIDTH, CANVAS_HEIGHT)
    }

    pub fn max_duration_secs(&self) -> f64 {
        match self {
            PlatformProfile::TikTok => 180.0,
            PlatformProfile::InstagramReels => 90.0,
            PlatformProfile::YouTubeShorts => 60.0,
        }
    }

    /// Weight in the overall score, in tenths.
    fn weight(&self) -> u32 {
        match self {
            PlatformProfile::TikTok => 4,
            PlatformProfile::InstagramReels => 3,
            PlatformProfile::YouTubeShorts => 3,
        }
    }
}

impl FromStr for PlatformProfile {
    type Err = UniqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tiktok" => Ok(PlatformProfile::TikTok),
            "instagram" | "instagram_reels" | "reels" => Ok(PlatformProfile::InstagramReels),
            "youtube" | "youtube_shorts" | "shorts" => Ok(PlatformProfile::YouTubeShorts),
            _ => Err(UniqError::UnknownPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => RiskLevel::Low,
            60..=79 => RiskLevel::Medium,
            40..=59 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformScore {
    pub platform: PlatformProfile,
    pub score: u8,
    pub risk: RiskLevel,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

struct Deductions {
    score: i32,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Deductions {
    fn new() -> Self {
        Self {
            score: 100,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn deduct(&mut self, points: i32, issue: impl Into<String>, recommendation: Option<&str>) {
        self.score -= points;
        self.issues.push(issue.into());
        if let Some(r) = recommendation {
            self.recommendations.push(r.to_string());
        }
    }

    fn finish(self, platform: PlatformProfile) -> PlatformScore {
        let score = self.score.clamp(0, 100) as u8;
        PlatformScore {
            platform,
            score,
            risk: RiskLevel::from_score(score),
            issues: self.issues,
            recommendations: self.recommendations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub probe: ProbeSummary,
    pub overall: u8,
    pub platforms: Vec<PlatformScore>,
    /// Best match against the hash library, in percent.
    pub library_similarity: f64,
    pub duplicate_found: bool,
    pub fingerprint: Option<String>,
}

impl ReadinessReport {
    pub fn platform(&self, profile: PlatformProfile) -> Option<&PlatformScore> {
        self.platforms.iter().find(|p| p.platform == profile)
    }

    pub fn overall_risk(&self) -> RiskLevel {
        RiskLevel::from_score(self.overall)
    }
}

pub fn assess_platform(
    profile: PlatformProfile,
    probe: &ProbeSummary,
    library_similarity: f64,
) -> PlatformScore {
    let mut d = Deductions::new();
    let sim = library_similarity;
    match profile {
        PlatformProfile::TikTok => {
            if probe.duration > profile.max_duration_secs() {
                d.deduct(10, "Video too long (over 3 min)", Some("Split into clips under 3 min"));
            }
            if sim > 90.0 {
                d.deduct(
                    40,
                    "Near-identical fingerprint found in the library",
                    Some("Apply more modifications (high intensity)"),
                );
            } else if sim > 70.0 {
                d.deduct(
                    20,
                    "Moderate similarity with existing videos",
                    Some("Add extra visual effects"),
                );
            }
            if probe.width != CANVAS_WIDTH || probe.height != CANVAS_HEIGHT {
                d.deduct(
                    5,
                    format!("Non-optimal resolution: {}x{}", probe.width, probe.height),
                    Some("Resize to 1080x1920"),
                );
            }
            // strictest matcher of the three
            d.score -= 10;
        }
        PlatformProfile::InstagramReels => {
            if probe.duration > profile.max_duration_secs() {
                d.deduct(10, "Long for Reels (over 90 s)", Some("Aim for 15-60 seconds"));
            }
            if sim > 85.0 {
                d.deduct(
                    30,
                    "Very similar content detected",
                    Some("Change the visual composition"),
                );
            } else if sim > 60.0 {
                d.deduct(15, "Moderate similarity", None);
            }
        }
        PlatformProfile::YouTubeShorts => {
            if probe.duration > profile.max_duration_secs() {
                d.deduct(
                    5,
                    "Exceeds the 60 s Shorts limit",
                    Some("Trim to under 60 s for Shorts"),
                );
            }
            if probe.has_audio {
                d.deduct(
                    15,
                    "Audio present (Content ID risk)",
                    Some("Use royalty-free music or shift the audio pitch"),
                );
            }
            if sim > 80.0 {
                d.deduct(
                    25,
                    "Similar video in the library",
                    Some("Apply visual modifications"),
                );
            }
        }
    }
    d.finish(profile)
}

/// Score a probed file against every platform profile.
///
/// `library_similarity` is the file's best match against the hash library
/// (0 when there is no library).
pub fn assess(probe: &ProbeSummary, library_similarity: f64) -> ReadinessReport {
    let platforms: Vec<PlatformScore> = PlatformProfile::ALL
        .iter()
        .map(|p| assess_platform(*p, probe, library_similarity))
        .collect();
    let weighted: u32 = platforms
        .iter()
        .map(|s| u32::from(s.score) * s.platform.weight())
        .sum();
    let overall = (weighted / 10).min(100) as u8;
    debug!(overall, library_similarity, "Platform readiness assessed");
    ReadinessReport {
        probe: probe.clone(),
        overall,
        platforms,
        library_similarity,
        duplicate_found: library_similarity > DUPLICATE_THRESHOLD,
        fingerprint: None,
    }
}

/// Probe `path` with `ffprobe` and assess it without a library.
pub fn check_file(ffprobe: &Path, path: &Path) -> Result<ReadinessReport> {
    let probe = probe_video(ffprobe, path)?;
    Ok(assess(&ProbeSummary::from(&probe), 0.0))
}

/// Probe and fingerprint `path`, score it against `library`, and optionally
/// add it to the library afterwards.
///
/// The file is compared before it is added, so a first check never matches
/// itself.
pub fn check_against_library(
    ffprobe: &Path,
    ffmpeg: &Path,
    path: &Path,
    library: &mut HashLibrary,
    add_to_library: bool,
) -> Result<ReadinessReport> {
    let probe = probe_video(ffprobe, path)?;
    let fp = fingerprint(ffmpeg, path)?;
    let similarity = library.max_similarity(&fp);
    let mut report = assess(&ProbeSummary::from(&probe), similarity);
    report.fingerprint = Some(fp.to_string());

    if add_to_library {
        library.insert(&fp, path, &report);
        library.save()?;
        info!(path = %path.display(), "Added to hash library");
    }
    Ok(report)
}

impl From<&ReadinessReport> for LibraryScores {
    fn from(report: &ReadinessReport) -> Self {
        let score = |p| report.platform(p).map(|s| s.score).unwrap_or(0);
        LibraryScores {
            overall: report.overall,
            tiktok: score(PlatformProfile::TikTok),
            instagram: score(PlatformProfile::InstagramReels),
            youtube: score(PlatformProfile::YouTubeShorts),
        }
    }
}
