//! Intensity tiers and their sampling ranges.
//!
//! The ranges are fixed configuration data. Changing them changes every
//! downstream score distribution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl IntensityTier {
    pub const ALL: [IntensityTier; 3] = [
        IntensityTier::Low,
        IntensityTier::Medium,
        IntensityTier::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntensityTier::Low => "low",
            IntensityTier::Medium => "medium",
            IntensityTier::High => "high",
        }
    }

    /// Unknown names fall back to `Medium`; the fallback is logged.
    pub fn parse_or_default(name: &str) -> IntensityTier {
        name.parse().unwrap_or_else(|_| {
            warn!(
                requested = name,
                fallback = IntensityTier::Medium.as_str(),
                "Unknown intensity tier, falling back to medium"
            );
            IntensityTier::Medium
        })
    }

    pub fn preset(&self) -> &'static IntensityPreset {
        match self {
            IntensityTier::Low => &LOW,
            IntensityTier::Medium => &MEDIUM,
            IntensityTier::High => &HIGH,
        }
    }
}

impl fmt::Display for IntensityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown intensity tier '{}'", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for IntensityTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(IntensityTier::Low),
            "medium" => Ok(IntensityTier::Medium),
            "high" => Ok(IntensityTier::High),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

/// Per-tier sampling bounds. All ranges are closed.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityPreset {
    pub speed: RangeInclusive<f64>,
    /// Hue is sampled in `[-hue_max, hue_max]` degrees
    pub hue_max: i32,
    /// Crop is sampled in `[CROP_MIN_PERCENT, crop_max_percent]`
    pub crop_max_percent: f64,
    /// Noise is sampled in `[NOISE_MIN, noise_max]`
    pub noise_max: f64,
    pub zoom: RangeInclusive<f64>,
    /// Pitch is sampled in `[-pitch_max, pitch_max]` semitones
    pub pitch_max: f64,
    /// Frame rate is sampled in `[30 - jitter, 30 + jitter]`
    pub frame_rate_jitter: f64,
    pub flip_probability: f64,
}

impl IntensityPreset {
    pub fn crop_fraction(&self) -> RangeInclusive<f64> {
        CROP_MIN_PERCENT / 100.0..=self.crop_max_percent / 100.0
    }

    pub fn noise(&self) -> RangeInclusive<f64> {
        NOISE_MIN..=self.noise_max
    }

    pub fn pitch(&self) -> RangeInclusive<f64> {
        -self.pitch_max..=self.pitch_max
    }

    pub fn hue(&self) -> RangeInclusive<i32> {
        -self.hue_max..=self.hue_max
    }

    pub fn frame_rate(&self) -> RangeInclusive<f64> {
        BASE_FRAME_RATE - self.frame_rate_jitter..=BASE_FRAME_RATE + self.frame_rate_jitter
    }
}

pub static LOW: IntensityPreset = IntensityPreset {
    speed: 0.97..=1.03,
    hue_max: 8,
    crop_max_percent: 2.0,
    noise_max: 3.0,
    zoom: 1.01..=1.03,
    pitch_max: 0.3,
    frame_rate_jitter: 0.03,
    flip_probability: 0.3,
};

pub static MEDIUM: IntensityPreset = IntensityPreset {
    speed: 0.94..=1.06,
    hue_max: 15,
    crop_max_percent: 3.0,
    noise_max: 5.0,
    zoom: 1.02..=1.05,
    pitch_max: 0.5,
    frame_rate_jitter: 0.05,
    flip_probability: 0.4,
};

pub static HIGH: IntensityPreset = IntensityPreset {
    speed: 0.88..=1.12,
    hue_max: 22,
    crop_max_percent: 4.0,
    noise_max: 8.0,
    zoom: 1.03..=1.07,
    pitch_max: 0.8,
    frame_rate_jitter: 0.08,
    flip_probability: 0.5,
};

pub const BASE_FRAME_RATE: f64 = 30.0;
pub const CROP_MIN_PERCENT: f64 = 0.5;
pub const NOISE_MIN: f64 = 1.0;

/// Minimum magnitude of an enabled hue shift, degrees.
pub const HUE_FLOOR: i32 = 3;
/// Minimum magnitude of an enabled pitch shift, semitones.
pub const PITCH_FLOOR: f64 = 0.1;

// Tier-independent ranges
pub const SATURATION: RangeInclusive<f64> = 0.94..=1.06;
pub const BRIGHTNESS: RangeInclusive<f64> = -0.03..=0.03;
pub const GAMMA: RangeInclusive<f64> = 0.97..=1.03;
pub const VOLUME: RangeInclusive<f64> = 0.97..=1.03;
pub const CRF: RangeInclusive<u8> = 18..=24;
pub const KEYFRAME_INTERVALS: [u32; 5] = [24, 30, 48, 60, 72];
pub const B_FRAME_COUNTS: [u8; 4] = [0, 1, 2, 3];
