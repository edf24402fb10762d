//! Evasion score estimator.
//!
//! A fixed linear heuristic with a cap per feature. The weights are
//! historical constants; changing any of them shifts every safe/risk
//! classification downstream.

use crate::config::EnabledCategories;
use crate::params::TransformationParameters;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOISE_WEIGHT: f64 = 3.0;
pub const NOISE_CAP: f64 = 18.0;
pub const ZOOM_WEIGHT: f64 = 3.5;
pub const ZOOM_CAP: f64 = 14.0;
pub const GAMMA_WEIGHT: f64 = 200.0;
pub const GAMMA_CAP: f64 = 5.0;
pub const HUE_WEIGHT: f64 = 0.15;
pub const HUE_CAP: f64 = 2.0;
pub const FLIP_POINTS: f64 = 12.0;
pub const CROP_WEIGHT: f64 = 2.0;
pub const CROP_CAP: f64 = 4.0;
pub const SPEED_WEIGHT: f64 = 40.0;
pub const SPEED_CAP: f64 = 3.0;
pub const PITCH_WEIGHT: f64 = 35.0;
pub const PITCH_CAP: f64 = 20.0;
pub const FRAME_RATE_WEIGHT: f64 = 50.0;
pub const FRAME_RATE_CAP: f64 = 5.0;
pub const VOLUME_POINTS: f64 = 3.0;
pub const METADATA_POINTS: f64 = 5.0;
pub const REENCODE_POINTS: f64 = 8.0;

pub const SAFE_THRESHOLD: u8 = 60;
pub const MODERATE_THRESHOLD: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvasionScore {
    pub total: u8,
}

impl EvasionScore {
    pub fn tier(&self) -> ScoreTier {
        ScoreTier::from_score(self.total)
    }

    pub fn is_safe(&self) -> bool {
        self.tier() == ScoreTier::Safe
    }
}

impl fmt::Display for EvasionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100", self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Safe,
    Moderate,
    Risk,
}

impl ScoreTier {
    pub fn from_score(total: u8) -> Self {
        if total >= SAFE_THRESHOLD {
            ScoreTier::Safe
        } else if total >= MODERATE_THRESHOLD {
            ScoreTier::Moderate
        } else {
            ScoreTier::Risk
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreTier::Safe => "safe",
            ScoreTier::Moderate => "moderate",
            ScoreTier::Risk => "risk",
        }
    }
}

impl fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-feature contributions after capping, before rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub noise: f64,
    pub zoom: f64,
    pub gamma: f64,
    pub hue: f64,
    pub horizontal_flip: f64,
    pub crop: f64,
    pub speed: f64,
    pub pitch: f64,
    pub frame_rate: f64,
    pub volume: f64,
    pub metadata: f64,
    pub reencode: f64,
}

impl ScoreBreakdown {
    pub fn of(p: &TransformationParameters) -> Self {
        Self {
            noise: capped(p.noise_amplitude * NOISE_WEIGHT, NOISE_CAP),
            zoom: capped((p.zoom_factor - 1.0) * 100.0 * ZOOM_WEIGHT, ZOOM_CAP),
            gamma: capped((p.gamma - 1.0).abs() * GAMMA_WEIGHT, GAMMA_CAP),
            hue: capped(f64::from(p.hue_shift_degrees).abs() * HUE_WEIGHT, HUE_CAP),
            horizontal_flip: if p.horizontal_flip { FLIP_POINTS } else { 0.0 },
            crop: capped(p.crop_percent() * CROP_WEIGHT, CROP_CAP),
            speed: capped((p.speed_ratio - 1.0).abs() * SPEED_WEIGHT, SPEED_CAP),
            pitch: capped(p.pitch_shift_semitones.abs() * PITCH_WEIGHT, PITCH_CAP),
            frame_rate: capped(
                (p.target_frame_rate - 30.0).abs() * FRAME_RATE_WEIGHT,
                FRAME_RATE_CAP,
            ),
            volume: VOLUME_POINTS,
            metadata: if p.metadata_randomized {
                METADATA_POINTS
            } else {
                0.0
            },
            reencode: REENCODE_POINTS,
        }
    }

    pub fn raw_sum(&self) -> f64 {
        self.noise
            + self.zoom
            + self.gamma
            + self.hue
            + self.horizontal_flip
            + self.crop
            + self.speed
            + self.pitch
            + self.frame_rate
            + self.volume
            + self.metadata
            + self.reencode
    }

    /// Round half away from zero, then clamp to `0..=100`. A NaN
    /// contribution anywhere scores 0.
    pub fn total(&self) -> EvasionScore {
        let rounded = self.raw_sum().round().clamp(0.0, 100.0);
        EvasionScore {
            total: if rounded.is_nan() { 0 } else { rounded as u8 },
        }
    }

    /// `(label, points)` rows for reports.
    pub fn rows(&self) -> [(&'static str, f64); 12] {
        [
            ("noise", self.noise),
            ("zoom", self.zoom),
            ("gamma", self.gamma),
            ("hue", self.hue),
            ("horizontal_flip", self.horizontal_flip),
            ("crop", self.crop),
            ("speed", self.speed),
            ("pitch", self.pitch),
            ("frame_rate", self.frame_rate),
            ("volume", self.volume),
            ("metadata", self.metadata),
            ("reencode", self.reencode),
        ]
    }
}

/// `f64::min` would swallow a NaN and award the full cap.
fn capped(points: f64, cap: f64) -> f64 {
    if points.is_nan() {
        f64::NAN
    } else {
        points.min(cap)
    }
}

pub fn score(params: &TransformationParameters) -> EvasionScore {
    ScoreBreakdown::of(params).total()
}

/// Typical score for a set of enabled categories before anything is sampled.
pub fn preview_score(enabled: &EnabledCategories) -> u8 {
    let mut total: u32 = 3 + 8;
    for (on, points) in [
        (enabled.noise, 14),
        (enabled.zoom, 12),
        (enabled.gamma, 4),
        (enabled.hue, 1),
        (enabled.horizontal_flip, 5),
        (enabled.crop, 2),
        (enabled.speed, 1),
        (enabled.pitch, 17),
        (enabled.frame_rate, 3),
        (enabled.metadata, 5),
    ] {
        if on {
            total += points;
        }
    }
    total.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medium_noise_zoom_pitch_metadata_scores_63() {
        let mut p = TransformationParameters::identity();
        p.noise_amplitude = 5.0;
        p.zoom_factor = 1.05;
        p.pitch_shift_semitones = 0.5;
        p.metadata_randomized = true;

        let b = ScoreBreakdown::of(&p);
        assert_eq!(b.noise, 15.0);
        assert_eq!(b.zoom, 14.0);
        assert_eq!(b.pitch, 17.5);
        assert_eq!(b.raw_sum(), 62.5);

        let s = score(&p);
        assert_eq!(s.total, 63);
        assert_eq!(s.tier(), ScoreTier::Safe);
    }

    #[test]
    fn test_everything_disabled_scores_11() {
        let s = score(&TransformationParameters::identity());
        assert_eq!(s.total, 11);
        assert_eq!(s.tier(), ScoreTier::Risk);
    }

    #[test]
    fn test_caps_apply() {
        let mut p = TransformationParameters::identity();
        p.noise_amplitude = 100.0;
        p.zoom_factor = 2.0;
        p.gamma = 0.5;
        p.hue_shift_degrees = -90;
        p.crop_fraction = 0.5;
        p.speed_ratio = 0.5;
        p.pitch_shift_semitones = -12.0;
        p.target_frame_rate = 24.0;
        p.horizontal_flip = true;
        p.metadata_randomized = true;

        let b = ScoreBreakdown::of(&p);
        assert_eq!(b.noise, NOISE_CAP);
        assert_eq!(b.zoom, ZOOM_CAP);
        assert_eq!(b.gamma, GAMMA_CAP);
        assert_eq!(b.hue, HUE_CAP);
        assert_eq!(b.crop, CROP_CAP);
        assert_eq!(b.speed, SPEED_CAP);
        assert_eq!(b.pitch, PITCH_CAP);
        assert_eq!(b.frame_rate, FRAME_RATE_CAP);
        // 18+14+5+2+12+4+3+20+5+3+5+8
        assert_eq!(score(&p).total, 99);
    }

    #[test]
    fn test_crop_uses_percent() {
        let mut p = TransformationParameters::identity();
        p.crop_fraction = 0.01;
        assert!((ScoreBreakdown::of(&p).crop - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(ScoreTier::from_score(100), ScoreTier::Safe);
        assert_eq!(ScoreTier::from_score(60), ScoreTier::Safe);
        assert_eq!(ScoreTier::from_score(59), ScoreTier::Moderate);
        assert_eq!(ScoreTier::from_score(30), ScoreTier::Moderate);
        assert_eq!(ScoreTier::from_score(29), ScoreTier::Risk);
        assert_eq!(ScoreTier::from_score(0), ScoreTier::Risk);
    }

    #[test]
    fn test_preview_score() {
        assert_eq!(preview_score(&EnabledCategories::default()), 75);
        assert_eq!(preview_score(&EnabledCategories::all_disabled()), 11);
        let e = EnabledCategories::with_disabled(&["pitch"]).unwrap();
        assert_eq!(preview_score(&e), 58);
    }

    #[test]
    fn test_nan_input_scores_zero_not_panic() {
        let mut p = TransformationParameters::identity();
        p.noise_amplitude = f64::NAN;
        assert!(ScoreBreakdown::of(&p).noise.is_nan());
        assert_eq!(score(&p).total, 0);

        let mut p = TransformationParameters::identity();
        p.noise_amplitude = 50.0;
        p.pitch_shift_semitones = f64::NAN;
        assert_eq!(score(&p).total, 0);
        assert_eq!(score(&p).tier(), ScoreTier::Risk);
    }

    #[test]
    fn test_capped_keeps_finite_behaviour() {
        assert_eq!(capped(30.0, 18.0), 18.0);
        assert_eq!(capped(4.5, 18.0), 4.5);
        assert_eq!(capped(f64::INFINITY, 18.0), 18.0);
        assert!(capped(f64::NAN, 18.0).is_nan());
    }
}
