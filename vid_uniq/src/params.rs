use serde::{Deserialize, Serialize};

/// The concrete transformation values applied to one variant.
///
/// Built once by the sampler and never modified afterwards. Values are
/// already rounded to the precision written into the filter chain, so
/// the record matches what the encoder received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationParameters {
    pub speed_ratio: f64,
    pub hue_shift_degrees: i32,
    pub saturation_ratio: f64,
    pub brightness_delta: f64,
    pub gamma: f64,
    /// Fraction of width/height trimmed, e.g. `0.025` for 2.5%
    pub crop_fraction: f64,
    pub zoom_factor: f64,
    pub noise_amplitude: f64,
    pub horizontal_flip: bool,
    pub target_frame_rate: f64,
    pub pitch_shift_semitones: f64,
    pub volume_ratio: f64,
    pub metadata_randomized: bool,
    pub constant_rate_factor: u8,
    pub keyframe_interval: u32,
    pub b_frame_count: u8,
}

impl TransformationParameters {
    /// Every transformation at its no-op value, with median encoder tuning.
    pub fn identity() -> Self {
        Self {
            speed_ratio: 1.0,
            hue_shift_degrees: 0,
            saturation_ratio: 1.0,
            brightness_delta: 0.0,
            gamma: 1.0,
            crop_fraction: 0.0,
            zoom_factor: 1.0,
            noise_amplitude: 0.0,
            horizontal_flip: false,
            target_frame_rate: 30.0,
            pitch_shift_semitones: 0.0,
            volume_ratio: 1.0,
            metadata_randomized: false,
            constant_rate_factor: 21,
            keyframe_interval: 48,
            b_frame_count: 2,
        }
    }

    pub fn crop_percent(&self) -> f64 {
        self.crop_fraction * 100.0
    }

    /// Sample-rate multiplier that realizes the pitch shift, `2^(st/12)`.
    pub fn pitch_factor(&self) -> f64 {
        2f64.powf(self.pitch_shift_semitones / 12.0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for TransformationParameters {
    fn default() -> Self {
        Self::identity()
    }
}

/// Round to `places` decimal places, half away from zero.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
