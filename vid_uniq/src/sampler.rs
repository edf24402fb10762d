//! Bounded random sampling of per-variant transformation parameters.

use crate::config::GenerationConfig;
use crate::intensity::{
    IntensityPreset, BRIGHTNESS, B_FRAME_COUNTS, CRF, GAMMA, HUE_FLOOR,
    KEYFRAME_INTERVALS, PITCH_FLOOR, SATURATION, VOLUME,
};
use crate::params::{round_to, TransformationParameters};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::trace;

pub struct ParameterSampler;

impl ParameterSampler {
    /// Draw one parameter set. Disabled categories keep their identity value.
    ///
    /// Saturation follows the hue toggle and brightness follows the gamma
    /// toggle; volume jitter and encoder tuning are always drawn.
    pub fn sample<R: Rng>(
        config: &GenerationConfig,
        rng: &mut R,
    ) -> TransformationParameters {
        let preset = config.tier.preset();
        let on = &config.enabled;
        let mut p = TransformationParameters::identity();

        if on.speed {
            p.speed_ratio = round_to(rng.random_range(preset.speed.clone()), 3);
        }
        if on.hue {
            p.hue_shift_degrees = sample_hue(preset, rng);
            p.saturation_ratio = round_to(rng.random_range(SATURATION), 2);
        }
        if on.gamma {
            p.gamma = round_to(rng.random_range(GAMMA), 3);
            p.brightness_delta = round_to(rng.random_range(BRIGHTNESS), 3);
        }
        if on.crop {
            p.crop_fraction = round_to(rng.random_range(preset.crop_fraction()), 4);
        }
        if on.zoom {
            p.zoom_factor = round_to(rng.random_range(preset.zoom.clone()), 3);
        }
        if on.noise {
            p.noise_amplitude = round_to(rng.random_range(preset.noise()), 1);
        }
        if on.horizontal_flip {
            p.horizontal_flip = rng.random_bool(preset.flip_probability);
        }
        if on.frame_rate {
            p.target_frame_rate = round_to(rng.random_range(preset.frame_rate()), 2);
        }
        if on.pitch {
            p.pitch_shift_semitones = sample_pitch(preset, rng);
        }
        p.metadata_randomized = on.metadata;

        p.volume_ratio = round_to(rng.random_range(VOLUME), 3);
        p.constant_rate_factor = rng.random_range(CRF);
        p.keyframe_interval = KEYFRAME_INTERVALS.choose(rng).copied().unwrap_or(48);
        p.b_frame_count = B_FRAME_COUNTS.choose(rng).copied().unwrap_or(2);

        trace!(tier = %config.tier, params = ?p, "sampled parameters");
        p
    }
}

fn random_sign<R: Rng>(rng: &mut R) -> i32 {
    if rng.random_bool(0.5) {
        1
    } else {
        -1
    }
}

fn sample_hue<R: Rng>(preset: &IntensityPreset, rng: &mut R) -> i32 {
    let hue = rng.random_range(preset.hue());
    if hue.abs() >= HUE_FLOOR {
        return hue;
    }
    random_sign(rng) * rng.random_range(HUE_FLOOR..=preset.hue_max)
}

fn sample_pitch<R: Rng>(preset: &IntensityPreset, rng: &mut R) -> f64 {
    let pitch = round_to(rng.random_range(preset.pitch()), 2);
    if pitch.abs() >= PITCH_FLOOR {
        return pitch;
    }
    let magnitude = round_to(rng.random_range(PITCH_FLOOR..=preset.pitch_max), 2);
    f64::from(random_sign(rng)) * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Category, EnabledCategories};
    use crate::intensity::IntensityTier;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(tier: IntensityTier, enabled: EnabledCategories) -> GenerationConfig {
        GenerationConfig::new(tier).with_enabled(enabled)
    }

    #[test]
    fn test_all_disabled_is_identity_except_jitter() {
        let cfg = config(IntensityTier::High, EnabledCategories::all_disabled());
        let mut rng = StdRng::seed_from_u64(7);
        let p = ParameterSampler::sample(&cfg, &mut rng);
        let id = TransformationParameters::identity();
        assert_eq!(p.speed_ratio, id.speed_ratio);
        assert_eq!(p.hue_shift_degrees, 0);
        assert_eq!(p.saturation_ratio, 1.0);
        assert_eq!(p.brightness_delta, 0.0);
        assert_eq!(p.gamma, 1.0);
        assert_eq!(p.crop_fraction, 0.0);
        assert_eq!(p.zoom_factor, 1.0);
        assert_eq!(p.noise_amplitude, 0.0);
        assert!(!p.horizontal_flip);
        assert_eq!(p.target_frame_rate, 30.0);
        assert_eq!(p.pitch_shift_semitones, 0.0);
        assert!(!p.metadata_randomized);
        assert!(VOLUME.contains(&p.volume_ratio));
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let cfg = GenerationConfig::default();
        let a = ParameterSampler::sample(&cfg, &mut StdRng::seed_from_u64(42));
        let b = ParameterSampler::sample(&cfg, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_encoder_tuning_drawn_from_fixed_sets() {
        let cfg = config(IntensityTier::Low, EnabledCategories::all_disabled());
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let p = ParameterSampler::sample(&cfg, &mut rng);
            assert!(CRF.contains(&p.constant_rate_factor));
            assert!(KEYFRAME_INTERVALS.contains(&p.keyframe_interval));
            assert!(B_FRAME_COUNTS.contains(&p.b_frame_count));
        }
    }

    #[test]
    fn test_flip_is_probabilistic() {
        let cfg = config(IntensityTier::High, EnabledCategories::default());
        let mut rng = StdRng::seed_from_u64(99);
        let flips = (0..400)
            .filter(|_| ParameterSampler::sample(&cfg, &mut rng).horizontal_flip)
            .count();
        assert!(flips > 100 && flips < 300, "flips = {}", flips);
    }

    #[test]
    fn test_single_category_only_touches_its_fields() {
        let mut enabled = EnabledCategories::all_disabled();
        enabled.set(Category::Zoom, true);
        let cfg = config(IntensityTier::Medium, enabled);
        let p = ParameterSampler::sample(&cfg, &mut StdRng::seed_from_u64(3));
        assert!(p.zoom_factor >= 1.02 && p.zoom_factor <= 1.05);
        assert_eq!(p.noise_amplitude, 0.0);
        assert_eq!(p.pitch_shift_semitones, 0.0);
    }
}
