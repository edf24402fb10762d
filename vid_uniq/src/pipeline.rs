//! Typed filter pipeline.
//!
//! Steps are plain data until [`FilterPipeline::video_filter`] /
//! [`FilterPipeline::audio_filter`] render them to ffmpeg filtergraph
//! syntax. Building is deterministic: everything random was already
//! drawn by the sampler.

use crate::config::EncoderSettings;
use crate::metadata::MetadataTags;
use crate::params::TransformationParameters;
use std::ffi::OsString;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tracing::warn;

/// `atempo` only accepts ratios in this range per instance.
pub const ATEMPO_RANGE: RangeInclusive<f64> = 0.5..=2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum VideoStep {
    /// Retime by `speed` (`> 1` plays faster)
    SetPts { speed: f64 },
    /// Symmetric trim of `fraction` off width and height
    Crop { fraction: f64 },
    Hue { degrees: i32, saturation: f64 },
    Eq { brightness: f64, gamma: f64 },
    HorizontalFlip,
    /// Temporal noise, strength `0..=100`
    Noise { strength: u32 },
    /// Scale up by `factor` then crop back to the original area
    Zoom { factor: f64 },
    Scale { width: u32, height: u32 },
    Pad { width: u32, height: u32 },
    Fps { rate: f64 },
}

impl VideoStep {
    pub fn name(&self) -> &'static str {
        match self {
            VideoStep::SetPts { .. } => "setpts",
            VideoStep::Crop { .. } => "crop",
            VideoStep::Hue { .. } => "hue",
            VideoStep::Eq { .. } => "eq",
            VideoStep::HorizontalFlip => "hflip",
            VideoStep::Noise { .. } => "noise",
            VideoStep::Zoom { .. } => "zoom",
            VideoStep::Scale { .. } => "scale",
            VideoStep::Pad { .. } => "pad",
            VideoStep::Fps { .. } => "fps",
        }
    }
}

impl fmt::Display for VideoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoStep::SetPts { speed } => write!(f, "setpts=PTS/{}", speed),
            VideoStep::Crop { fraction } => {
                let keep = 1.0 - fraction;
                write!(f, "crop=iw*{:.4}:ih*{:.4}", keep, keep)
            }
            VideoStep::Hue {
                degrees,
                saturation,
            } => write!(f, "hue=h={}:s={}", degrees, saturation),
            VideoStep::Eq { brightness, gamma } => {
                write!(f, "eq=brightness={}:gamma={}", brightness, gamma)
            }
            VideoStep::HorizontalFlip => f.write_str("hflip"),
            VideoStep::Noise { strength } => write!(f, "noise=alls={}:allf=t", strength),
            VideoStep::Zoom { factor } => write!(
                f,
                "scale=iw*{z}:ih*{z},crop=iw/{z}:ih/{z}",
                z = factor
            ),
            VideoStep::Scale { width, height } => write!(
                f,
                "scale={}:{}:force_original_aspect_ratio=decrease",
                width, height
            ),
            VideoStep::Pad { width, height } => {
                write!(f, "pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height)
            }
            VideoStep::Fps { rate } => write!(f, "fps={}", rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStep {
    Tempo { ratio: f64 },
    /// Pitch shift by resampling at `sample_rate * factor` and back
    PitchShift { factor: f64, sample_rate: u32 },
    Volume { ratio: f64 },
}

impl AudioStep {
    pub fn name(&self) -> &'static str {
        match self {
            AudioStep::Tempo { .. } => "atempo",
            AudioStep::PitchShift { .. } => "asetrate",
            AudioStep::Volume { .. } => "volume",
        }
    }
}

impl fmt::Display for AudioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioStep::Tempo { ratio } => write!(f, "atempo={}", ratio),
            AudioStep::PitchShift {
                factor,
                sample_rate,
            } => write!(
                f,
                "asetrate={sr}*{:.6},aresample={sr}",
                factor,
                sr = sample_rate
            ),
            AudioStep::Volume { ratio } => write!(f, "volume={}", ratio),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPipeline {
    pub video: Vec<VideoStep>,
    pub audio: Vec<AudioStep>,
}

impl FilterPipeline {
    pub fn build(params: &TransformationParameters, settings: &EncoderSettings) -> Self {
        let mut video = Vec::with_capacity(10);

        if params.speed_ratio != 1.0 {
            video.push(VideoStep::SetPts {
                speed: params.speed_ratio,
            });
        }
        if params.crop_fraction > 0.0 {
            video.push(VideoStep::Crop {
                fraction: params.crop_fraction,
            });
        }
        if params.hue_shift_degrees != 0 || params.saturation_ratio != 1.0 {
            video.push(VideoStep::Hue {
                degrees: params.hue_shift_degrees,
                saturation: params.saturation_ratio,
            });
        }
        if params.brightness_delta != 0.0 || params.gamma != 1.0 {
            video.push(VideoStep::Eq {
                brightness: params.brightness_delta,
                gamma: params.gamma,
            });
        }
        if params.horizontal_flip {
            video.push(VideoStep::HorizontalFlip);
        }
        if params.noise_amplitude > 0.0 {
            // ffmpeg's noise filter takes an integer strength
            let strength = (params.noise_amplitude.trunc() as u32).clamp(1, 100);
            video.push(VideoStep::Noise { strength });
        }
        if params.zoom_factor > 1.0 {
            video.push(VideoStep::Zoom {
                factor: params.zoom_factor,
            });
        }
        video.push(VideoStep::Scale {
            width: settings.width,
            height: settings.height,
        });
        video.push(VideoStep::Pad {
            width: settings.width,
            height: settings.height,
        });
        video.push(VideoStep::Fps {
            rate: params.target_frame_rate,
        });

        let mut audio = Vec::with_capacity(3);
        if params.speed_ratio != 1.0 {
            if ATEMPO_RANGE.contains(&params.speed_ratio) {
                audio.push(AudioStep::Tempo {
                    ratio: params.speed_ratio,
                });
            } else {
                warn!(
                    speed = params.speed_ratio,
                    "Speed ratio outside atempo range, audio tempo left unchanged"
                );
            }
        }
        if params.pitch_shift_semitones != 0.0 {
            audio.push(AudioStep::PitchShift {
                factor: params.pitch_factor(),
                sample_rate: settings.audio_sample_rate,
            });
        }
        audio.push(AudioStep::Volume {
            ratio: params.volume_ratio,
        });

        Self { video, audio }
    }

    pub fn video_filter(&self) -> String {
        join_steps(&self.video)
    }

    /// `None` when there are no audio steps.
    pub fn audio_filter(&self) -> Option<String> {
        if self.audio.is_empty() {
            None
        } else {
            Some(join_steps(&self.audio))
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.video
            .iter()
            .map(VideoStep::name)
            .chain(self.audio.iter().map(AudioStep::name))
            .collect()
    }
}

fn join_steps<T: fmt::Display>(steps: &[T]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Everything needed to run one external encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub index: usize,
    pub name: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub params: TransformationParameters,
    pub pipeline: FilterPipeline,
    pub metadata: Option<MetadataTags>,
    pub settings: EncoderSettings,
}

impl EncodeJob {
    pub fn new(
        index: usize,
        name: impl Into<String>,
        source: PathBuf,
        output: PathBuf,
        params: TransformationParameters,
        metadata: Option<MetadataTags>,
        settings: &EncoderSettings,
    ) -> Self {
        let pipeline = FilterPipeline::build(&params, settings);
        Self {
            index,
            name: name.into(),
            source,
            output,
            params,
            pipeline,
            metadata,
            settings: settings.clone(),
        }
    }

    /// Full ffmpeg argument vector, without the program name.
    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), self.source.clone().into()];

        args.push("-vf".into());
        args.push(self.pipeline.video_filter().into());
        if let Some(af) = self.pipeline.audio_filter() {
            args.push("-af".into());
            args.push(af.into());
        }

        let p = &self.params;
        let s = &self.settings;
        for (flag, value) in [
            ("-c:v", s.video_codec.clone()),
            ("-crf", p.constant_rate_factor.to_string()),
            ("-preset", s.preset.clone()),
            ("-g", p.keyframe_interval.to_string()),
            ("-bf", p.b_frame_count.to_string()),
            ("-c:a", s.audio_codec.clone()),
            ("-b:a", s.audio_bitrate.clone()),
        ] {
            args.push(flag.into());
            args.push(value.into());
        }

        if let Some(tags) = &self.metadata {
            for (key, value) in tags.ffmpeg_pairs() {
                args.push("-metadata".into());
                args.push(format!("{}={}", key, value).into());
            }
        }

        args.push(self.output.clone().into());
        args
    }

    /// Shell-ish rendering for logs.
    pub fn command_line(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in self.ffmpeg_args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::sampler::ParameterSampler;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    proptest! {
        #[test]
        fn prop_sampled_chain_always_ends_canonical(seed in any::<u64>()) {
            let cfg = GenerationConfig::default();
            let p = ParameterSampler::sample(&cfg, &mut StdRng::seed_from_u64(seed));
            let pipeline = FilterPipeline::build(&p, &cfg.encoder);
            let n = pipeline.video.len();
            prop_assert!(n >= 3);
            prop_assert_eq!(pipeline.video[n - 3].name(), "scale");
            prop_assert_eq!(pipeline.video[n - 2].name(), "pad");
            prop_assert_eq!(pipeline.video[n - 1].name(), "fps");
            prop_assert!(!pipeline.video_filter().contains(",,"));
            prop_assert_eq!(pipeline.audio.last().map(AudioStep::name), Some("volume"));
        }
    }
}
