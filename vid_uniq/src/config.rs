//! Generation configuration: category toggles, encoder settings and the
//! immutable `GenerationConfig` handed to the sampler, builder and
//! dispatcher.

use crate::errors::{Result, UniqError};
use crate::intensity::IntensityTier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Noise,
    Zoom,
    Gamma,
    Hue,
    HorizontalFlip,
    Crop,
    Speed,
    Pitch,
    FrameRate,
    Metadata,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Noise,
        Category::Zoom,
        Category::Gamma,
        Category::Hue,
        Category::HorizontalFlip,
        Category::Crop,
        Category::Speed,
        Category::Pitch,
        Category::FrameRate,
        Category::Metadata,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Noise => "noise",
            Category::Zoom => "zoom",
            Category::Gamma => "gamma",
            Category::Hue => "hue",
            Category::HorizontalFlip => "horizontal_flip",
            Category::Crop => "crop",
            Category::Speed => "speed",
            Category::Pitch => "pitch",
            Category::FrameRate => "frame_rate",
            Category::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = UniqError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let category = match normalized.as_str() {
            "noise" => Category::Noise,
            "zoom" => Category::Zoom,
            "gamma" => Category::Gamma,
            "hue" => Category::Hue,
            "horizontal_flip" | "hflip" | "flip" => Category::HorizontalFlip,
            "crop" => Category::Crop,
            "speed" => Category::Speed,
            "pitch" => Category::Pitch,
            "frame_rate" | "fps" => Category::FrameRate,
            "metadata" | "meta" => Category::Metadata,
            _ => return Err(UniqError::UnknownCategory(s.to_string())),
        };
        Ok(category)
    }
}

/// Per-category enable switches. Every category defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnabledCategories {
    pub noise: bool,
    pub zoom: bool,
    pub gamma: bool,
    pub hue: bool,
    pub horizontal_flip: bool,
    pub crop: bool,
    pub speed: bool,
    pub pitch: bool,
    pub frame_rate: bool,
    pub metadata: bool,
}

impl Default for EnabledCategories {
    fn default() -> Self {
        Self {
            noise: true,
            zoom: true,
            gamma: true,
            hue: true,
            horizontal_flip: true,
            crop: true,
            speed: true,
            pitch: true,
            frame_rate: true,
            metadata: true,
        }
    }
}

impl EnabledCategories {
    pub fn all_disabled() -> Self {
        Self {
            noise: false,
            zoom: false,
            gamma: false,
            hue: false,
            horizontal_flip: false,
            crop: false,
            speed: false,
            pitch: false,
            frame_rate: false,
            metadata: false,
        }
    }

    /// All categories enabled except the named ones. Unknown names are rejected.
    pub fn with_disabled<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut enabled = Self::default();
        for name in names {
            let category: Category = name.as_ref().parse()?;
            enabled.set(category, false);
        }
        Ok(enabled)
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Noise => self.noise,
            Category::Zoom => self.zoom,
            Category::Gamma => self.gamma,
            Category::Hue => self.hue,
            Category::HorizontalFlip => self.horizontal_flip,
            Category::Crop => self.crop,
            Category::Speed => self.speed,
            Category::Pitch => self.pitch,
            Category::FrameRate => self.frame_rate,
            Category::Metadata => self.metadata,
        }
    }

    pub fn set(&mut self, category: Category, on: bool) {
        let slot = match category {
            Category::Noise => &mut self.noise,
            Category::Zoom => &mut self.zoom,
            Category::Gamma => &mut self.gamma,
            Category::Hue => &mut self.hue,
            Category::HorizontalFlip => &mut self.horizontal_flip,
            Category::Crop => &mut self.crop,
            Category::Speed => &mut self.speed,
            Category::Pitch => &mut self.pitch,
            Category::FrameRate => &mut self.frame_rate,
            Category::Metadata => &mut self.metadata,
        };
        *slot = on;
    }

    pub fn disabled(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| !self.is_enabled(*c))
            .collect()
    }
}

/// Fixed output encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub video_codec: String,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub width: u32,
    pub height: u32,
    pub audio_sample_rate: u32,
    pub extension: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            width: 1080,
            height: 1920,
            audio_sample_rate: 44100,
            extension: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub tier: IntensityTier,
    pub enabled: EnabledCategories,
    pub encoder: EncoderSettings,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            tier: IntensityTier::default(),
            enabled: EnabledCategories::default(),
            encoder: EncoderSettings::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GenerationConfig {
    pub fn new(tier: IntensityTier) -> Self {
        Self {
            tier,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: EnabledCategories) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderSettings) -> Self {
        self.encoder = encoder;
        self
    }

    /// Zero is treated as one worker.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
