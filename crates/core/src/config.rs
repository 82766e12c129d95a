use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    cache::get_config_path,
    captions::CueTiming,
    error::{Result, ShortformError},
    media::MediaSettings,
    title::TitleSettings,
    transcribe::TranscriptionSettings,
    types::{ModelSize, RunConfig},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    pub timing: CueTiming,
}

/// Everything a run can be tuned with, as read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunConfig,
    pub captions: CaptionSettings,
    pub media: MediaSettings,
    pub transcription: TranscriptionSettings,
    pub title: TitleSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// Missing fields use default values. Invalid TOML and out-of-range
    /// values are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ShortformError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// - SHORTFORM_FFMPEG → media.ffmpeg
    /// - SHORTFORM_MODEL → transcription.model
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ffmpeg) = std::env::var("SHORTFORM_FFMPEG")
            && !ffmpeg.is_empty()
        {
            self.media.ffmpeg = PathBuf::from(ffmpeg);
        }

        if let Ok(model) = std::env::var("SHORTFORM_MODEL")
            && !model.is_empty()
        {
            match parse_model(&model) {
                Some(model) => self.transcription.model = model,
                None => tracing::warn!(value = %model, "Ignoring unknown SHORTFORM_MODEL"),
            }
        }

        self
    }

    pub fn default_path() -> PathBuf {
        get_config_path()
    }

    fn validate(&self) -> Result<()> {
        let media = &self.media;
        if media.width == 0 || media.height == 0 {
            return Err(ShortformError::InvalidConfig {
                reason: format!("frame size {}x{} must be non-zero", media.width, media.height),
            });
        }
        if !(media.title_seconds.is_finite() && media.title_seconds > 0.0) {
            return Err(ShortformError::InvalidConfig {
                reason: format!("media.title_seconds must be positive, got {}", media.title_seconds),
            });
        }
        if media.stage_timeout_secs == Some(0) || self.transcription.timeout_secs == Some(0) {
            return Err(ShortformError::InvalidConfig {
                reason: "timeouts must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_model(name: &str) -> Option<ModelSize> {
    match name.trim().to_lowercase().as_str() {
        "tiny" => Some(ModelSize::Tiny),
        "base" => Some(ModelSize::Base),
        "small" => Some(ModelSize::Small),
        "medium" => Some(ModelSize::Medium),
        "large" => Some(ModelSize::Large),
        _ => None,
    }
}
