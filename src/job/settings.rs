//! Processing settings submitted with each job.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Allowed range of the volume boost multiplier.
pub const VOLUME_BOOST_RANGE: std::ops::RangeInclusive<f32> = 0.1..=5.0;

/// Separation model run by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum SeparationModel {
    #[default]
    #[serde(rename = "htdemucs")]
    #[value(name = "htdemucs")]
    Htdemucs,
    #[serde(rename = "htdemucs_ft")]
    #[value(name = "htdemucs_ft")]
    HtdemucsFt,
    #[serde(rename = "htdemucs_6s")]
    #[value(name = "htdemucs_6s")]
    Htdemucs6s,
    #[serde(rename = "hdemucs_mmi")]
    #[value(name = "hdemucs_mmi")]
    HdemucsMmi,
}

/// Display metadata for a separation model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub stems: &'static [&'static str],
}

const FOUR_STEMS: &[&str] = &["vocals", "drums", "bass", "other"];
const SIX_STEMS: &[&str] = &["vocals", "drums", "bass", "piano", "guitar", "other"];

impl SeparationModel {
    pub const ALL: [SeparationModel; 4] = [
        SeparationModel::Htdemucs,
        SeparationModel::HtdemucsFt,
        SeparationModel::Htdemucs6s,
        SeparationModel::HdemucsMmi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeparationModel::Htdemucs => "htdemucs",
            SeparationModel::HtdemucsFt => "htdemucs_ft",
            SeparationModel::Htdemucs6s => "htdemucs_6s",
            SeparationModel::HdemucsMmi => "hdemucs_mmi",
        }
    }

    /// Parse a model name, falling back to `htdemucs` for unknown names.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_else(|| {
                warn!("Unknown separation model {:?}, using htdemucs", name);
                SeparationModel::Htdemucs
            })
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            SeparationModel::Htdemucs => ModelInfo {
                name: "Hybrid Transformer Demucs",
                description: "Best overall quality with balanced performance.",
                stems: FOUR_STEMS,
            },
            SeparationModel::HtdemucsFt => ModelInfo {
                name: "Hybrid Transformer Demucs Fine-Tuned",
                description: "Fine-tuned for modern music with enhanced vocal separation.",
                stems: FOUR_STEMS,
            },
            SeparationModel::Htdemucs6s => ModelInfo {
                name: "Hybrid Transformer Demucs 6-Source",
                description: "Separates into 6 stems including piano and guitar.",
                stems: SIX_STEMS,
            },
            SeparationModel::HdemucsMmi => ModelInfo {
                name: "Hybrid Demucs MMI",
                description: "Faster processing with good quality.",
                stems: FOUR_STEMS,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Wav,
    Mp3,
    Flac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Volume boost must be between {min} and {max}, got {value}")]
    VolumeBoostOutOfRange { value: f32, min: f32, max: f32 },
}

/// Settings object sent to `POST /process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    pub model: SeparationModel,
    pub format: OutputFormat,
    pub quality: Quality,
    /// Linear gain applied to every stem, 1.0 leaves levels unchanged.
    pub volume_boost: f32,
    pub noise_reduction: bool,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            model: SeparationModel::default(),
            format: OutputFormat::default(),
            quality: Quality::default(),
            volume_boost: 1.0,
            noise_reduction: false,
        }
    }
}

impl ProcessingSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.volume_boost.is_finite() || !VOLUME_BOOST_RANGE.contains(&self.volume_boost) {
            return Err(SettingsError::VolumeBoostOutOfRange {
                value: self.volume_boost,
                min: *VOLUME_BOOST_RANGE.start(),
                max: *VOLUME_BOOST_RANGE.end(),
            });
        }
        Ok(())
    }

    /// Volume boost as displayed next to the slider, e.g. "1.5x".
    pub fn volume_boost_label(&self) -> String {
        format!("{:.1}x", self.volume_boost)
    }
}
