//! Request and response bodies of the separation backend.

use base64::Engine;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::job::ProcessingSettings;

/// `GET /device-status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusResponse {
    pub cuda_available: bool,
    #[serde(default)]
    pub device_count: Option<u32>,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// `POST /upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: String,
    #[serde(default)]
    pub files_count: Option<usize>,
    /// Names under which the backend stored the files.
    #[serde(default)]
    pub files: Vec<String>,
}

/// `POST /process` body.
#[derive(Debug, Serialize)]
pub struct ProcessRequest<'a> {
    pub job_id: &'a str,
    pub settings: &'a ProcessingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StemsResponse {
    #[serde(default)]
    pub stems: Vec<StemTrack>,
}

/// One produced output of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemTrack {
    /// Role of the stem, e.g. "vocals" or "original".
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Waveforms,
    Spectrograms,
    Analysis,
}

impl VisualizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizationKind::Waveforms => "waveforms",
            VisualizationKind::Spectrograms => "spectrograms",
            VisualizationKind::Analysis => "analysis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VisualizationKind::Waveforms => "Shows amplitude over time for each separated stem",
            VisualizationKind::Spectrograms => {
                "Displays frequency content over time using color intensity"
            }
            VisualizationKind::Analysis => {
                "Compares frequency, energy, brightness, and percussiveness metrics"
            }
        }
    }
}

/// `GET /visualize/...` body, either an image data URL or an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisualizationResponse {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decoded visualization image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationImage {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl VisualizationImage {
    /// Decode a `data:<media type>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, ApiError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ApiError::InvalidResponse("image is not a data URL".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ApiError::InvalidResponse("data URL has no payload".to_string()))?;
        let media_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| ApiError::InvalidResponse("data URL is not base64".to_string()))?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ApiError::InvalidResponse(format!("bad base64 payload: {}", e)))?;

        Ok(Self {
            media_type: if media_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                media_type.to_string()
            },
            data,
        })
    }

    /// File extension for the media type, "png" for "image/png".
    pub fn extension(&self) -> &str {
        match self.media_type.split_once('/') {
            Some((_, "svg+xml")) => "svg",
            Some((_, "jpeg")) => "jpg",
            Some((_, subtype)) if !subtype.is_empty() => subtype,
            _ => "bin",
        }
    }
}

/// How a shutdown request ended. Both count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Acknowledged,
    /// The server dropped the connection while going down.
    ConnectionClosed,
}
