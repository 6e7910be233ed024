use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Connection settings (can override CLI)
    pub server_url: Option<String>,
    pub ws_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub reconnect_delay_sec: Option<u64>,

    // Session timing
    pub keepalive_interval_sec: Option<u64>,
    pub handoff_delay_ms: Option<u64>,
    pub notification_ttl_sec: Option<u64>,

    /// Default settings for submitted jobs.
    pub processing: Option<ProcessingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Separation model: "htdemucs", "htdemucs_ft", "htdemucs_6s", "hdemucs_mmi"
    pub model: Option<String>,
    /// Output format: "wav", "mp3", "flac"
    pub format: Option<String>,
    /// Quality: "low", "medium", "high"
    pub quality: Option<String>,
    pub volume_boost: Option<f32>,
    pub noise_reduction: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
