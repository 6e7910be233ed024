mod file_config;

pub use file_config::{FileConfig, ProcessingConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::time::Duration;
use tracing::warn;

use crate::job::{OutputFormat, ProcessingSettings, Quality, SeparationModel};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 300;
pub const DEFAULT_KEEPALIVE_INTERVAL_SEC: u64 = 30;
pub const DEFAULT_HANDOFF_DELAY_MS: u64 = 500;
pub const DEFAULT_NOTIFICATION_TTL_SEC: u64 = 5;
pub const DEFAULT_RECONNECT_DELAY_SEC: u64 = 2;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub server_url: String,
    pub ws_url: Option<String>,
    pub request_timeout_sec: u64,
    pub reconnect_delay_sec: u64,
    pub keepalive_interval_sec: u64,
    pub handoff_delay_ms: u64,
    pub notification_ttl_sec: u64,
    pub processing: ProcessingSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_url: None,
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            reconnect_delay_sec: DEFAULT_RECONNECT_DELAY_SEC,
            keepalive_interval_sec: DEFAULT_KEEPALIVE_INTERVAL_SEC,
            handoff_delay_ms: DEFAULT_HANDOFF_DELAY_MS,
            notification_ttl_sec: DEFAULT_NOTIFICATION_TTL_SEC,
            processing: ProcessingSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
    pub handoff_delay: Duration,
    pub notification_ttl: Duration,
    pub processing: ProcessingSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let server_url = file
            .server_url
            .unwrap_or_else(|| cli.server_url.clone())
            .trim_end_matches('/')
            .to_string();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            bail!("server_url must be an http(s) URL, got {:?}", server_url);
        }

        let ws_url = match file.ws_url.or_else(|| cli.ws_url.clone()) {
            Some(url) => {
                if !url.starts_with("ws://") && !url.starts_with("wss://") {
                    bail!("ws_url must be a ws(s) URL, got {:?}", url);
                }
                url
            }
            None => derive_ws_url(&server_url)?,
        };

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        let reconnect_delay_sec = file.reconnect_delay_sec.unwrap_or(cli.reconnect_delay_sec);
        let keepalive_interval_sec = file
            .keepalive_interval_sec
            .unwrap_or(cli.keepalive_interval_sec);
        let handoff_delay_ms = file.handoff_delay_ms.unwrap_or(cli.handoff_delay_ms);
        let notification_ttl_sec = file
            .notification_ttl_sec
            .unwrap_or(cli.notification_ttl_sec);

        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }
        if keepalive_interval_sec == 0 {
            bail!("keepalive_interval_sec must be greater than zero");
        }

        // Processing defaults - merge file config over CLI values
        let processing_file = file.processing.unwrap_or_default();
        let processing = ProcessingSettings {
            model: processing_file
                .model
                .map(|s| SeparationModel::from_name(&s))
                .unwrap_or(cli.processing.model),
            format: processing_file
                .format
                .and_then(|s| parse_value::<OutputFormat>("format", &s))
                .unwrap_or(cli.processing.format),
            quality: processing_file
                .quality
                .and_then(|s| parse_value::<Quality>("quality", &s))
                .unwrap_or(cli.processing.quality),
            volume_boost: processing_file
                .volume_boost
                .unwrap_or(cli.processing.volume_boost),
            noise_reduction: processing_file
                .noise_reduction
                .unwrap_or(cli.processing.noise_reduction),
        };
        processing.validate()?;

        Ok(Self {
            server_url,
            ws_url,
            request_timeout: Duration::from_secs(request_timeout_sec),
            reconnect_delay: Duration::from_secs(reconnect_delay_sec),
            keepalive_interval: Duration::from_secs(keepalive_interval_sec),
            handoff_delay: Duration::from_millis(handoff_delay_ms),
            notification_ttl: Duration::from_secs(notification_ttl_sec),
            processing,
        })
    }
}

/// Push endpoint on the same host: `http://host:5000/...` -> `ws://host:5000/ws`.
pub fn derive_ws_url(server_url: &str) -> Result<String> {
    let (scheme, rest) = if let Some(rest) = server_url.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        ("ws", rest)
    } else {
        bail!("Cannot derive push URL from {:?}", server_url);
    };
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        bail!("server_url has no host: {:?}", server_url);
    }
    Ok(format!("{}://{}/ws", scheme, host))
}

/// Parses a setting value using clap's ValueEnum trait, ignoring invalid values.
fn parse_value<T: ValueEnum>(field: &str, s: &str) -> Option<T> {
    match T::from_str(s, true) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid processing.{} value {:?}", field, s);
            None
        }
    }
}
