//! Job and progress data models

use serde::{Deserialize, Serialize};

use super::settings::ProcessingSettings;
use crate::intake::AudioFile;

/// Lifecycle phase of the current submission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Uploading,
    Processing,
    Complete,
    Error,
    Stopped,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Uploading => "uploading",
            JobPhase::Processing => "processing",
            JobPhase::Complete => "complete",
            JobPhase::Error => "error",
            JobPhase::Stopped => "stopped",
        }
    }

    /// A submission is in flight and controls are locked.
    pub fn is_busy(&self) -> bool {
        matches!(self, JobPhase::Uploading | JobPhase::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Complete | JobPhase::Error | JobPhase::Stopped)
    }
}

/// Server side status of a job as known locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Upload succeeded, processing not acknowledged yet.
    Submitted,
    Processing,
    Complete,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Open jobs still accept progress, completion and error events.
    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Processing)
    }
}

/// The single active job of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub files: Vec<AudioFile>,
    pub settings: ProcessingSettings,
    pub status: JobStatus,
}

impl Job {
    /// Name up to the first dot of the first submitted file.
    pub fn first_file_stem(&self) -> Option<&str> {
        self.files.first().map(|f| f.stem())
    }
}

/// Partial progress update. Absent fields leave the display unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Compute device reported by the backend, "cuda" or "cpu".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

/// Compute device indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Ready { gpu: bool },
    Active { gpu: bool },
    Error,
}

impl DeviceStatus {
    pub fn from_device_name(device: &str) -> Self {
        DeviceStatus::Active {
            gpu: device.eq_ignore_ascii_case("cuda"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceStatus::Unknown => "Detecting device...",
            DeviceStatus::Ready { gpu: true } => "GPU Ready",
            DeviceStatus::Ready { gpu: false } => "CPU Ready",
            DeviceStatus::Active { gpu: true } => "GPU Active",
            DeviceStatus::Active { gpu: false } => "CPU Active",
            DeviceStatus::Error => "Device Error",
        }
    }
}

/// Progress as currently displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressDisplay {
    pub status_text: String,
    pub overall_progress: f64,
    pub file_progress: f64,
    pub current_file: Option<String>,
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self {
            status_text: "Initializing...".to_string(),
            overall_progress: 0.0,
            file_progress: 0.0,
            current_file: None,
        }
    }
}

impl ProgressDisplay {
    /// Merge a snapshot field by field. Empty strings count as absent.
    pub fn merge(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(status) = snapshot.status.as_deref().filter(|s| !s.is_empty()) {
            self.status_text = status.to_string();
        }
        if let Some(overall) = snapshot.overall_progress {
            self.overall_progress = overall;
        }
        if let Some(file) = snapshot.file_progress {
            self.file_progress = file;
        }
        if let Some(current) = snapshot.current_file.as_deref().filter(|s| !s.is_empty()) {
            self.status_text = format!("Processing: {}", current);
            self.current_file = Some(current.to_string());
        }
    }

    pub fn overall_label(&self) -> String {
        format!("{}%", self.overall_progress.round())
    }

    pub fn file_label(&self) -> String {
        format!("{}%", self.file_progress.round())
    }
}

/// Result metadata captured when the active job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub total_files: u32,
    /// Wall time as reported by the backend, e.g. "01:05".
    pub total_time: String,
    pub download_url: String,
}
