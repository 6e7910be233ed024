//! Notification data models

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Severity of a notification, used to pick its icon and color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Warning => "warning",
            NotificationKind::Info => "info",
        }
    }

    /// Icon name of the kind (Font Awesome naming, as the web front end used).
    pub fn icon(&self) -> &'static str {
        match self {
            NotificationKind::Success => "check-circle",
            NotificationKind::Error => "exclamation-circle",
            NotificationKind::Warning => "exclamation-triangle",
            NotificationKind::Info => "info-circle",
        }
    }

    /// Hex color of the kind.
    pub fn color(&self) -> &'static str {
        match self {
            NotificationKind::Success => "#4ecdc4",
            NotificationKind::Error => "#ff6b6b",
            NotificationKind::Warning => "#feca57",
            NotificationKind::Info => "#45b7d1",
        }
    }
}

/// A single toast-style notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl Notification {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}
