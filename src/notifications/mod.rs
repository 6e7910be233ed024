//! Transient user notifications

mod center;
mod models;

pub use center::{NotificationCenter, DEFAULT_NOTIFICATION_TTL};
pub use models::{Notification, NotificationKind};
