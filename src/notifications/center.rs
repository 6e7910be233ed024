//! Stack of timed notifications.
//!
//! Notifications are appended in order and stay active until their time to
//! live elapses or they are dismissed. Several can be visible at once.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

use super::models::{Notification, NotificationKind};

/// How long a notification stays visible.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(5);

pub struct NotificationCenter {
    ttl: Duration,
    next_id: u64,
    active: VecDeque<Notification>,
    /// Highest id handed out by `drain_unseen`.
    last_seen: u64,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: 1,
            active: VecDeque::new(),
            last_seen: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Push a notification stamped with the current time.
    pub fn push(&mut self, kind: NotificationKind, message: impl Into<String>) -> u64 {
        self.push_at(kind, message, Instant::now())
    }

    pub fn push_at(
        &mut self,
        kind: NotificationKind,
        message: impl Into<String>,
        now: Instant,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let notification = Notification {
            id,
            kind,
            message: message.into(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        debug!(
            "Notification #{} [{}]: {}",
            id,
            kind.as_str(),
            notification.message
        );
        self.active.push_back(notification);
        id
    }

    /// Remove a notification before it expires. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        self.active.len() != before
    }

    /// Drop every notification whose time to live has elapsed and return them.
    pub fn prune_expired(&mut self, now: Instant) -> Vec<Notification> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.active.drain(..).partition(|n| n.is_expired(now));
        self.active = kept.into();
        expired
    }

    pub fn active(&self) -> impl Iterator<Item = &Notification> {
        self.active.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Notifications pushed since the previous call, oldest first.
    ///
    /// Renderers call this after each dispatched message to print what is new.
    pub fn drain_unseen(&mut self) -> Vec<Notification> {
        let unseen: Vec<Notification> = self
            .active
            .iter()
            .filter(|n| n.id > self.last_seen)
            .cloned()
            .collect();
        if let Some(last) = unseen.last() {
            self.last_seen = last.id;
        }
        unseen
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.active.back()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TTL)
    }
}
