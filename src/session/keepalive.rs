//! Periodic keep-alive ticker bound to the Processing phase.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::job::Msg;

/// Posts `Msg::KeepAliveTick` every `interval` until cancelled.
///
/// The first tick fires one full interval after `start`.
pub struct KeepAlive {
    interval: Duration,
    parent: CancellationToken,
    token: Option<CancellationToken>,
}

impl KeepAlive {
    pub fn new(interval: Duration, parent: CancellationToken) -> Self {
        Self {
            interval,
            parent,
            token: None,
        }
    }

    /// Start ticking, replacing any running ticker.
    pub fn start(&mut self, tx: mpsc::UnboundedSender<Msg>) {
        self.cancel();
        let token = self.parent.child_token();
        self.token = Some(token.clone());

        let period = self.interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if tx.send(Msg::KeepAliveTick).is_err() {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
            debug!("Keep-alive ticker stopped");
        });
        debug!("Keep-alive ticker started ({}ms)", period.as_millis());
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut keepalive = KeepAlive::new(Duration::from_millis(20), CancellationToken::new());
        keepalive.start(tx);
        assert!(keepalive.is_active());

        tokio::time::sleep(Duration::from_millis(110)).await;
        let mut ticks = 0;
        while let Ok(msg) = rx.try_recv() {
            assert!(matches!(msg, Msg::KeepAliveTick));
            ticks += 1;
        }
        assert!(ticks >= 2, "expected at least two ticks, got {}", ticks);

        keepalive.cancel();
        assert!(!keepalive.is_active());
        tokio::time::sleep(Duration::from_millis(20)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_tick_before_first_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut keepalive = KeepAlive::new(Duration::from_secs(30), CancellationToken::new());
        keepalive.start(tx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_ticker() {
        let parent = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut keepalive = KeepAlive::new(Duration::from_millis(20), parent.clone());
        keepalive.start(tx);

        parent.cancel();
        assert!(!keepalive.is_active());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());
    }
}
