//! Async event loop around the `Session` reducer.
//!
//! Messages from the user, the push channel, timers and finished HTTP calls
//! share one unbounded queue and are reduced strictly in arrival order.
//! Reports from the playback engine arrive on a second queue and are
//! reduced as `Msg::TimeUpdate` and `Msg::TrackEnded`. Each
//! effect returned by the reducer is executed here; anything that waits runs
//! in a spawned task that posts its result back onto the queue.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::keepalive::KeepAlive;
use crate::api::SeparatorApi;
use crate::config::AppConfig;
use crate::job::{Effect, Msg, Session};
use crate::notifications::NotificationCenter;
use crate::playback::{PlaybackEngine, PlaybackEvent};
use crate::push::{ClientMessage, PushSink};

pub struct SessionDriver {
    session: Session,
    notifications: NotificationCenter,
    api: Arc<dyn SeparatorApi>,
    push: Arc<dyn PushSink>,
    engine: Box<dyn PlaybackEngine>,
    keepalive: KeepAlive,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    shutdown: CancellationToken,
}

impl SessionDriver {
    pub fn new(
        config: &AppConfig,
        api: Arc<dyn SeparatorApi>,
        push: Arc<dyn PushSink>,
        mut engine: Box<dyn PlaybackEngine>,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        engine.attach(playback_tx);
        Self {
            session: Session::new(config.processing.clone(), config.handoff_delay),
            notifications: NotificationCenter::new(config.notification_ttl),
            api,
            push,
            engine,
            keepalive: KeepAlive::new(config.keepalive_interval, shutdown.clone()),
            tx,
            rx,
            playback_rx,
            shutdown,
        }
    }

    /// Sender for posting messages from other tasks (push channel, input readers).
    pub fn sender(&self) -> mpsc::UnboundedSender<Msg> {
        self.tx.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationCenter {
        &mut self.notifications
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive.is_active()
    }

    /// Reduce a message immediately and execute its effects.
    pub fn dispatch(&mut self, msg: Msg) {
        let effects = self.session.update(msg);
        for effect in effects {
            self.execute(effect);
        }
    }

    /// Wait for the next queued message and dispatch it.
    ///
    /// Returns false once shutdown has been requested.
    pub async fn step(&mut self) -> bool {
        let msg = tokio::select! {
            msg = self.rx.recv() => msg,
            Some(event) = self.playback_rx.recv() => Some(Msg::from(event)),
            _ = self.shutdown.cancelled() => None,
        };
        let Some(msg) = msg else {
            return false;
        };
        self.dispatch(msg);
        self.notifications.prune_expired(Instant::now());
        true
    }

    /// Step until `done` holds for the session, returning false on shutdown.
    pub async fn run_until(&mut self, mut done: impl FnMut(&Session) -> bool) -> bool {
        while !done(&self.session) {
            if !self.step().await {
                return false;
            }
        }
        true
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Notify { kind, message } => {
                self.notifications.push(kind, message);
            }
            Effect::Upload { cycle, files } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.upload(&files).await.map(|response| response.job_id);
                    Msg::UploadFinished { cycle, result }
                });
            }
            Effect::JoinJob { job_id } => {
                debug!("Joining job {}", job_id);
                if let Err(e) = self.push.send(ClientMessage::join_job(&job_id)) {
                    warn!("Failed to join job {}: {}", job_id, e);
                }
            }
            Effect::StartProcess { job_id, settings } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.start_processing(&job_id, &settings).await;
                    Msg::ProcessStarted { job_id, result }
                });
            }
            Effect::StopJob { job_id } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.stop(&job_id).await;
                    Msg::StopFinished { job_id, result }
                });
            }
            Effect::StartKeepAlive => self.keepalive.start(self.tx.clone()),
            Effect::CancelKeepAlive => self.keepalive.cancel(),
            Effect::SendPing => {
                if !self.push.is_connected() {
                    debug!("Skipping keep-alive ping while disconnected");
                } else if let Err(e) = self.push.send(ClientMessage::ping()) {
                    warn!("Failed to send keep-alive ping: {}", e);
                }
            }
            Effect::ScheduleHandoff { job_id, delay } => {
                let tx = self.tx.clone();
                let shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let _ = tx.send(Msg::HandoffElapsed { job_id });
                        }
                        _ = shutdown.cancelled() => {}
                    }
                });
            }
            Effect::FetchStems { job_id, file_stem } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.stems(&job_id, &file_stem).await;
                    Msg::StemsLoaded { job_id, result }
                });
            }
            Effect::FetchDeviceStatus => {
                let api = self.api.clone();
                self.spawn(async move { Msg::DeviceDetected(api.device_status().await) });
            }
            Effect::Playback(command) => {
                if let Err(e) = self.engine.apply(&command) {
                    warn!("Playback command {:?} failed: {}", command, e);
                }
            }
        }
    }

    /// Run `task` in the background and queue the message it resolves to.
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = Msg> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let msg = task.await;
            if tx.send(msg).is_err() {
                debug!("Session dropped before a background result arrived");
            }
        });
    }
}
