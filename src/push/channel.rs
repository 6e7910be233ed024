//! WebSocket push channel client.
//!
//! Keeps a connection to the backend's push endpoint, forwarding decoded
//! server events in arrival order and writing queued client messages.
//! Reconnects after a fixed delay whenever the connection drops.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, PushEvent, ServerEvent};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    Transport(String),

    #[error("WebSocket closed by server")]
    ClosedByServer,

    /// The channel task has stopped and no longer accepts messages.
    #[error("Push channel is not running")]
    ChannelClosed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outgoing side of the push channel as seen by the session.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait PushSink: Send + Sync {
    /// Queue a message. Messages queued while disconnected go out after reconnecting.
    fn send(&self, message: ClientMessage) -> Result<(), PushError>;

    fn is_connected(&self) -> bool;
}

/// Cloneable handle used to write to a running `PushChannel`.
#[derive(Clone)]
pub struct PushHandle {
    outgoing_tx: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
}

impl PushSink for PushHandle {
    fn send(&self, message: ClientMessage) -> Result<(), PushError> {
        self.outgoing_tx
            .send(message)
            .map_err(|_| PushError::ChannelClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct PushChannel {
    ws_url: String,
    reconnect_delay: Duration,
    outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
    outgoing_open: bool,
    connected: Arc<AtomicBool>,
    ever_connected: bool,
}

impl PushChannel {
    pub fn new(ws_url: impl Into<String>, reconnect_delay: Duration) -> (Self, PushHandle) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let channel = Self {
            ws_url: ws_url.into(),
            reconnect_delay,
            outgoing_rx,
            outgoing_open: true,
            connected: connected.clone(),
            ever_connected: false,
        };
        (
            channel,
            PushHandle {
                outgoing_tx,
                connected,
            },
        )
    }

    /// Main loop - call from a spawned task.
    ///
    /// Events are converted into the receiver's message type so that they
    /// share one ordered queue with everything else the session consumes.
    /// Returns when `shutdown` fires or the receiver is dropped.
    pub async fn run<T>(mut self, events: mpsc::UnboundedSender<T>, shutdown: CancellationToken)
    where
        T: From<PushEvent> + Send,
    {
        info!(
            "Push channel starting ({}, reconnect_delay={}ms)",
            self.ws_url,
            self.reconnect_delay.as_millis()
        );

        loop {
            let result = tokio::select! {
                result = self.run_connection(&events) => result,
                _ = shutdown.cancelled() => {
                    info!("Push channel shutting down");
                    break;
                }
            };

            let was_connected = self.connected.swap(false, Ordering::SeqCst);
            if let Err(e) = result {
                warn!(
                    "Push channel disconnected: {}, reconnecting in {}ms",
                    e,
                    self.reconnect_delay.as_millis()
                );
            }
            if events.is_closed() {
                debug!("Push event receiver dropped");
                break;
            }
            if was_connected && events.send(PushEvent::TransportDisconnected.into()).is_err() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Push channel shutting down during reconnect wait");
                    break;
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("Push channel stopped");
    }

    /// Connect once and pump frames until the connection ends.
    async fn run_connection<T>(&mut self, events: &mpsc::UnboundedSender<T>) -> Result<(), PushError>
    where
        T: From<PushEvent> + Send,
    {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;

        self.connected.store(true, Ordering::SeqCst);
        let transport_event = if self.ever_connected {
            info!("Reconnected to push channel");
            PushEvent::TransportReconnected
        } else {
            info!("Connected to push channel");
            PushEvent::TransportConnected
        };
        self.ever_connected = true;
        if events.send(transport_event.into()).is_err() {
            return Ok(());
        }

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match ServerEvent::parse(&text) {
                        Ok(event) => {
                            debug!("Received push event: {:?}", event);
                            if events.send(PushEvent::Server(event).into()).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse push message: {} - {}", e, text.as_str());
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            return Err(PushError::Transport(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(PushError::ClosedByServer);
                    }
                    Some(Err(e)) => {
                        return Err(PushError::Transport(e.to_string()));
                    }
                    Some(Ok(_)) => {}
                },
                outgoing = self.outgoing_rx.recv(), if self.outgoing_open => match outgoing {
                    Some(message) => {
                        let text = serde_json::to_string(&message)?;
                        debug!("Sending push message: {}", text);
                        write
                            .send(Message::Text(text.into()))
                            .await
                            .map_err(|e| PushError::Transport(e.to_string()))?;
                    }
                    None => {
                        debug!("All push handles dropped, channel is receive-only");
                        self.outgoing_open = false;
                    }
                },
            }
        }
    }
}
