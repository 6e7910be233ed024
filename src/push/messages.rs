//! Push channel message types.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`. Payloads
//! are carried as JSON values and decoded per message type.

use serde::{Deserialize, Serialize};

use crate::job::{CompletionSummary, ProgressSnapshot};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ClientMessage {
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Subscribe to the updates of one job.
    pub fn join_job(job_id: &str) -> Self {
        Self::new(msg_types::JOIN_JOB, job::JoinJob {
            job_id: job_id.to_string(),
        })
    }

    pub fn ping() -> Self {
        Self::empty(msg_types::PING)
    }
}

pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client subscription to a job's updates.
    pub const JOIN_JOB: &str = "join_job";
    /// Server acknowledgement of `join_job`.
    pub const JOINED_JOB: &str = "joined_job";
    /// Client keep-alive.
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const PROCESSING_UPDATE: &str = "processing_update";
    pub const PROCESSING_COMPLETE: &str = "processing_complete";
    pub const PROCESSING_ERROR: &str = "processing_error";
}

/// Job scoped payloads.
pub mod job {
    use serde::{Deserialize, Serialize};

    use crate::job::{CompletionSummary, ProgressSnapshot};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct JoinJob {
        pub job_id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Connected {
        #[serde(default)]
        pub status: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ProcessingUpdate {
        pub job_id: String,
        #[serde(flatten)]
        pub snapshot: ProgressSnapshot,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ProcessingComplete {
        pub job_id: String,
        #[serde(default)]
        pub total_files: u32,
        #[serde(default)]
        pub total_time: String,
        pub download_url: String,
        /// Per-file result records, passed through untouched.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub results: Vec<serde_json::Value>,
    }

    impl ProcessingComplete {
        pub fn summary(&self) -> CompletionSummary {
            CompletionSummary {
                total_files: self.total_files,
                total_time: self.total_time.clone(),
                download_url: self.download_url.clone(),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ProcessingError {
        pub job_id: String,
        pub error: String,
    }
}

/// Decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(job::Connected),
    JoinedJob(job::JoinJob),
    Pong,
    ProcessingUpdate(job::ProcessingUpdate),
    ProcessingComplete(job::ProcessingComplete),
    ProcessingError(job::ProcessingError),
    /// A message type this client does not handle.
    Unknown(String),
}

impl ServerEvent {
    pub fn from_message(message: ServerMessage) -> Result<Self, serde_json::Error> {
        let ServerMessage { msg_type, payload } = message;
        let event = match msg_type.as_str() {
            msg_types::CONNECTED => ServerEvent::Connected(
                serde_json::from_value(payload).unwrap_or(job::Connected { status: None }),
            ),
            msg_types::JOINED_JOB => ServerEvent::JoinedJob(serde_json::from_value(payload)?),
            msg_types::PONG => ServerEvent::Pong,
            msg_types::PROCESSING_UPDATE => {
                ServerEvent::ProcessingUpdate(serde_json::from_value(payload)?)
            }
            msg_types::PROCESSING_COMPLETE => {
                ServerEvent::ProcessingComplete(serde_json::from_value(payload)?)
            }
            msg_types::PROCESSING_ERROR => {
                ServerEvent::ProcessingError(serde_json::from_value(payload)?)
            }
            _ => ServerEvent::Unknown(msg_type),
        };
        Ok(event)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_message(serde_json::from_str(text)?)
    }

    /// Job the event is scoped to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ServerEvent::JoinedJob(p) => Some(&p.job_id),
            ServerEvent::ProcessingUpdate(p) => Some(&p.job_id),
            ServerEvent::ProcessingComplete(p) => Some(&p.job_id),
            ServerEvent::ProcessingError(p) => Some(&p.job_id),
            _ => None,
        }
    }
}

/// Everything the push channel delivers to the session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// First successful connection.
    TransportConnected,
    TransportDisconnected,
    /// Connection re-established after a drop.
    TransportReconnected,
    Server(ServerEvent),
}

impl PushEvent {
    pub fn progress(job_id: &str, snapshot: ProgressSnapshot) -> Self {
        PushEvent::Server(ServerEvent::ProcessingUpdate(job::ProcessingUpdate {
            job_id: job_id.to_string(),
            snapshot,
        }))
    }

    pub fn complete(job_id: &str, summary: CompletionSummary) -> Self {
        PushEvent::Server(ServerEvent::ProcessingComplete(job::ProcessingComplete {
            job_id: job_id.to_string(),
            total_files: summary.total_files,
            total_time: summary.total_time,
            download_url: summary.download_url,
            results: Vec::new(),
        }))
    }

    pub fn error(job_id: &str, error: impl Into<String>) -> Self {
        PushEvent::Server(ServerEvent::ProcessingError(job::ProcessingError {
            job_id: job_id.to_string(),
            error: error.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_job_frame() {
        let json = serde_json::to_value(ClientMessage::join_job("abc")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "join_job", "payload": {"job_id": "abc"}})
        );
    }

    #[test]
    fn test_ping_frame() {
        let json = serde_json::to_value(ClientMessage::ping()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ping", "payload": null}));
    }

    #[test]
    fn test_parse_processing_update() {
        let event = ServerEvent::parse(
            r#"{"type": "processing_update", "payload": {"job_id": "abc", "overall_progress": 42}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ProcessingUpdate(update) => {
                assert_eq!(update.job_id, "abc");
                assert_eq!(update.snapshot.overall_progress, Some(42.0));
                assert!(update.snapshot.file_progress.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_processing_complete() {
        let event = ServerEvent::parse(
            r#"{"type": "processing_complete", "payload": {"job_id": "abc", "total_files": 1, "total_time": "3s", "download_url": "/d/abc", "results": [{"file": "track.wav"}]}}"#,
        )
        .unwrap();
        assert_eq!(event.job_id(), Some("abc"));
        let ServerEvent::ProcessingComplete(complete) = event else {
            panic!("expected completion");
        };
        assert_eq!(
            complete.summary(),
            CompletionSummary {
                total_files: 1,
                total_time: "3s".to_string(),
                download_url: "/d/abc".to_string(),
            }
        );
        assert_eq!(complete.results.len(), 1);
    }

    #[test]
    fn test_parse_pong_without_payload() {
        assert_eq!(ServerEvent::parse(r#"{"type": "pong"}"#).unwrap(), ServerEvent::Pong);
    }

    #[test]
    fn test_parse_connected_with_any_payload() {
        let event = ServerEvent::parse(
            r#"{"type": "connected", "payload": {"status": "Connected to server"}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::Connected(_)));
        assert!(matches!(
            ServerEvent::parse(r#"{"type": "connected"}"#).unwrap(),
            ServerEvent::Connected(_)
        ));
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let event = ServerEvent::parse(r#"{"type": "queue_position", "payload": {}}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown("queue_position".to_string()));
        assert_eq!(event.job_id(), None);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(ServerEvent::parse(r#"{"type": "processing_error", "payload": {}}"#).is_err());
        assert!(ServerEvent::parse("not json").is_err());
    }
}
