use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Instruction for the audio output, produced by `Player`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Replace the active source.
    Load { url: String },
    Play,
    Pause,
    Seek { position_secs: f64 },
    /// Linear volume in 0.0..=1.0.
    SetVolume { level: f64 },
}

/// Report from the audio output about the source it is playing.
///
/// `source` is the URL of the `Load` the report belongs to, so reports that
/// were in flight while another track got loaded can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Position {
        source: String,
        position_secs: f64,
        duration_secs: f64,
    },
    Ended {
        source: String,
    },
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No source loaded")]
    NoSource,

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Playback backend error: {0}")]
    Backend(String),
}

/// Audio output driven by playback commands.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait PlaybackEngine: Send {
    /// Route position and end-of-track reports to `events`.
    fn attach(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>);

    fn apply(&mut self, command: &PlaybackCommand) -> Result<(), PlaybackError>;
}

/// Engine without audio output that keeps every applied command. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    source: Option<String>,
    history: Vec<PlaybackCommand>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn history(&self) -> &[PlaybackCommand] {
        &self.history
    }
}

impl PlaybackEngine for RecordingEngine {
    fn attach(&mut self, _events: mpsc::UnboundedSender<PlaybackEvent>) {}

    fn apply(&mut self, command: &PlaybackCommand) -> Result<(), PlaybackError> {
        debug!("Playback command: {:?}", command);
        match command {
            PlaybackCommand::Load { url } => self.source = Some(url.clone()),
            PlaybackCommand::Play | PlaybackCommand::Seek { .. } if self.source.is_none() => {
                return Err(PlaybackError::NoSource);
            }
            _ => {}
        }
        self.history.push(command.clone());
        Ok(())
    }
}
