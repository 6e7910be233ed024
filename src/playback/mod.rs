//! Playback of the stems produced by a completed job.

mod audio;
mod decode;
mod engine;
mod output;
mod player;

pub use audio::{AudioEngine, DEFAULT_REPORT_INTERVAL};
pub use decode::{decode, DecodedAudio};
#[cfg(feature = "mock")]
pub use engine::MockPlaybackEngine;
pub use engine::{PlaybackCommand, PlaybackEngine, PlaybackError, PlaybackEvent, RecordingEngine};
pub use player::{format_time, track_subtitle, track_title, Player, TrackProgress};
