//! Job submission and progress synchronization.

mod machine;
mod models;
mod settings;

pub use machine::{Effect, Msg, Session, DEFAULT_HANDOFF_DELAY};
pub use models::{
    CompletionSummary, DeviceStatus, Job, JobPhase, JobStatus, ProgressDisplay, ProgressSnapshot,
};
pub use settings::{
    ModelInfo, OutputFormat, ProcessingSettings, Quality, SeparationModel, SettingsError,
    VOLUME_BOOST_RANGE,
};
