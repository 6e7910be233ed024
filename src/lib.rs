//! Stem Separator Client Library
//!
//! Job lifecycle and progress tracking for a remote stem-separation backend.
//! The binary in `main.rs` is a thin command line front end over these modules.

pub mod api;
pub mod config;
pub mod intake;
pub mod job;
pub mod notifications;
pub mod playback;
pub mod push;
pub mod session;

// Re-export commonly used types for convenience
pub use api::{SeparatorApi, SeparatorClient};
pub use config::AppConfig;
pub use job::{Effect, JobPhase, Msg, Session};
pub use push::{PushChannel, PushHandle};
pub use session::SessionDriver;
