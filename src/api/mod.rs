//! Separation backend HTTP API.
//!
//! `SeparatorApi` is the seam the session talks through; `SeparatorClient`
//! implements it over reqwest and adds the auxiliary endpoints used by the CLI.

mod client;
mod error;
mod types;

#[cfg(feature = "mock")]
pub use client::MockSeparatorApi;
pub use client::{SeparatorApi, SeparatorClient};
pub use error::ApiError;
pub use types::{
    DeviceStatusResponse, ProcessRequest, ShutdownOutcome, StemTrack, StemsResponse,
    UploadResponse, VisualizationImage, VisualizationKind, VisualizationResponse,
};
