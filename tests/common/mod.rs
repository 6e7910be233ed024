//! Common test infrastructure
//!
//! A mock separation backend (HTTP routes plus the push WebSocket) and the
//! fixtures the end-to-end tests share. Tests should only import from this
//! module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, JOB_ID};
//!
//! #[tokio::test]
//! async fn test_stop() {
//!     let server = TestServer::spawn().await;
//!     let client = server.client();
//!     client.stop(JOB_ID).await.unwrap();
//!     assert_eq!(server.stopped_jobs(), vec![JOB_ID.to_string()]);
//! }
//! ```

mod constants;
mod fixtures;
mod server;

pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::create_audio_files;
#[allow(unused_imports)]
pub use server::{ReceivedUpload, TestServer};
