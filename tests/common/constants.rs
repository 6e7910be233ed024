//! Shared constants for end-to-end tests
//!
//! Values the mock backend answers with. Tests assert against these instead
//! of repeating literals.

// ============================================================================
// Jobs
// ============================================================================

/// Job id handed out by `POST /upload`.
pub const JOB_ID: &str = "abc";

/// Stem of the fixture file the mock backend has results for.
pub const FILE_STEM: &str = "track";

/// Archive path reported in `processing_complete`.
pub const ARCHIVE_PATH: &str = "/download/abc_stems.zip";

/// Bytes served for the result archive.
pub const ARCHIVE_BYTES: &[u8] = b"PK\x03\x04mock-archive";

// ============================================================================
// Device
// ============================================================================

pub const DEVICE_NAME: &str = "Mock GPU";

// ============================================================================
// Visualization
// ============================================================================

/// A 1x1 PNG encoded as a data URL.
pub const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

/// Error returned for the `analysis` visualization.
pub const ANALYSIS_ERROR: &str = "Analysis not available for this file";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to accept connections
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Maximum time a test waits for an expected event
pub const EVENT_TIMEOUT_MS: u64 = 5000;
