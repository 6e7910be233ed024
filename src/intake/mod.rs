//! Local audio file intake.
//!
//! Validates candidate files against the supported audio formats and keeps
//! the ordered, deduplicated set that will be submitted as one job.

mod file_set;

pub use file_set::{AddOutcome, UploadedFileSet};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Media subtypes accepted when a file declares its media type.
const ACCEPTED_MEDIA_SUBTYPES: [&str; 7] = ["wav", "mp3", "mpeg", "flac", "ogg", "m4a", "aac"];

/// File name extensions accepted regardless of the declared media type.
const ACCEPTED_EXTENSIONS: [&str; 6] = [".wav", ".mp3", ".flac", ".ogg", ".m4a", ".aac"];

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a regular file: {0:?}")]
    NotAFile(PathBuf),
}

/// A local file selected for separation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    /// File name as sent to the backend.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Declared media type, e.g. "audio/mpeg".
    pub media_type: Option<String>,
}

impl AudioFile {
    pub fn new(path: impl Into<PathBuf>, size: u64, media_type: Option<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            size,
            media_type,
        }
    }

    /// Stat a file on disk and sniff its media type from the content.
    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let metadata = std::fs::metadata(path).map_err(|source| IntakeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(IntakeError::NotAFile(path.to_path_buf()));
        }

        let media_type = infer::get_from_path(path)
            .map_err(|source| IntakeError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .map(|kind| kind.mime_type().to_string());

        Ok(Self::new(path, metadata.len(), media_type))
    }

    /// True if the declared media type or the file extension names a supported format.
    pub fn is_supported_audio(&self) -> bool {
        let by_type = self.media_type.as_deref().is_some_and(|media_type| {
            let media_type = media_type.to_ascii_lowercase();
            ACCEPTED_MEDIA_SUBTYPES
                .iter()
                .any(|subtype| media_type.contains(subtype))
        });
        let lower_name = self.name.to_lowercase();
        by_type
            || ACCEPTED_EXTENSIONS
                .iter()
                .any(|ext| lower_name.ends_with(ext))
    }

    /// Name up to the first dot; the backend keys per-file outputs on it.
    pub fn stem(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    fn dedupe_key(&self) -> (&str, u64) {
        (&self.name, self.size)
    }
}

/// Human readable byte count: "0 Bytes", "512 Bytes", "1.5 KB", "2 MB".
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
