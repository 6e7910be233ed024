//! On-disk fixtures for end-to-end tests

use stem_separator_client::intake::AudioFile;
use tempfile::TempDir;

/// Minimal RIFF/WAVE header followed by silence.
fn wav_bytes(samples: usize) -> Vec<u8> {
    let data_len = (samples * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + samples * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&44_100u32.to_le_bytes());
    bytes.extend_from_slice(&88_200u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + samples * 2, 0);
    bytes
}

/// Writes `names` as small WAV files into a fresh temp dir.
///
/// The dir must outlive the returned files.
pub fn create_audio_files(names: &[&str]) -> (TempDir, Vec<AudioFile>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let files = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let path = dir.path().join(name);
            std::fs::write(&path, wav_bytes(64 * (i + 1))).expect("Failed to write fixture");
            AudioFile::from_path(&path).expect("Failed to stat fixture")
        })
        .collect();
    (dir, files)
}
