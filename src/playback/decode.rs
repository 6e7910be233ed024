//! Stem decoding with symphonia and rate conversion with rubato.
//!
//! Stems are short enough to decode whole: the engine keeps one interleaved
//! stereo buffer at the output device rate and plays from it.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::engine::PlaybackError;

/// Interleaved stereo f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Convert to `target_rate`, returning `self` unchanged when the rates match.
    pub fn resample(self, target_rate: u32) -> Result<Self, PlaybackError> {
        if self.sample_rate == target_rate || self.frames() == 0 {
            return Ok(Self {
                sample_rate: target_rate,
                ..self
            });
        }
        debug!("Resampling from {}Hz to {}Hz", self.sample_rate, target_rate);

        let frames = self.frames();
        let planar: Vec<Vec<f32>> = (0..2)
            .map(|channel| self.samples.iter().skip(channel).step_by(2).copied().collect())
            .collect();

        let mut resampler = FastFixedIn::<f32>::new(
            f64::from(target_rate) / f64::from(self.sample_rate),
            1.0,
            PolynomialDegree::Septic,
            frames,
            2,
        )
        .map_err(|e| PlaybackError::Decode(format!("Failed to create resampler: {}", e)))?;
        let output = resampler
            .process(&planar, None)
            .map_err(|e| PlaybackError::Decode(format!("Resampling failed: {}", e)))?;

        let (left, right) = (&output[0], &output[1]);
        let samples = left
            .iter()
            .zip(right.iter())
            .flat_map(|(&l, &r)| [l, r])
            .collect();
        Ok(Self {
            samples,
            sample_rate: target_rate,
        })
    }
}

/// File extension of the last path segment of `url`, ignoring any query.
pub fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

/// Decode a complete audio file held in memory.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, PlaybackError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlaybackError::Decode(format!("Unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PlaybackError::Decode("Unknown sample rate".to_string()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(PlaybackError::Decode(e.to_string())),
        };

        let needed = decoded.capacity() * decoded.spec().channels.count();
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let samples = to_stereo(&interleaved, channels);
    debug!(
        "Decoded {} frames at {}Hz from {} channels",
        samples.len() / 2,
        sample_rate,
        channels
    );
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Mono is duplicated; anything wider keeps its first two channels.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV with a rising ramp.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let data_len = frames as u32 * u32::from(channels) * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..frames {
            let value = (frame % 1000) as i16 * 16;
            for _ in 0..channels {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_decode_mono_wav_as_stereo() {
        let audio = decode(wav_bytes(8000, 1, 4000), Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.frames(), 4000);
        assert_eq!(audio.duration_secs(), 0.5);
        assert_eq!(audio.samples[2], audio.samples[3]);
        assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode(b"definitely not audio".to_vec(), None);
        assert!(matches!(result, Err(PlaybackError::Decode(_))));
    }

    #[test]
    fn test_resample_changes_rate_and_length() {
        let audio = decode(wav_bytes(8000, 2, 8000), Some("wav")).unwrap();
        let resampled = audio.resample(16000).unwrap();
        assert_eq!(resampled.sample_rate, 16000);
        let frames = resampled.frames() as i64;
        assert!((frames - 16000).abs() < 1600, "got {} frames", frames);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let audio = decode(wav_bytes(44100, 2, 100), Some("wav")).unwrap();
        let resampled = audio.clone().resample(44100).unwrap();
        assert_eq!(resampled, audio);
    }

    #[test]
    fn test_to_stereo_drops_extra_channels() {
        assert_eq!(to_stereo(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3), vec![0.1, 0.2, 0.4, 0.5]);
        assert_eq!(to_stereo(&[0.5], 1), vec![0.5, 0.5]);
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("http://h/audio/abc/track_vocals.wav"), Some("wav"));
        assert_eq!(extension_hint("http://h/audio/abc/x.flac?token=1"), Some("flac"));
        assert_eq!(extension_hint("http://h/audio/abc/noext"), None);
    }
}
