//! Sample output for `AudioEngine`.
//!
//! The engine and the output thread share one `PlaybackState`. The output
//! pulls frames from it through `render`. With the `audio-output` feature the
//! frames go to the default cpal device; without it, or without a usable
//! device, a paced thread consumes them so the playback clock still runs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::decode::DecodedAudio;
use super::engine::PlaybackError;

/// Rate used when no device dictates one.
pub const DEFAULT_OUTPUT_RATE: u32 = 44_100;

const PACED_CHUNK: Duration = Duration::from_millis(20);

/// State shared between the engine and the output thread.
#[derive(Debug)]
pub struct PlaybackState {
    track: Mutex<Option<Arc<DecodedAudio>>>,
    source: Mutex<Option<String>>,
    /// Next frame to render.
    cursor: AtomicUsize,
    playing: AtomicBool,
    /// Set by `render` when the loaded track runs out while playing.
    ended: AtomicBool,
    /// f32 bits of the linear volume.
    volume: AtomicU32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            track: Mutex::new(None),
            source: Mutex::new(None),
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            volume: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

impl PlaybackState {
    /// Forget the current track and remember `source` as the one being loaded.
    pub fn reset(&self, source: &str) {
        if let Ok(mut track) = self.track.lock() {
            *track = None;
        }
        if let Ok(mut current) = self.source.lock() {
            *current = Some(source.to_string());
        }
        self.cursor.store(0, Ordering::SeqCst);
        self.ended.store(false, Ordering::SeqCst);
    }

    /// Install decoded audio, unless another source was loaded meanwhile.
    pub fn install(&self, source: &str, audio: Arc<DecodedAudio>) -> bool {
        if self.source().as_deref() != Some(source) {
            return false;
        }
        match self.track.lock() {
            Ok(mut track) => {
                *track = Some(audio);
                true
            }
            Err(_) => false,
        }
    }

    pub fn source(&self) -> Option<String> {
        self.source.lock().ok().and_then(|source| source.clone())
    }

    pub fn has_source(&self) -> bool {
        self.source().is_some()
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_volume(&self, level: f32) {
        self.volume
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    pub fn seek(&self, position_secs: f64, rate: u32) {
        let frame = (position_secs.max(0.0) * f64::from(rate)) as usize;
        self.cursor.store(frame, Ordering::SeqCst);
        self.ended.store(false, Ordering::SeqCst);
    }

    /// Position and duration of the installed track, in seconds.
    pub fn clock(&self) -> Option<(f64, f64)> {
        let track = self.track.lock().ok()?;
        let audio = track.as_ref()?;
        let rate = f64::from(audio.sample_rate.max(1));
        let cursor = self.cursor.load(Ordering::SeqCst).min(audio.frames());
        Some((cursor as f64 / rate, audio.duration_secs()))
    }

    /// True once per track end.
    pub fn take_ended(&self) -> bool {
        self.ended.swap(false, Ordering::SeqCst)
    }

    /// Fill an interleaved output buffer of `channels` channels.
    pub fn render(&self, data: &mut [f32], channels: usize) {
        data.fill(0.0);
        if channels == 0 || !self.is_playing() {
            return;
        }
        let Ok(track) = self.track.lock() else {
            return;
        };
        let Some(audio) = track.as_ref() else {
            return;
        };

        let volume = self.volume();
        let total = audio.frames();
        let mut cursor = self.cursor.load(Ordering::SeqCst);
        for frame in data.chunks_mut(channels) {
            if cursor >= total {
                self.playing.store(false, Ordering::SeqCst);
                self.ended.store(true, Ordering::SeqCst);
                break;
            }
            let left = audio.samples[cursor * 2] * volume;
            let right = audio.samples[cursor * 2 + 1] * volume;
            if channels == 1 {
                frame[0] = ((left + right) / 2.0).clamp(-1.0, 1.0);
            } else {
                frame[0] = left.clamp(-1.0, 1.0);
                frame[1] = right.clamp(-1.0, 1.0);
            }
            cursor += 1;
        }
        self.cursor.store(cursor, Ordering::SeqCst);
    }
}

/// Handle to the output thread. Dropping it stops the thread.
pub struct AudioOutput {
    sample_rate: u32,
    _stop: std_mpsc::Sender<()>,
}

impl AudioOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start the output thread and wait until it reports its sample rate.
    pub fn open(state: Arc<PlaybackState>) -> Result<Self, PlaybackError> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<u32, PlaybackError>>(1);

        thread::Builder::new()
            .name("stem-audio-output".to_string())
            .spawn(move || run_output(state, ready_tx, stop_rx))
            .map_err(|e| PlaybackError::Backend(format!("Failed to spawn output thread: {}", e)))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| PlaybackError::Backend("Output thread exited early".to_string()))??;
        info!("Audio output running at {}Hz", sample_rate);
        Ok(Self {
            sample_rate,
            _stop: stop_tx,
        })
    }
}

/// Consume frames in real time without a device.
fn run_paced(
    state: Arc<PlaybackState>,
    ready: std_mpsc::SyncSender<Result<u32, PlaybackError>>,
    stop: std_mpsc::Receiver<()>,
) {
    let _ = ready.send(Ok(DEFAULT_OUTPUT_RATE));
    let frames = DEFAULT_OUTPUT_RATE as usize * PACED_CHUNK.as_millis() as usize / 1000;
    let mut scratch = vec![0.0f32; frames * 2];
    while let Err(std_mpsc::RecvTimeoutError::Timeout) = stop.recv_timeout(PACED_CHUNK) {
        state.render(&mut scratch, 2);
    }
    debug!("Paced output stopped");
}

#[cfg(not(feature = "audio-output"))]
fn run_output(
    state: Arc<PlaybackState>,
    ready: std_mpsc::SyncSender<Result<u32, PlaybackError>>,
    stop: std_mpsc::Receiver<()>,
) {
    warn!("Built without the audio-output feature, playback is silent");
    run_paced(state, ready, stop);
}

#[cfg(feature = "audio-output")]
fn run_output(
    state: Arc<PlaybackState>,
    ready: std_mpsc::SyncSender<Result<u32, PlaybackError>>,
    stop: std_mpsc::Receiver<()>,
) {
    match device::open_stream(state.clone()) {
        Ok((stream, rate)) => {
            let _ = ready.send(Ok(rate));
            // Blocks until the owning `AudioOutput` is dropped.
            let _ = stop.recv();
            drop(stream);
            debug!("Audio output stopped");
        }
        Err(e) => {
            warn!("{}, playback is silent", e);
            run_paced(state, ready, stop);
        }
    }
}

#[cfg(feature = "audio-output")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
    use std::sync::Arc;
    use tracing::{debug, error, info};

    use super::{PlaybackError, PlaybackState};

    pub fn open_stream(state: Arc<PlaybackState>) -> Result<(Stream, u32), PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Backend("No default output device found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", name);

        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Backend(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, state)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, state)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, state)?,
            other => {
                return Err(PlaybackError::Backend(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };
        stream
            .play()
            .map_err(|e| PlaybackError::Backend(format!("Failed to start stream: {}", e)))?;
        Ok((stream, config.sample_rate.0))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        state: Arc<PlaybackState>,
    ) -> Result<Stream, PlaybackError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = usize::from(config.channels);
        let mut scratch: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    state.render(&mut scratch, channels);
                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = <T as Sample>::from_sample::<f32>(*sample);
                    }
                },
                move |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::Backend(format!("Failed to build stream: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(frames: usize) -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio {
            samples: (0..frames).flat_map(|i| [i as f32 / 100.0, 0.5]).collect(),
            sample_rate: 10,
        })
    }

    fn loaded(frames: usize) -> PlaybackState {
        let state = PlaybackState::default();
        state.reset("http://h/a.wav");
        assert!(state.install("http://h/a.wav", audio(frames)));
        state
    }

    #[test]
    fn test_render_is_silent_until_playing() {
        let state = loaded(10);
        let mut out = [1.0f32; 8];
        state.render(&mut out, 2);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(state.clock(), Some((0.0, 1.0)));
    }

    #[test]
    fn test_render_advances_and_applies_volume() {
        let state = loaded(10);
        state.set_playing(true);
        state.set_volume(0.5);
        let mut out = [0.0f32; 4];
        state.render(&mut out, 2);
        assert_eq!(out, [0.0, 0.25, 0.005, 0.25]);
        assert_eq!(state.clock(), Some((0.2, 1.0)));
    }

    #[test]
    fn test_render_reports_end_once() {
        let state = loaded(3);
        state.set_playing(true);
        let mut out = [0.0f32; 10];
        state.render(&mut out, 2);
        assert!(!state.is_playing());
        assert!(state.take_ended());
        assert!(!state.take_ended());
        assert_eq!(&out[6..], &[0.0; 4]);
    }

    #[test]
    fn test_install_ignores_replaced_source() {
        let state = PlaybackState::default();
        state.reset("http://h/a.wav");
        state.reset("http://h/b.wav");
        assert!(!state.install("http://h/a.wav", audio(4)));
        assert_eq!(state.clock(), None);
        assert!(state.install("http://h/b.wav", audio(4)));
    }

    #[test]
    fn test_seek_moves_cursor() {
        let state = loaded(10);
        state.seek(0.5, 10);
        assert_eq!(state.clock(), Some((0.5, 1.0)));
        state.seek(5.0, 10);
        assert_eq!(state.clock(), Some((1.0, 1.0)), "clamped to the end");
    }

    #[test]
    fn test_mono_output_mixes_down() {
        let state = loaded(2);
        state.set_playing(true);
        let mut out = [0.0f32; 2];
        state.render(&mut out, 1);
        assert_eq!(out[0], 0.25);
        assert!((out[1] - 0.255).abs() < 1e-6);
    }

    #[test]
    fn test_open_reports_rate() {
        let output = AudioOutput::open(Arc::new(PlaybackState::default())).unwrap();
        assert!(output.sample_rate() > 0);
    }
}
