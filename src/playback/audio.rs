//! `PlaybackEngine` that fetches stems over HTTP and plays them.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decode::{decode, extension_hint, DecodedAudio};
use super::engine::{PlaybackCommand, PlaybackEngine, PlaybackError, PlaybackEvent};
use super::output::{AudioOutput, PlaybackState};

/// How often the position of a playing track is reported.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(250);

pub struct AudioEngine {
    state: Arc<PlaybackState>,
    output: AudioOutput,
    http: Client,
    runtime: Handle,
    events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
    reporter: CancellationToken,
    report_interval: Duration,
}

impl AudioEngine {
    /// Open the output. Must be called from within a tokio runtime.
    pub fn new(http: Client) -> Result<Self, PlaybackError> {
        let runtime = Handle::try_current()
            .map_err(|e| PlaybackError::Backend(format!("No async runtime: {}", e)))?;
        let state = Arc::new(PlaybackState::default());
        let output = AudioOutput::open(state.clone())?;
        Ok(Self {
            state,
            output,
            http,
            runtime,
            events: None,
            reporter: CancellationToken::new(),
            report_interval: DEFAULT_REPORT_INTERVAL,
        })
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    fn load(&self, url: &str) {
        self.state.set_playing(false);
        self.state.reset(url);

        let url = url.to_string();
        let state = self.state.clone();
        let http = self.http.clone();
        let events = self.events.clone();
        let rate = self.output.sample_rate();
        self.runtime.spawn(async move {
            let audio = match fetch_track(&http, &url, rate).await {
                Ok(audio) => Arc::new(audio),
                Err(e) => {
                    warn!("Failed to load {}: {}", url, e);
                    return;
                }
            };
            info!("Loaded {} ({:.1}s)", url, audio.duration_secs());
            if !state.install(&url, audio) {
                debug!("Discarding {}, another source was loaded", url);
                return;
            }
            if let (Some(events), Some((position_secs, duration_secs))) = (events, state.clock()) {
                let _ = events.send(PlaybackEvent::Position {
                    source: url,
                    position_secs,
                    duration_secs,
                });
            }
        });
    }

    fn require_source(&self) -> Result<(), PlaybackError> {
        if self.state.has_source() {
            Ok(())
        } else {
            Err(PlaybackError::NoSource)
        }
    }
}

impl PlaybackEngine for AudioEngine {
    fn attach(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>) {
        self.reporter.cancel();
        self.reporter = CancellationToken::new();
        self.events = Some(events.clone());

        let state = self.state.clone();
        let token = self.reporter.clone();
        let period = self.report_interval;
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = token.cancelled() => break,
                }
                if !report(&state, &events) {
                    break;
                }
            }
            debug!("Playback reporter stopped");
        });
    }

    fn apply(&mut self, command: &PlaybackCommand) -> Result<(), PlaybackError> {
        debug!("Playback command: {:?}", command);
        match command {
            PlaybackCommand::Load { url } => self.load(url),
            PlaybackCommand::Play => {
                self.require_source()?;
                self.state.set_playing(true);
            }
            PlaybackCommand::Pause => self.state.set_playing(false),
            PlaybackCommand::Seek { position_secs } => {
                self.require_source()?;
                self.state.seek(*position_secs, self.output.sample_rate());
            }
            PlaybackCommand::SetVolume { level } => self.state.set_volume(*level as f32),
        }
        Ok(())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.reporter.cancel();
    }
}

/// Send the reports due for the current source. False once nobody listens.
fn report(state: &PlaybackState, events: &mpsc::UnboundedSender<PlaybackEvent>) -> bool {
    let Some(source) = state.source() else {
        return true;
    };
    let ended = state.take_ended();
    if !ended && !state.is_playing() {
        return true;
    }
    if let Some((position_secs, duration_secs)) = state.clock() {
        let position = PlaybackEvent::Position {
            source: source.clone(),
            position_secs,
            duration_secs,
        };
        if events.send(position).is_err() {
            return false;
        }
    }
    if ended {
        return events.send(PlaybackEvent::Ended { source }).is_ok();
    }
    true
}

async fn fetch_track(http: &Client, url: &str, rate: u32) -> Result<DecodedAudio, PlaybackError> {
    let fetch_error = |e: reqwest::Error| PlaybackError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    };
    let bytes = http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?
        .bytes()
        .await
        .map_err(fetch_error)?;

    let extension = extension_hint(url).map(str::to_string);
    tokio::task::spawn_blocking(move || decode(bytes.to_vec(), extension.as_deref())?.resample(rate))
        .await
        .map_err(|e| PlaybackError::Backend(format!("Decoder task failed: {}", e)))?
}

#[cfg(all(test, not(feature = "audio-output")))]
mod tests {
    use super::*;
    use crate::playback::decode::tests::wav_bytes;
    use crate::playback::output::DEFAULT_OUTPUT_RATE;
    use axum::routing::get;
    use axum::Router;

    async fn serve_wav(frames: usize) -> String {
        let bytes = wav_bytes(DEFAULT_OUTPUT_RATE, 2, frames);
        let app = Router::new().route("/audio/abc/track_vocals.wav", get(move || async move { bytes }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/audio/abc/track_vocals.wav", addr)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> PlaybackEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no playback event")
            .expect("event channel closed")
    }

    fn engine() -> (AudioEngine, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut engine = AudioEngine::new(Client::new())
            .unwrap()
            .with_report_interval(Duration::from_millis(20));
        engine.attach(tx);
        (engine, rx)
    }

    #[tokio::test]
    async fn test_play_reports_duration_then_end() {
        // 0.2s of audio.
        let url = serve_wav(DEFAULT_OUTPUT_RATE as usize / 5).await;
        let (mut engine, mut rx) = engine();

        engine.apply(&PlaybackCommand::Load { url: url.clone() }).unwrap();
        match next_event(&mut rx).await {
            PlaybackEvent::Position {
                source,
                position_secs,
                duration_secs,
            } => {
                assert_eq!(source, url);
                assert_eq!(position_secs, 0.0);
                assert!((duration_secs - 0.2).abs() < 1e-6);
            }
            other => panic!("expected a position report, got {:?}", other),
        }

        engine.apply(&PlaybackCommand::Play).unwrap();
        loop {
            match next_event(&mut rx).await {
                PlaybackEvent::Position { source, .. } => assert_eq!(source, url),
                PlaybackEvent::Ended { source } => {
                    assert_eq!(source, url);
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_player_seeks_once_duration_is_known() {
        use crate::api::StemTrack;
        use crate::playback::Player;

        let url = serve_wav(DEFAULT_OUTPUT_RATE as usize).await;
        let (mut engine, mut rx) = engine();
        let mut player = Player::new();
        player.load(vec![StemTrack {
            name: "vocals".to_string(),
            filename: "track_vocals.wav".to_string(),
            size: 10,
            url: url.clone(),
        }]);
        for command in player.play_track(0) {
            engine.apply(&command).unwrap();
        }
        assert!(player.seek(50.0).is_empty());

        if let PlaybackEvent::Position {
            source,
            position_secs,
            duration_secs,
        } = next_event(&mut rx).await
        {
            assert!(player.is_loaded_source(&source));
            player.time_update(position_secs, duration_secs);
        }
        assert_eq!(player.duration_label(), "0:01");

        let commands = player.seek(50.0);
        assert_eq!(
            commands,
            vec![PlaybackCommand::Seek {
                position_secs: 0.5
            }]
        );
        engine.apply(&commands[0]).unwrap();
    }

    #[tokio::test]
    async fn test_play_without_source_fails() {
        let (mut engine, _rx) = engine();
        assert!(matches!(
            engine.apply(&PlaybackCommand::Play),
            Err(PlaybackError::NoSource)
        ));
        assert!(matches!(
            engine.apply(&PlaybackCommand::Seek { position_secs: 1.0 }),
            Err(PlaybackError::NoSource)
        ));
        engine.apply(&PlaybackCommand::Pause).unwrap();
    }

    #[tokio::test]
    async fn test_missing_stem_reports_nothing() {
        let url = serve_wav(10).await.replace("track_vocals", "track_missing");
        let (mut engine, mut rx) = engine();
        engine.apply(&PlaybackCommand::Load { url }).unwrap();
        engine.apply(&PlaybackCommand::Play).unwrap();
        let event = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(event.is_err(), "unexpected event {:?}", event);
    }
}
