//! Single-track playback over a list of stems.

use tracing::debug;

use super::engine::PlaybackCommand;
use crate::api::StemTrack;
use crate::intake::format_file_size;

/// Progress of one track in the stem list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackProgress {
    pub fill_percent: f64,
    pub elapsed_secs: f64,
}

/// Playback state over the stems of the last completed job.
///
/// Every operation returns the commands the audio output has to apply.
#[derive(Debug, Clone)]
pub struct Player {
    tracks: Vec<StemTrack>,
    current: usize,
    playing: bool,
    visible: bool,
    /// A track has been handed to the engine since the last `load`.
    loaded: bool,
    position_secs: f64,
    duration_secs: f64,
    progress: Vec<TrackProgress>,
    volume: u8,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            current: 0,
            playing: false,
            visible: false,
            loaded: false,
            position_secs: 0.0,
            duration_secs: 0.0,
            progress: Vec::new(),
            volume: 100,
        }
    }
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the track list and reset playback state.
    pub fn load(&mut self, tracks: Vec<StemTrack>) -> Vec<PlaybackCommand> {
        let commands = self.clear();
        debug!("Loaded {} stems for playback", tracks.len());
        self.progress = vec![TrackProgress::default(); tracks.len()];
        self.tracks = tracks;
        commands
    }

    /// Drop the track list, pausing first if something is playing.
    pub fn clear(&mut self) -> Vec<PlaybackCommand> {
        let commands = if self.playing {
            vec![PlaybackCommand::Pause]
        } else {
            Vec::new()
        };
        let volume = self.volume;
        *self = Self {
            volume,
            ..Self::default()
        };
        commands
    }

    /// Make track `index` current and start playing it. Out of range indices are ignored.
    pub fn play_track(&mut self, index: usize) -> Vec<PlaybackCommand> {
        if index >= self.tracks.len() {
            return Vec::new();
        }
        self.visible = true;
        let mut commands = self.load_track(index);
        commands.extend(self.play());
        commands
    }

    pub fn toggle_play_pause(&mut self) -> Vec<PlaybackCommand> {
        if self.tracks.is_empty() {
            return Vec::new();
        }
        if self.playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Advance with wrap-around, continuing playback only if it was playing.
    pub fn next(&mut self) -> Vec<PlaybackCommand> {
        if self.tracks.is_empty() {
            return Vec::new();
        }
        let index = (self.current + 1) % self.tracks.len();
        self.switch_to(index)
    }

    pub fn previous(&mut self) -> Vec<PlaybackCommand> {
        if self.tracks.is_empty() {
            return Vec::new();
        }
        let index = if self.current == 0 {
            self.tracks.len() - 1
        } else {
            self.current - 1
        };
        self.switch_to(index)
    }

    /// Seek to a relative slider position, 0 to 100.
    pub fn seek(&mut self, position: f64) -> Vec<PlaybackCommand> {
        if !self.has_duration() || !position.is_finite() {
            return Vec::new();
        }
        let target = position.clamp(0.0, 100.0) / 100.0 * self.duration_secs;
        self.position_secs = target;
        vec![PlaybackCommand::Seek {
            position_secs: target,
        }]
    }

    /// Set volume from a 0 to 100 control.
    pub fn set_volume(&mut self, volume: u8) -> Vec<PlaybackCommand> {
        self.volume = volume.min(100);
        vec![PlaybackCommand::SetVolume {
            level: f64::from(self.volume) / 100.0,
        }]
    }

    /// Record the engine's clock. Only the loaded track's progress changes.
    pub fn time_update(&mut self, position_secs: f64, duration_secs: f64) {
        self.position_secs = position_secs;
        self.duration_secs = duration_secs;
        if !self.has_duration() {
            return;
        }
        let fill_percent = (position_secs / duration_secs * 100.0).clamp(0.0, 100.0);
        if let Some(progress) = self.progress.get_mut(self.current) {
            progress.fill_percent = fill_percent;
            if position_secs > 0.0 {
                progress.elapsed_secs = position_secs;
            }
        }
    }

    /// The loaded track reached its end.
    pub fn track_ended(&mut self) -> Vec<PlaybackCommand> {
        self.next()
    }

    /// Pause and rewind the current track.
    pub fn stop(&mut self) -> Vec<PlaybackCommand> {
        if self.tracks.is_empty() {
            return Vec::new();
        }
        self.playing = false;
        self.position_secs = 0.0;
        if let Some(progress) = self.progress.get_mut(self.current) {
            progress.fill_percent = 0.0;
        }
        vec![
            PlaybackCommand::Pause,
            PlaybackCommand::Seek { position_secs: 0.0 },
        ]
    }

    /// Pause and hide the player.
    pub fn close(&mut self) -> Vec<PlaybackCommand> {
        self.visible = false;
        if self.tracks.is_empty() {
            return Vec::new();
        }
        self.pause()
    }

    pub fn tracks(&self) -> &[StemTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_track(&self) -> Option<&StemTrack> {
        self.tracks.get(self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Whether engine reports for `source` belong to the loaded track.
    pub fn is_loaded_source(&self, source: &str) -> bool {
        self.loaded && self.current_track().is_some_and(|track| track.url == source)
    }

    pub fn track_progress(&self, index: usize) -> Option<TrackProgress> {
        self.progress.get(index).copied()
    }

    /// Slider position of the loaded track, 0 to 100.
    pub fn progress_percent(&self) -> f64 {
        if self.has_duration() {
            (self.position_secs / self.duration_secs * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    pub fn elapsed_label(&self) -> String {
        format_time(self.position_secs)
    }

    pub fn duration_label(&self) -> String {
        format_time(self.duration_secs)
    }

    fn has_duration(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs > 0.0
    }

    fn load_track(&mut self, index: usize) -> Vec<PlaybackCommand> {
        let Some(track) = self.tracks.get(index) else {
            return Vec::new();
        };
        let url = track.url.clone();
        self.current = index;
        self.loaded = true;
        self.position_secs = 0.0;
        self.duration_secs = 0.0;
        vec![PlaybackCommand::Load { url }]
    }

    fn switch_to(&mut self, index: usize) -> Vec<PlaybackCommand> {
        let mut commands = self.load_track(index);
        if self.playing {
            commands.push(PlaybackCommand::Play);
        }
        commands
    }

    fn play(&mut self) -> Vec<PlaybackCommand> {
        self.playing = true;
        vec![PlaybackCommand::Play]
    }

    fn pause(&mut self) -> Vec<PlaybackCommand> {
        self.playing = false;
        vec![PlaybackCommand::Pause]
    }
}

/// "m:ss", with "0:00" for values that are not a time.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Display title of a stem: its role, capitalized.
pub fn track_title(track: &StemTrack) -> String {
    let mut chars = track.name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "<filename> • <size>"
pub fn track_subtitle(track: &StemTrack) -> String {
    format!("{} • {}", track.filename, format_file_size(track.size))
}
