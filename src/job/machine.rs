//! Job lifecycle state machine.
//!
//! `Session` owns every piece of client state. Inputs (user commands, HTTP
//! results, push events, timers) arrive as `Msg` values and are reduced one
//! at a time; the reducer never performs I/O and instead returns the `Effect`s
//! the driver has to execute.
//!
//! Phases: `Idle -> Uploading -> Processing -> {Complete, Error, Stopped}`,
//! with a new cycle returning a terminal phase to `Idle`.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::models::*;
use super::settings::ProcessingSettings;
use crate::api::{ApiError, DeviceStatusResponse, StemTrack};
use crate::intake::{AudioFile, UploadedFileSet};
use crate::notifications::NotificationKind;
use crate::playback::{PlaybackCommand, PlaybackEvent, Player};
use crate::push::messages::job::{ProcessingComplete, ProcessingError, ProcessingUpdate};
use crate::push::{PushEvent, ServerEvent};

/// Delay between completion and fetching the stems for playback.
pub const DEFAULT_HANDOFF_DELAY: Duration = Duration::from_millis(500);

/// Input to the state machine.
#[derive(Debug)]
pub enum Msg {
    // User commands
    AddFiles(Vec<AudioFile>),
    RemoveFile(usize),
    ClearFiles,
    UpdateSettings(ProcessingSettings),
    StartProcessing,
    StopProcessing,
    /// Reset a finished cycle: clear files, results and progress.
    NewCycle,
    RefreshDevice,

    // Backend results
    UploadFinished {
        cycle: u64,
        result: Result<String, ApiError>,
    },
    ProcessStarted {
        job_id: String,
        result: Result<(), ApiError>,
    },
    StopFinished {
        job_id: String,
        result: Result<(), ApiError>,
    },
    DeviceDetected(Result<DeviceStatusResponse, ApiError>),
    StemsLoaded {
        job_id: String,
        result: Result<Vec<StemTrack>, ApiError>,
    },

    // Push channel and timers
    Push(PushEvent),
    KeepAliveTick,
    HandoffElapsed {
        job_id: String,
    },

    // Playback
    PlayTrack(usize),
    NextTrack,
    PreviousTrack,
    TogglePlayPause,
    /// Relative position, 0 to 100.
    Seek(f64),
    SetVolume(u8),
    /// Engine clock for `source`.
    TimeUpdate {
        source: String,
        position_secs: f64,
        duration_secs: f64,
    },
    TrackEnded {
        source: String,
    },
    StopAudio,
    ClosePlayer,
}

impl From<PushEvent> for Msg {
    fn from(event: PushEvent) -> Self {
        Msg::Push(event)
    }
}

impl From<PlaybackEvent> for Msg {
    fn from(event: PlaybackEvent) -> Self {
        match event {
            PlaybackEvent::Position {
                source,
                position_secs,
                duration_secs,
            } => Msg::TimeUpdate {
                source,
                position_secs,
                duration_secs,
            },
            PlaybackEvent::Ended { source } => Msg::TrackEnded { source },
        }
    }
}

/// Work requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify {
        kind: NotificationKind,
        message: String,
    },
    /// Multipart upload; the result comes back as `Msg::UploadFinished`.
    Upload {
        cycle: u64,
        files: Vec<AudioFile>,
    },
    JoinJob {
        job_id: String,
    },
    StartProcess {
        job_id: String,
        settings: ProcessingSettings,
    },
    StopJob {
        job_id: String,
    },
    StartKeepAlive,
    CancelKeepAlive,
    SendPing,
    ScheduleHandoff {
        job_id: String,
        delay: Duration,
    },
    FetchStems {
        job_id: String,
        file_stem: String,
    },
    FetchDeviceStatus,
    Playback(PlaybackCommand),
}

impl Effect {
    fn notify(kind: NotificationKind, message: impl Into<String>) -> Self {
        Effect::Notify {
            kind,
            message: message.into(),
        }
    }
}

/// Files and settings captured when a submission starts.
#[derive(Debug, Clone)]
struct Submission {
    files: Vec<AudioFile>,
    settings: ProcessingSettings,
}

pub struct Session {
    phase: JobPhase,
    files: UploadedFileSet,
    settings: ProcessingSettings,
    /// Bumped on every new cycle so late upload results can be told apart.
    cycle: u64,
    submission: Option<Submission>,
    job: Option<Job>,
    progress: ProgressDisplay,
    completion: Option<CompletionSummary>,
    device: DeviceStatus,
    keepalive_active: bool,
    push_connected: bool,
    player: Player,
    handoff_delay: Duration,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ProcessingSettings::default(), DEFAULT_HANDOFF_DELAY)
    }
}

impl Session {
    pub fn new(settings: ProcessingSettings, handoff_delay: Duration) -> Self {
        Self {
            phase: JobPhase::Idle,
            files: Default::default(),
            settings,
            cycle: 0,
            submission: None,
            job: None,
            progress: ProgressDisplay::default(),
            completion: None,
            device: DeviceStatus::Unknown,
            keepalive_active: false,
            push_connected: false,
            player: Player::new(),
            handoff_delay,
        }
    }

    /// Reduce one message.
    pub fn update(&mut self, msg: Msg) -> Vec<Effect> {
        match msg {
            Msg::AddFiles(candidates) => self.add_files(candidates),
            Msg::RemoveFile(index) => {
                if let Some(file) = self.files.remove_file(index) {
                    debug!("Removed {} from selection", file.name);
                }
                Vec::new()
            }
            Msg::ClearFiles => {
                self.files.clear();
                Vec::new()
            }
            Msg::UpdateSettings(settings) => {
                self.settings = settings;
                Vec::new()
            }
            Msg::StartProcessing => self.start_processing(),
            Msg::StopProcessing => self.stop_processing(),
            Msg::NewCycle => self.new_cycle(),
            Msg::RefreshDevice => vec![Effect::FetchDeviceStatus],

            Msg::UploadFinished { cycle, result } => self.upload_finished(cycle, result),
            Msg::ProcessStarted { job_id, result } => self.process_started(&job_id, result),
            Msg::StopFinished { job_id, result } => self.stop_finished(&job_id, result),
            Msg::DeviceDetected(result) => {
                self.device = match result {
                    Ok(status) => DeviceStatus::Ready {
                        gpu: status.cuda_available,
                    },
                    Err(e) => {
                        warn!("Device detection failed: {}", e);
                        DeviceStatus::Error
                    }
                };
                Vec::new()
            }
            Msg::StemsLoaded { job_id, result } => self.stems_loaded(&job_id, result),

            Msg::Push(event) => self.push_event(event),
            Msg::KeepAliveTick => {
                if self.keepalive_active && self.push_connected {
                    vec![Effect::SendPing]
                } else {
                    Vec::new()
                }
            }
            Msg::HandoffElapsed { job_id } => self.handoff(&job_id),

            Msg::PlayTrack(index) => playback(self.player.play_track(index)),
            Msg::NextTrack => playback(self.player.next()),
            Msg::PreviousTrack => playback(self.player.previous()),
            Msg::TogglePlayPause => playback(self.player.toggle_play_pause()),
            Msg::Seek(position) => playback(self.player.seek(position)),
            Msg::SetVolume(volume) => playback(self.player.set_volume(volume)),
            Msg::TimeUpdate {
                source,
                position_secs,
                duration_secs,
            } => {
                if self.player.is_loaded_source(&source) {
                    self.player.time_update(position_secs, duration_secs);
                }
                Vec::new()
            }
            Msg::TrackEnded { source } => {
                if !self.player.is_loaded_source(&source) {
                    debug!("Ignoring end of stale source {}", source);
                    return Vec::new();
                }
                playback(self.player.track_ended())
            }
            Msg::StopAudio => playback(self.player.stop()),
            Msg::ClosePlayer => playback(self.player.close()),
        }
    }

    fn add_files(&mut self, candidates: Vec<AudioFile>) -> Vec<Effect> {
        let outcome = self.files.add_files(candidates);
        if outcome.is_rejected() {
            return vec![Effect::notify(
                NotificationKind::Error,
                "Please select valid audio files",
            )];
        }
        debug!(
            "Added {} files ({} duplicates, {} rejected)",
            outcome.added, outcome.duplicates, outcome.rejected
        );
        Vec::new()
    }

    fn start_processing(&mut self) -> Vec<Effect> {
        if self.files.is_empty() {
            return vec![Effect::notify(
                NotificationKind::Error,
                "Please select audio files first",
            )];
        }
        if self.phase.is_busy() {
            debug!("Submission already in flight, ignoring start");
            return Vec::new();
        }
        if let Err(e) = self.settings.validate() {
            return vec![Effect::notify(
                NotificationKind::Error,
                format!("Invalid settings: {}", e),
            )];
        }

        let mut effects = self.begin_cycle();
        let files = self.files.files().to_vec();
        self.submission = Some(Submission {
            files: files.clone(),
            settings: self.settings.clone(),
        });
        self.phase = JobPhase::Uploading;
        info!("Cycle {}: uploading {} files", self.cycle, files.len());

        effects.push(Effect::notify(NotificationKind::Info, "Uploading files..."));
        effects.push(Effect::Upload {
            cycle: self.cycle,
            files,
        });
        effects
    }

    fn upload_finished(&mut self, cycle: u64, result: Result<String, ApiError>) -> Vec<Effect> {
        if cycle != self.cycle || self.phase != JobPhase::Uploading || self.job.is_some() {
            debug!("Discarding upload result of cycle {}", cycle);
            return Vec::new();
        }
        let Some(submission) = self.submission.take() else {
            return Vec::new();
        };

        match result {
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.phase = JobPhase::Idle;
                vec![Effect::notify(
                    NotificationKind::Error,
                    format!("Error: Upload failed: {}", e),
                )]
            }
            Ok(job_id) => {
                info!("Job {} created", job_id);
                let settings = submission.settings.clone();
                self.job = Some(Job {
                    id: job_id.clone(),
                    files: submission.files,
                    settings: submission.settings,
                    status: JobStatus::Submitted,
                });
                vec![
                    Effect::JoinJob {
                        job_id: job_id.clone(),
                    },
                    Effect::StartProcess { job_id, settings },
                ]
            }
        }
    }

    fn process_started(&mut self, job_id: &str, result: Result<(), ApiError>) -> Vec<Effect> {
        if !self.is_active_open_job(job_id) || self.phase != JobPhase::Uploading {
            debug!("Discarding process start result for job {}", job_id);
            return Vec::new();
        }

        match result {
            Err(e) => {
                // The upload stands: the job id stays active.
                warn!("Processing failed to start for job {}: {}", job_id, e);
                self.phase = JobPhase::Idle;
                vec![Effect::notify(
                    NotificationKind::Error,
                    format!("Error: Processing failed to start: {}", e),
                )]
            }
            Ok(()) => {
                if let Some(job) = self.job.as_mut() {
                    job.status = JobStatus::Processing;
                }
                self.phase = JobPhase::Processing;
                self.keepalive_active = true;
                info!("Job {} processing", job_id);
                vec![
                    Effect::notify(NotificationKind::Success, "Processing started..."),
                    Effect::StartKeepAlive,
                ]
            }
        }
    }

    fn stop_processing(&mut self) -> Vec<Effect> {
        if !self.phase.is_busy() {
            debug!("Nothing to stop in phase {}", self.phase.as_str());
            return Vec::new();
        }
        match self.job.as_ref() {
            Some(job) => vec![Effect::StopJob {
                job_id: job.id.clone(),
            }],
            None => {
                // Upload still in flight: abandon it locally.
                info!("Stopped during upload of cycle {}", self.cycle);
                self.cycle += 1;
                self.submission = None;
                self.phase = JobPhase::Stopped;
                self.cancel_keepalive()
            }
        }
    }

    fn stop_finished(&mut self, job_id: &str, result: Result<(), ApiError>) -> Vec<Effect> {
        if self.active_job_id() != Some(job_id) {
            debug!("Discarding stop result for job {}", job_id);
            return Vec::new();
        }
        match result {
            Err(e) => {
                warn!("Stop failed for job {}: {}", job_id, e);
                vec![Effect::notify(
                    NotificationKind::Error,
                    format!("Error stopping: {}", e),
                )]
            }
            Ok(()) => {
                info!("Job {} stopped", job_id);
                self.close_job(JobStatus::Stopped);
                self.phase = JobPhase::Stopped;
                self.cancel_keepalive()
            }
        }
    }

    fn new_cycle(&mut self) -> Vec<Effect> {
        if self.phase.is_busy() {
            debug!("Cannot reset while a submission is in flight");
            return Vec::new();
        }
        let effects = self.begin_cycle();
        self.files.clear();
        self.phase = JobPhase::Idle;
        effects
    }

    /// Discard the previous job's local state and start a new cycle.
    fn begin_cycle(&mut self) -> Vec<Effect> {
        self.cycle += 1;
        self.submission = None;
        self.job = None;
        self.progress = ProgressDisplay::default();
        self.completion = None;
        let mut effects = self.cancel_keepalive();
        effects.extend(playback(self.player.clear()));
        effects
    }

    fn push_event(&mut self, event: PushEvent) -> Vec<Effect> {
        match event {
            PushEvent::TransportConnected => {
                self.push_connected = true;
                vec![Effect::notify(NotificationKind::Success, "Connected to server")]
            }
            PushEvent::TransportDisconnected => {
                self.push_connected = false;
                vec![Effect::notify(
                    NotificationKind::Warning,
                    "Connection lost. Reconnecting...",
                )]
            }
            PushEvent::TransportReconnected => {
                self.push_connected = true;
                let mut effects = vec![Effect::notify(
                    NotificationKind::Success,
                    "Reconnected to server",
                )];
                if let Some(job) = self.job.as_ref() {
                    effects.push(Effect::JoinJob {
                        job_id: job.id.clone(),
                    });
                }
                effects
            }
            PushEvent::Server(event) => self.server_event(event),
        }
    }

    fn server_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        if let Some(job_id) = event.job_id() {
            if !matches!(event, ServerEvent::JoinedJob(_)) && !self.is_active_open_job(job_id) {
                debug!("Discarding event for inactive job {}: {:?}", job_id, event);
                return Vec::new();
            }
        }

        match event {
            ServerEvent::Connected(payload) => {
                debug!("Server confirmed connection: {:?}", payload.status);
                Vec::new()
            }
            ServerEvent::JoinedJob(payload) => {
                debug!("Joined job room {}", payload.job_id);
                Vec::new()
            }
            ServerEvent::Pong => Vec::new(),
            ServerEvent::ProcessingUpdate(update) => self.apply_update(update),
            ServerEvent::ProcessingComplete(complete) => self.complete(complete),
            ServerEvent::ProcessingError(error) => self.fail(error),
            ServerEvent::Unknown(msg_type) => {
                debug!("Ignoring push message of type {}", msg_type);
                Vec::new()
            }
        }
    }

    fn apply_update(&mut self, update: ProcessingUpdate) -> Vec<Effect> {
        if let Some(device) = update.snapshot.device.as_deref().filter(|d| !d.is_empty()) {
            self.device = DeviceStatus::from_device_name(device);
        }
        self.progress.merge(&update.snapshot);
        Vec::new()
    }

    fn complete(&mut self, complete: ProcessingComplete) -> Vec<Effect> {
        info!(
            "Job {} complete: {} files in {}",
            complete.job_id, complete.total_files, complete.total_time
        );
        self.close_job(JobStatus::Complete);
        self.phase = JobPhase::Complete;
        self.completion = Some(complete.summary());

        let mut effects = self.cancel_keepalive();
        effects.push(Effect::notify(
            NotificationKind::Success,
            "Processing completed successfully!",
        ));
        effects.push(Effect::ScheduleHandoff {
            job_id: complete.job_id,
            delay: self.handoff_delay,
        });
        effects
    }

    fn fail(&mut self, error: ProcessingError) -> Vec<Effect> {
        warn!("Job {} failed: {}", error.job_id, error.error);
        self.close_job(JobStatus::Failed);
        self.phase = JobPhase::Error;

        let mut effects = self.cancel_keepalive();
        effects.push(Effect::notify(
            NotificationKind::Error,
            format!("Processing error: {}", error.error),
        ));
        effects
    }

    fn handoff(&mut self, job_id: &str) -> Vec<Effect> {
        let Some(job) = self.job.as_ref().filter(|j| j.id == job_id) else {
            debug!("Skipping stem handoff for inactive job {}", job_id);
            return Vec::new();
        };
        if job.status != JobStatus::Complete {
            return Vec::new();
        }
        match job.first_file_stem() {
            Some(file_stem) => vec![Effect::FetchStems {
                job_id: job.id.clone(),
                file_stem: file_stem.to_string(),
            }],
            None => Vec::new(),
        }
    }

    fn stems_loaded(
        &mut self,
        job_id: &str,
        result: Result<Vec<StemTrack>, ApiError>,
    ) -> Vec<Effect> {
        if self.active_job_id() != Some(job_id) {
            debug!("Discarding stems of inactive job {}", job_id);
            return Vec::new();
        }
        match result {
            Ok(stems) if stems.is_empty() => {
                info!("No stems available for job {}", job_id);
                Vec::new()
            }
            Ok(stems) => {
                info!("Loaded {} stems for job {}", stems.len(), job_id);
                playback(self.player.load(stems))
            }
            Err(e) => {
                warn!("Failed to load stems for job {}: {}", job_id, e);
                Vec::new()
            }
        }
    }

    fn close_job(&mut self, status: JobStatus) {
        if let Some(job) = self.job.as_mut() {
            job.status = status;
        }
    }

    fn cancel_keepalive(&mut self) -> Vec<Effect> {
        if std::mem::take(&mut self.keepalive_active) {
            vec![Effect::CancelKeepAlive]
        } else {
            Vec::new()
        }
    }

    fn is_active_open_job(&self, job_id: &str) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.id == job_id && job.status.is_open())
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn files(&self) -> &UploadedFileSet {
        &self.files
    }

    pub fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    pub fn active_job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn active_job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|job| job.id.as_str())
    }

    pub fn progress(&self) -> &ProgressDisplay {
        &self.progress
    }

    pub fn completion(&self) -> Option<&CompletionSummary> {
        self.completion.as_ref()
    }

    /// Download locator of the completed job.
    pub fn download_url(&self) -> Option<&str> {
        self.completion.as_ref().map(|c| c.download_url.as_str())
    }

    pub fn device(&self) -> DeviceStatus {
        self.device
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn keepalive_active(&self) -> bool {
        self.keepalive_active
    }

    pub fn push_connected(&self) -> bool {
        self.push_connected
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Submission is allowed with files selected and nothing in flight.
    pub fn can_submit(&self) -> bool {
        !self.files.is_empty() && !self.phase.is_busy()
    }
}

fn playback(commands: Vec<PlaybackCommand>) -> Vec<Effect> {
    commands.into_iter().map(Effect::Playback).collect()
}
