use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stem_separator_client::api::{
    SeparatorApi, SeparatorClient, ShutdownOutcome, StemTrack, VisualizationKind,
};
use stem_separator_client::config::{self, AppConfig, CliConfig, FileConfig};
use stem_separator_client::intake::{format_file_size, AudioFile};
use stem_separator_client::job::{
    DeviceStatus, JobPhase, Msg, OutputFormat, ProcessingSettings, ProgressDisplay, Quality,
    SeparationModel, Session,
};
use stem_separator_client::playback::{
    track_subtitle, track_title, AudioEngine, PlaybackCommand, PlaybackEngine,
    PlaybackEvent, Player,
};
use stem_separator_client::push::PushChannel;
use stem_separator_client::session::SessionDriver;

mod cli_style;
use cli_style::*;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(name = "stem-separator", version = VERSION, styles = get_styles())]
/// Client for a remote audio stem-separation server.
struct CliArgs {
    /// Base URL of the separation server.
    #[clap(long, global = true, default_value = config::DEFAULT_SERVER_URL)]
    pub server_url: String,

    /// WebSocket URL of the push channel. Derived from the server URL when omitted.
    #[clap(long, global = true)]
    pub ws_url: Option<String>,

    /// Timeout in seconds for HTTP requests.
    #[clap(long, global = true, default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SEC)]
    pub request_timeout_sec: u64,

    /// Seconds between keep-alive pings while a job is processing.
    #[clap(long, global = true, default_value_t = config::DEFAULT_KEEPALIVE_INTERVAL_SEC)]
    pub keepalive_interval_sec: u64,

    /// Path to a TOML config file. Its values override command line options.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the processing device reported by the server.
    Device,

    /// List the available separation models.
    Models,

    /// Upload files, process them and follow progress until the job ends.
    Run(RunArgs),

    /// Stop a running job.
    Stop { job_id: String },

    /// List the stems produced for one file of a job.
    Stems { job_id: String, file_stem: String },

    /// Render a visualization of a processed file and write it to disk.
    Visualize {
        job_id: String,
        filename: String,
        #[clap(value_enum)]
        kind: VisualizationKind,
        /// Output image path. Defaults to `<filename>_<kind>.<ext>`.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Download a result archive by its server path.
    Download {
        path: String,
        #[clap(short, long)]
        output: PathBuf,
    },

    /// Ask the server process to exit.
    Shutdown,

    /// Browse the stems of a job with an interactive player.
    Play { job_id: String, file_stem: String },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Audio files to separate.
    #[clap(required = true, value_parser = parse_path)]
    pub files: Vec<PathBuf>,

    #[clap(long, value_enum)]
    pub model: Option<SeparationModel>,

    #[clap(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[clap(long, value_enum)]
    pub quality: Option<Quality>,

    /// Gain applied to every stem, between 0.1 and 5.0.
    #[clap(long)]
    pub volume_boost: Option<f32>,

    #[clap(long)]
    pub noise_reduction: bool,

    /// Download the result archive to this path once processing completes.
    #[clap(long, value_parser = parse_path)]
    pub download: Option<PathBuf>,
}

impl RunArgs {
    /// Per-run flags applied over the configured defaults.
    fn settings(&self, defaults: &ProcessingSettings) -> ProcessingSettings {
        ProcessingSettings {
            model: self.model.unwrap_or(defaults.model),
            format: self.format.unwrap_or(defaults.format),
            quality: self.quality.unwrap_or(defaults.quality),
            volume_boost: self.volume_boost.unwrap_or(defaults.volume_boost),
            noise_reduction: self.noise_reduction || defaults.noise_reduction,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        server_url: cli_args.server_url.clone(),
        ws_url: cli_args.ws_url.clone(),
        request_timeout_sec: cli_args.request_timeout_sec,
        keepalive_interval_sec: cli_args.keepalive_interval_sec,
        ..Default::default()
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    debug!("Resolved config: {:?}", config);

    let client = SeparatorClient::new(&config.server_url, config.request_timeout)
        .context("Failed to create HTTP client")?;

    match cli_args.command {
        Command::Device => show_device(&client).await,
        Command::Models => {
            show_models();
            Ok(())
        }
        Command::Run(args) => run_job(config, client, args).await,
        Command::Stop { job_id } => {
            client.stop(&job_id).await?;
            print_success(&format!("Stopped job {}", job_id));
            Ok(())
        }
        Command::Stems { job_id, file_stem } => {
            let stems = client.stems(&job_id, &file_stem).await?;
            print_stems(&stems);
            Ok(())
        }
        Command::Visualize {
            job_id,
            filename,
            kind,
            output,
        } => visualize(&client, &job_id, &filename, kind, output).await,
        Command::Download { path, output } => download(&client, &path, &output).await,
        Command::Shutdown => {
            match client.shutdown().await? {
                ShutdownOutcome::Acknowledged => print_success("Server acknowledged shutdown"),
                ShutdownOutcome::ConnectionClosed => {
                    print_success("Server closed the connection while shutting down")
                }
            }
            Ok(())
        }
        Command::Play { job_id, file_stem } => play(&config, &client, &job_id, &file_stem).await,
    }
}

async fn show_device(client: &SeparatorClient) -> Result<()> {
    let status = client.device_status().await?;
    let device = DeviceStatus::Ready {
        gpu: status.cuda_available,
    };

    print_section_header("Processing Device");
    print_key_value_highlight("Status", device.label());
    if let Some(name) = &status.device_name {
        print_key_value("Device", name);
    }
    if let Some(count) = status.device_count {
        print_key_value("GPU count", &count.to_string());
    }
    print_section_footer();
    Ok(())
}

fn show_models() {
    print_section_header("Separation Models");
    for model in SeparationModel::ALL {
        let info = model.info();
        print_key_value_highlight(model.as_str(), info.name);
        print_list_item(info.description, 1);
        print_list_item_styled(&info.stems.join(", "), colors::DIM, 1);
    }
    print_section_footer();
}

fn print_stems(stems: &[StemTrack]) {
    if stems.is_empty() {
        print_empty_list("No stems available");
        return;
    }
    let mut table = TableBuilder::new(vec!["#", "Stem", "File", "URL"]);
    for (i, stem) in stems.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            track_title(stem),
            track_subtitle(stem),
            stem.url.clone(),
        ]);
    }
    table.print();
}

async fn visualize(
    client: &SeparatorClient,
    job_id: &str,
    filename: &str,
    kind: VisualizationKind,
    output: Option<PathBuf>,
) -> Result<()> {
    print_info(kind.description());
    let image = client.visualize(job_id, filename, kind).await?;
    let output = output.unwrap_or_else(|| {
        let base = filename.split('.').next().unwrap_or(filename);
        PathBuf::from(format!("{}_{}.{}", base, kind.as_str(), image.extension()))
    });
    tokio::fs::write(&output, &image.data)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;
    print_success(&format!("Saved {} to {:?}", kind.as_str(), output));
    Ok(())
}

async fn download(client: &SeparatorClient, path: &str, output: &Path) -> Result<()> {
    let written = client.download(path, output).await?;
    print_success(&format!(
        "Downloaded {:#} to {:?}",
        byte_unit::Byte::from(written),
        output
    ));
    Ok(())
}

/// Drive one full submission cycle against the server.
async fn run_job(config: AppConfig, client: SeparatorClient, args: RunArgs) -> Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match AudioFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(e) => print_error(&e.to_string()),
        }
    }
    let settings = args.settings(&config.processing);

    let client = Arc::new(client);
    let shutdown = CancellationToken::new();
    let (channel, push_handle) = PushChannel::new(&config.ws_url, config.reconnect_delay);
    let mut driver = SessionDriver::new(
        &config,
        client.clone(),
        Arc::new(push_handle),
        Box::new(playback_engine(&config)?),
        shutdown.clone(),
    );
    tokio::spawn(channel.run(driver.sender(), shutdown.child_token()));
    tokio::spawn(handle_interrupts(
        ctrl_c_presses(),
        driver.sender(),
        shutdown.clone(),
    ));

    print_section_header("Submission");
    for file in &files {
        print_key_value(&file.name, &format_file_size(file.size));
    }
    print_key_value("Model", settings.model.as_str());
    print_key_value("Volume boost", &settings.volume_boost_label());
    print_section_footer();

    driver.dispatch(Msg::RefreshDevice);
    driver.dispatch(Msg::UpdateSettings(settings));
    driver.dispatch(Msg::AddFiles(files));
    driver.dispatch(Msg::StartProcessing);

    let mut view = RunView::default();
    loop {
        view.render(&mut driver);
        if run_finished(driver.session()) {
            break;
        }
        if !driver.step().await {
            break;
        }
    }
    view.end_progress();

    let outcome = match driver.session().phase() {
        JobPhase::Complete => finish_complete(&mut driver, &mut view, &client, &config, &args).await,
        JobPhase::Stopped => {
            print_warning("Processing stopped");
            Ok(())
        }
        _ => Err(anyhow::anyhow!("Processing did not complete")),
    };

    shutdown.cancel();
    outcome
}

fn playback_engine(config: &AppConfig) -> Result<AudioEngine> {
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to create HTTP client for playback")?;
    Ok(AudioEngine::new(http)?)
}

fn ctrl_c_presses() -> impl Stream<Item = ()> + Unpin {
    Box::pin(futures::stream::unfold((), |_| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    }))
}

/// The first interrupt asks the server to stop the job; the next one gives up
/// waiting and shuts the session down.
async fn handle_interrupts(
    mut presses: impl Stream<Item = ()> + Unpin,
    stop_tx: mpsc::UnboundedSender<Msg>,
    shutdown: CancellationToken,
) {
    let mut stop_requested = false;
    loop {
        tokio::select! {
            press = presses.next() => {
                if press.is_none() {
                    break;
                }
                if stop_requested {
                    warn!("Interrupted again, exiting");
                    shutdown.cancel();
                    break;
                }
                warn!("Interrupted, stopping the job. Press Ctrl+C again to exit");
                stop_requested = true;
                let _ = stop_tx.send(Msg::StopProcessing);
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// A cycle is over once it reaches a terminal phase or falls back to Idle.
fn run_finished(session: &Session) -> bool {
    session.phase().is_terminal() || session.phase() == JobPhase::Idle
}

async fn finish_complete(
    driver: &mut SessionDriver,
    view: &mut RunView,
    client: &SeparatorClient,
    config: &AppConfig,
    args: &RunArgs,
) -> Result<()> {
    if let Some(summary) = driver.session().completion().cloned() {
        print_section_header("Results");
        print_key_value("Files", &summary.total_files.to_string());
        print_key_value("Time", &summary.total_time);
        print_key_value_highlight("Download", &client.absolute_url(&summary.download_url));
        print_section_footer();

        if let Some(dest) = &args.download {
            download(client, &summary.download_url, dest).await?;
        }
    }

    // Stems arrive after the handoff delay; a failed fetch only logs.
    let wait = config.handoff_delay + config.request_timeout;
    let loaded = tokio::time::timeout(wait, async {
        while driver.session().player().is_empty() {
            view.render(driver);
            if !driver.step().await {
                break;
            }
        }
    })
    .await;
    view.render(driver);
    if loaded.is_err() {
        warn!("Timed out waiting for stems");
    }
    print_stems(driver.session().player().tracks());
    Ok(())
}

/// Terminal rendering of a running session.
#[derive(Default)]
struct RunView {
    progress: Option<ProgressDisplay>,
    device: Option<DeviceStatus>,
    on_progress_line: bool,
}

impl RunView {
    fn render(&mut self, driver: &mut SessionDriver) {
        let unseen = driver.notifications_mut().drain_unseen();
        if !unseen.is_empty() {
            self.end_progress();
        }
        for notification in &unseen {
            print_notification(notification);
        }

        let session = driver.session();
        let device = session.device();
        if self.device != Some(device) && device != DeviceStatus::Unknown {
            self.end_progress();
            print_key_value("Device", device.label());
            self.device = Some(device);
        }

        if session.phase() == JobPhase::Processing {
            let progress = session.progress();
            if self.progress.as_ref() != Some(progress) {
                if let Err(e) = print_progress_line(
                    &progress.status_text,
                    progress.overall_progress,
                    &progress.overall_label(),
                ) {
                    debug!("Failed to draw progress: {}", e);
                }
                self.on_progress_line = true;
                self.progress = Some(progress.clone());
            }
        }
    }

    fn end_progress(&mut self) {
        if std::mem::take(&mut self.on_progress_line) {
            finish_progress_line();
        }
    }
}

const PLAYER_COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "list",
        args: "",
        description: "Show the loaded stems",
    },
    CommandHelp {
        name: "play",
        args: "<n>",
        description: "Play stem number n",
    },
    CommandHelp {
        name: "toggle",
        args: "",
        description: "Pause or resume",
    },
    CommandHelp {
        name: "next",
        args: "",
        description: "Skip to the next stem",
    },
    CommandHelp {
        name: "prev",
        args: "",
        description: "Go back to the previous stem",
    },
    CommandHelp {
        name: "seek",
        args: "<percent>",
        description: "Jump within the current stem",
    },
    CommandHelp {
        name: "volume",
        args: "<0-100>",
        description: "Set the volume",
    },
    CommandHelp {
        name: "stop",
        args: "",
        description: "Stop and rewind",
    },
    CommandHelp {
        name: "quit",
        args: "",
        description: "Close the player",
    },
];

/// Interactive stem player.
async fn play(config: &AppConfig, client: &SeparatorClient, job_id: &str, file_stem: &str) -> Result<()> {
    let stems = client.stems(job_id, file_stem).await?;
    if stems.is_empty() {
        bail!("No stems available for {} in job {}", file_stem, job_id);
    }

    let mut engine = playback_engine(config)?;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    engine.attach(events_tx);

    let mut player = Player::new();
    apply_all(&mut engine, player.load(stems));
    print_stems(player.tracks());
    print_help(PLAYER_COMMANDS);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = true;
    loop {
        if std::mem::take(&mut prompt) {
            print_prompt();
        }
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                prompt = true;
                match parse_player_input(&mut player, &line) {
                    PlayerInput::Commands(commands) => {
                        apply_all(&mut engine, commands);
                        print_player_state(&player);
                    }
                    PlayerInput::List => print_stems(player.tracks()),
                    PlayerInput::Help => print_help(PLAYER_COMMANDS),
                    PlayerInput::Invalid(message) => print_error(&message),
                    PlayerInput::Empty => {}
                    PlayerInput::Quit => {
                        apply_all(&mut engine, player.close());
                        break;
                    }
                }
            }
            Some(event) = events.recv() => match event {
                PlaybackEvent::Position { source, position_secs, duration_secs } => {
                    if player.is_loaded_source(&source) {
                        player.time_update(position_secs, duration_secs);
                    }
                }
                PlaybackEvent::Ended { source } => {
                    if player.is_loaded_source(&source) {
                        apply_all(&mut engine, player.track_ended());
                        println!();
                        print_player_state(&player);
                        prompt = true;
                    }
                }
            },
        }
    }
    Ok(())
}

enum PlayerInput {
    Commands(Vec<PlaybackCommand>),
    List,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_player_input(player: &mut Player, line: &str) -> PlayerInput {
    let mut parts = line.split_whitespace();
    let commands = match (parts.next(), parts.next()) {
        (None, _) => return PlayerInput::Empty,
        (Some("list"), _) => return PlayerInput::List,
        (Some("help"), _) => return PlayerInput::Help,
        (Some("quit"), _) | (Some("exit"), _) => return PlayerInput::Quit,
        (Some("play"), Some(n)) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => player.play_track(n - 1),
            _ => return PlayerInput::Invalid("Expected a stem number".to_string()),
        },
        (Some("toggle"), _) => player.toggle_play_pause(),
        (Some("next"), _) => player.next(),
        (Some("prev"), _) => player.previous(),
        (Some("seek"), Some(p)) => match p.parse::<f64>() {
            Ok(p) => player.seek(p),
            Err(_) => return PlayerInput::Invalid("Expected a percentage".to_string()),
        },
        (Some("volume"), Some(v)) => match v.parse::<u8>() {
            Ok(v) => player.set_volume(v),
            Err(_) => {
                return PlayerInput::Invalid("Expected a volume between 0 and 100".to_string())
            }
        },
        (Some("stop"), _) => player.stop(),
        (Some(other), _) => return PlayerInput::Invalid(format!("Unknown command: {}", other)),
    };
    PlayerInput::Commands(commands)
}

fn print_player_state(player: &Player) {
    let Some(track) = player.current_track() else {
        return;
    };
    let state = if player.is_playing() { "Playing" } else { "Paused" };
    print_key_value_highlight(state, &track_title(track));
    print_key_value(
        "Position",
        &format!("{} / {}", player.elapsed_label(), player.duration_label()),
    );
    print_key_value("Volume", &player.volume().to_string());
}

fn apply_all(engine: &mut AudioEngine, commands: Vec<PlaybackCommand>) {
    for command in commands {
        if let Err(e) = engine.apply(&command) {
            print_error(&e.to_string());
        }
    }
}
