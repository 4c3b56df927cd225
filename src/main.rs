use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{broadcast, mpsc};

use vgmp::audio::{list_output_devices, CpalSink};
use vgmp::cli::{CliApp, Command, StatusDisplay};
use vgmp::config::{ConfigManager, PlayerConfig};
use vgmp::engine::timing::seconds_to_samples;
use vgmp::engine::{EngineGateway, SymphoniaEngine};
use vgmp::error::{LibraryError, PlayerError};
use vgmp::library::{DirectoryLibrary, SearchQuery, TrackLibrary};
use vgmp::logging::PlaybackLogger;
use vgmp::render::{AudioSink, NullSink, RenderConfig, RenderHandle, RenderLoop};
use vgmp::session::{PlaybackSession, SessionConfig, SessionEvent};

/// Owns the session, the render task and the audio output
pub struct AppController {
    session: Arc<PlaybackSession>,
    library: Arc<DirectoryLibrary>,
    render: Option<RenderHandle>,
    // keeps the device stream alive
    output: Option<Arc<CpalSink>>,
    config_manager: ConfigManager,
}

impl AppController {
    pub async fn new(cli: &CliApp) -> Result<Self, PlayerError> {
        if std::env::var("VGMP_LOG_LEVEL").is_err() {
            std::env::set_var("VGMP_LOG_LEVEL", "warn");
        }
        if let Err(e) = PlaybackLogger::init() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let mut config_manager = ConfigManager::new()?;
        let mut config = config_manager.get_config().clone();
        cli.apply_to(&mut config);

        let directory = config
            .library_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let library = Arc::new(DirectoryLibrary::scan(&directory)?);
        info!("Library at {:?}: {} games", directory, library.games().len());

        let (sink, output) = Self::open_output(cli.no_audio, &mut config);
        let logger = PlaybackLogger::new();

        let gateway = EngineGateway::new(SymphoniaEngine::new(config.sample_rate));
        gateway.set_sample_rate(config.sample_rate).await?;
        if let Some(asset_path) = &config.asset_path {
            gateway.set_asset_search_path(asset_path.clone()).await?;
        }

        let session = Arc::new(
            PlaybackSession::new(gateway, SessionConfig::from(&config), logger.clone())
                .with_library(Arc::clone(&library) as Arc<dyn TrackLibrary>),
        );
        let render = RenderLoop::new(
            Arc::clone(&session),
            sink,
            RenderConfig::from(&config),
            logger,
        )
        .spawn();

        // remember the directory for the next start
        config_manager.update_config(|saved| {
            saved.library_directory = config.library_directory.clone();
        })?;

        Ok(Self {
            session,
            library,
            render: Some(render),
            output,
            config_manager,
        })
    }

    /// Audio device, or a real-time null sink when none is wanted or available.
    /// The engine rate follows the device rate.
    fn open_output(no_audio: bool, config: &mut PlayerConfig) -> (Arc<dyn AudioSink>, Option<Arc<CpalSink>>) {
        if !no_audio {
            match CpalSink::start(config.preferred_device.as_deref(), config.buffer_frames) {
                Ok(sink) => {
                    config.sample_rate = sink.sample_rate();
                    let sink = Arc::new(sink);
                    return (Arc::clone(&sink) as Arc<dyn AudioSink>, Some(sink));
                }
                Err(e) => {
                    let e = PlayerError::from(e);
                    StatusDisplay::display_simple_error(&e);
                    warn!("Continuing without audio output");
                }
            }
        }
        let sink = NullSink::new(config.sample_rate, config.buffer_frames * 4);
        (Arc::new(sink), None)
    }

    /// Open the first game of the library, resolving track lengths first
    pub async fn open_first_game(&self) -> Result<(), PlayerError> {
        let Some(game) = self.library.games().into_iter().next() else {
            println!("No playable files found");
            return Ok(());
        };
        self.open_game(game, 0).await
    }

    async fn open_game(&self, game: Arc<vgmp::models::Game>, index: usize) -> Result<(), PlayerError> {
        let game = self.session.resolve_durations(game).await;
        self.session.open(game, index, true).await?;
        Ok(())
    }

    /// Execute a single command
    pub async fn execute_command(&mut self, command: Command) -> Result<(), PlayerError> {
        match command {
            Command::Play => self.session.play().await?,
            Command::Pause => self.session.pause().await?,
            Command::Toggle => self.session.toggle().await?,
            Command::Stop => {
                self.session.stop().await?;
                println!("OK: Stopped");
            }
            Command::Next => self.session.next().await?,
            Command::Prev => self.session.previous().await?,
            Command::Seek { seconds } => {
                let rate = self.session.snapshot().sample_rate;
                let position = self.session.seek(seconds_to_samples(seconds, rate)).await?;
                println!(
                    "Seeked to: {}",
                    vgmp::engine::timing::format_duration(position / rate.max(1) as i64)
                );
            }
            Command::Volume { level } => {
                let volume = self.session.set_volume(level as f32 / 100.0).await;
                self.config_manager.set_volume(volume)?;
                println!("Volume: {}%", level);
            }
            Command::Bass => {
                let on = self.session.toggle_bass().await;
                self.config_manager.update_config(|config| config.bass = on)?;
                println!("Bass: {}", if on { "on" } else { "off" });
            }
            Command::Reverb => {
                let on = self.session.toggle_reverb().await;
                self.config_manager.update_config(|config| config.reverb = on)?;
                println!("Reverb: {}", if on { "on" } else { "off" });
            }
            Command::Mode(mode) => {
                let mode = mode.unwrap_or_else(|| self.session.snapshot().sequence_mode.cycle());
                self.session.set_sequence_mode(mode).await;
                self.config_manager.set_sequence_mode(mode)?;
                println!("Mode: {}", mode);
            }
            Command::Repeat(repeat) => {
                let repeat = repeat.unwrap_or_else(|| self.session.snapshot().repeat.cycle());
                self.session.set_repeat_policy(repeat).await;
                self.config_manager.set_repeat_policy(repeat)?;
                println!("Repeat: {}", repeat);
            }
            Command::Favorite => {
                let favorite = self.session.toggle_favorite().await?;
                println!("{}", if favorite { "★ Added to favorites" } else { "Removed from favorites" });
            }
            Command::List => {
                let snapshot = self.session.snapshot();
                match &snapshot.game {
                    Some(game) => StatusDisplay::display_tracks(game, snapshot.track_index, snapshot.sample_rate),
                    None => println!("No game open"),
                }
            }
            Command::Games => {
                let current = self.session.snapshot().game.map(|game| game.id);
                StatusDisplay::display_games(&self.library.games(), current);
            }
            Command::Open { game, track } => {
                let games = self.library.games();
                let selected = games.get(game - 1).cloned().ok_or(LibraryError::GameNotFound {
                    id: game as i64,
                })?;
                self.open_game(selected, track.map_or(0, |t| t - 1)).await?;
            }
            Command::Search { text } => {
                StatusDisplay::display_search_results(&self.library.search(&SearchQuery::text(text)));
            }
            Command::Chips => {
                StatusDisplay::display_chips(&self.session.devices().await?);
            }
            Command::Outputs => {
                let current = self.output.as_ref().map(|sink| sink.device_name().to_string());
                StatusDisplay::display_outputs(&list_output_devices()?, current.as_deref());
            }
            Command::Status => StatusDisplay::display_full_status(&self.session.snapshot()),
            Command::Help => CliApp::display_help(),
            Command::Quit => {}
        }
        Ok(())
    }

    /// Interactive loop: stdin lines, session events and a 100ms status tick
    pub async fn run_interactive_mode(&mut self) -> Result<(), PlayerError> {
        println!("vgmp - type 'help' for commands");

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_flag_clone = Arc::clone(&shutdown_flag);
        if let Err(e) = ctrlc::set_handler(move || {
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut events = self.session.events();
        let spectrum = self.render.as_ref().map(|render| render.spectrum());

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                println!("\nReceived interrupt signal. Shutting down gracefully...");
                break;
            }

            tokio::select! {
                biased;

                line = rx.recv() => {
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match CliApp::parse_command(&line) {
                        Ok(Command::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(command) => {
                            if let Err(e) = self.execute_command(command).await {
                                Self::report_error(&e);
                            }
                        }
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(SessionEvent::PhaseChanged { .. }) => {}
                        Ok(event) => StatusDisplay::display_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Missed {} session events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = interval.tick() => {
                    let bins = spectrum.as_ref().map(|rx| rx.borrow().clone()).unwrap_or_default();
                    StatusDisplay::display_position_update(&self.session.snapshot(), &bins);
                }
            }
        }

        self.shutdown().await
    }

    fn report_error(error: &PlayerError) {
        match error.severity() {
            vgmp::error::ErrorSeverity::Info => info!("{}", error),
            vgmp::error::ErrorSeverity::Warning => warn!("{}", error),
            _ => error!("{}", error),
        }
        StatusDisplay::display_error(error);
    }

    /// Stop playback, stop the render task and save settings
    pub async fn shutdown(&mut self) -> Result<(), PlayerError> {
        println!("Shutting down...");

        if let Err(e) = self.session.stop().await {
            warn!("Error stopping playback: {}", e);
        }
        if let Some(render) = self.render.take() {
            render.shutdown().await;
        }

        let volume = self.session.snapshot().volume;
        if let Err(e) = self.config_manager.set_volume(volume) {
            eprintln!("Warning: Error saving configuration: {}", e);
        }

        println!("Shutdown complete.");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), PlayerError> {
    let cli = CliApp::parse();

    let mut app = match AppController::new(&cli).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.open_first_game().await {
        AppController::report_error(&e);
    }

    if let Err(e) = app.run_interactive_mode().await {
        AppController::report_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
    Ok(())
}
