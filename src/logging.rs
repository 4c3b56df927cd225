use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Render cycles slower than this are reported
pub const SLOW_RENDER_THRESHOLD: Duration = Duration::from_millis(50);

const MAX_EVENTS: usize = 1000;

/// Playback event for logging and debugging
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    TrackLoaded,
    LoadFailed,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    Seek,
    EndOfTrack,
    EndOfQueue,
    Stall,
    Recovery,
    SlowRender,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::TrackLoaded => "TRACK_LOADED",
            PlaybackEventType::LoadFailed => "LOAD_FAILED",
            PlaybackEventType::PlaybackStarted => "PLAYBACK_STARTED",
            PlaybackEventType::PlaybackPaused => "PLAYBACK_PAUSED",
            PlaybackEventType::PlaybackStopped => "PLAYBACK_STOPPED",
            PlaybackEventType::Seek => "SEEK",
            PlaybackEventType::EndOfTrack => "END_OF_TRACK",
            PlaybackEventType::EndOfQueue => "END_OF_QUEUE",
            PlaybackEventType::Stall => "STALL",
            PlaybackEventType::Recovery => "RECOVERY",
            PlaybackEventType::SlowRender => "SLOW_RENDER",
        }
    }
}

/// Logger for playback operations with a bounded in-memory history
#[derive(Clone)]
pub struct PlaybackLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for PlaybackLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: MAX_EVENTS,
        }
    }

    /// Initialize env_logger from `VGMP_LOG_LEVEL` (default `info`)
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("VGMP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        let filter = match log_level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        };
        builder.filter_level(filter);
        builder.try_init()?;

        info!("Logging initialized with level: {}", filter);
        Ok(())
    }

    pub fn log_event(&self, event_type: PlaybackEventType, details: String, duration: Option<Duration>) {
        match event_type {
            PlaybackEventType::TrackLoaded
            | PlaybackEventType::PlaybackStarted
            | PlaybackEventType::PlaybackPaused
            | PlaybackEventType::PlaybackStopped
            | PlaybackEventType::EndOfQueue => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::Seek | PlaybackEventType::EndOfTrack => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::Recovery => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::SlowRender => {
                warn!("[{}] {} (took: {:?})", event_type.as_str(), details, duration);
            }
            PlaybackEventType::LoadFailed | PlaybackEventType::Stall => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let event = PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_track_loaded(&self, title: &str, total_samples: i64, load_time: Duration) {
        self.log_event(
            PlaybackEventType::TrackLoaded,
            format!("Loaded '{}' ({} samples)", title, total_samples),
            Some(load_time),
        );
    }

    pub fn log_load_failed(&self, path: &str, reason: &str) {
        self.log_event(
            PlaybackEventType::LoadFailed,
            format!("Cannot load '{}': {}", path, reason),
            None,
        );
    }

    pub fn log_playback_started(&self, title: &str) {
        self.log_event(
            PlaybackEventType::PlaybackStarted,
            format!("Playing: {}", title),
            None,
        );
    }

    pub fn log_playback_paused(&self, position: i64) {
        self.log_event(
            PlaybackEventType::PlaybackPaused,
            format!("Paused at sample {}", position),
            None,
        );
    }

    pub fn log_playback_stopped(&self, reason: &str) {
        self.log_event(
            PlaybackEventType::PlaybackStopped,
            format!("Playback stopped: {}", reason),
            None,
        );
    }

    pub fn log_seek(&self, from: i64, to: i64, seek_time: Duration) {
        self.log_event(
            PlaybackEventType::Seek,
            format!("Seek from sample {} to {}", from, to),
            Some(seek_time),
        );
    }

    pub fn log_end_of_track(&self, title: &str) {
        self.log_event(
            PlaybackEventType::EndOfTrack,
            format!("Finished '{}'", title),
            None,
        );
    }

    pub fn log_end_of_queue(&self, game: &str) {
        self.log_event(
            PlaybackEventType::EndOfQueue,
            format!("No more tracks in '{}'", game),
            None,
        );
    }

    pub fn log_stall(&self, waited: Duration, recovered: bool) {
        self.log_event(
            PlaybackEventType::Stall,
            format!("Engine stalled (recovery attempted: {})", recovered),
            Some(waited),
        );
    }

    pub fn log_recovery(&self, attempt: u32, position: i64) {
        self.log_event(
            PlaybackEventType::Recovery,
            format!("Reopening track at sample {} (attempt {})", position, attempt),
            None,
        );
    }

    /// Record a render cycle's duration, reporting it when above `SLOW_RENDER_THRESHOLD`
    pub fn record_render_time(&self, frames: usize, elapsed: Duration) {
        if elapsed > SLOW_RENDER_THRESHOLD {
            self.log_event(
                PlaybackEventType::SlowRender,
                format!("Rendering {} frames took {}ms", frames, elapsed.as_millis()),
                Some(elapsed),
            );
        } else {
            trace!("Rendered {} frames in {:?}", frames, elapsed);
        }
    }

    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let Ok(events) = self.events.lock() else {
            return Vec::new();
        };
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        let Ok(events) = self.events.lock() else {
            return stats;
        };
        for event in events.iter() {
            match event.event_type {
                PlaybackEventType::TrackLoaded => stats.tracks_loaded += 1,
                PlaybackEventType::LoadFailed => stats.load_failures += 1,
                PlaybackEventType::Seek => stats.seeks += 1,
                PlaybackEventType::Stall => stats.stalls += 1,
                PlaybackEventType::SlowRender => stats.slow_renders += 1,
                _ => {}
            }
        }
        stats.total_events = events.len();
        stats
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventStatistics {
    pub total_events: usize,
    pub tracks_loaded: usize,
    pub load_failures: usize,
    pub seeks: usize,
    pub stalls: usize,
    pub slow_renders: usize,
}

/// Measures how long an operation takes
pub struct OperationTimer {
    start_time: Instant,
    operation_name: &'static str,
}

impl OperationTimer {
    pub fn new(operation_name: &'static str) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed '{}' in {:?}", self.operation_name, duration);
        duration
    }
}
