use std::path::PathBuf;

use crate::models::PlaybackPhase;

/// Ordered notifications published by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        from: PlaybackPhase,
        to: PlaybackPhase,
    },
    TrackLoaded {
        game_id: i64,
        track_index: usize,
        title: String,
        total_samples: i64,
    },
    LoadFailed {
        path: PathBuf,
        message: String,
    },
    /// Engine fault being retried by reopening the track at `position`
    Recovering {
        attempt: u32,
        position: i64,
    },
    /// Watchdog gave up on the engine; the session is Idle and the next
    /// `play()` reopens the track where it stopped
    PlaybackStalled {
        message: String,
    },
    /// A transport call failed inside the engine
    EngineFailed {
        message: String,
    },
    EndOfQueue {
        game_id: i64,
    },
}

impl SessionEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SessionEvent::LoadFailed { .. }
                | SessionEvent::PlaybackStalled { .. }
                | SessionEvent::EngineFailed { .. }
        )
    }

    /// One-line description for the CLI
    pub fn describe(&self) -> String {
        match self {
            SessionEvent::PhaseChanged { from, to } => {
                format!("{} -> {}", from.as_str(), to.as_str())
            }
            SessionEvent::TrackLoaded { title, .. } => format!("Now playing: {}", title),
            SessionEvent::LoadFailed { message, .. } => format!("Load failed: {}", message),
            SessionEvent::Recovering { attempt, .. } => {
                format!("Engine not responding, reopening the track (attempt {})", attempt)
            }
            SessionEvent::PlaybackStalled { message } => message.clone(),
            SessionEvent::EngineFailed { message } => message.clone(),
            SessionEvent::EndOfQueue { .. } => "End of game".to_string(),
        }
    }
}
