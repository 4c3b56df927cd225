use std::sync::Arc;

use crate::models::{Game, PlaybackPhase, Track};

/// Position in the current game. `index` is validated against the game on open.
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    pub game: Arc<Game>,
    pub index: usize,
}

impl Cursor {
    pub fn track(&self) -> Option<&Track> {
        self.game.track(self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    Playing,
    Paused,
}

/// Internal state machine. Only `Active` carries an engine epoch, so a
/// finished or idle session can never claim an open track.
#[derive(Debug, Clone)]
pub(crate) enum SessionState {
    Idle,
    Loading {
        cursor: Cursor,
    },
    Active {
        cursor: Cursor,
        transport: Transport,
        total_samples: i64,
        epoch: u64,
    },
    Ended {
        cursor: Cursor,
    },
}

impl SessionState {
    pub fn phase(&self) -> PlaybackPhase {
        match self {
            SessionState::Idle => PlaybackPhase::Idle,
            SessionState::Loading { .. } => PlaybackPhase::Loading,
            SessionState::Active {
                transport: Transport::Playing,
                ..
            } => PlaybackPhase::Playing,
            SessionState::Active {
                transport: Transport::Paused,
                ..
            } => PlaybackPhase::Paused,
            SessionState::Ended { .. } => PlaybackPhase::Ended,
        }
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            SessionState::Idle => None,
            SessionState::Loading { cursor }
            | SessionState::Active { cursor, .. }
            | SessionState::Ended { cursor } => Some(cursor),
        }
    }

    pub fn cursor_mut(&mut self) -> Option<&mut Cursor> {
        match self {
            SessionState::Idle => None,
            SessionState::Loading { cursor }
            | SessionState::Active { cursor, .. }
            | SessionState::Ended { cursor } => Some(cursor),
        }
    }

    pub fn epoch(&self) -> Option<u64> {
        match self {
            SessionState::Active { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}
