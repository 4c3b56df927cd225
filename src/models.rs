use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::tags::Tags;
use crate::engine::timing;
use crate::sequencer::{RepeatPolicy, SequenceMode};

/// A single playable tune inside a game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: i64,
    pub game_id: i64,
    pub path: PathBuf,
    pub title: String,
    pub ordinal: u32,
    /// Length in output samples, `UNKNOWN_DURATION` until probed
    pub duration_samples: i64,
    pub favorite: bool,
    /// Tune index inside a multi-tune container, `NO_SUBTRACK` otherwise
    pub subtrack: i32,
}

impl Track {
    pub const UNKNOWN_DURATION: i64 = -1;
    pub const NO_SUBTRACK: i32 = -1;

    pub fn new(id: i64, path: impl Into<PathBuf>, title: impl Into<String>, ordinal: u32) -> Self {
        Self {
            id,
            game_id: 0,
            path: path.into(),
            title: title.into(),
            ordinal,
            duration_samples: Self::UNKNOWN_DURATION,
            favorite: false,
            subtrack: Self::NO_SUBTRACK,
        }
    }

    /// Tune index inside a multi-tune file; negative means a plain file
    pub fn with_subtrack(mut self, subtrack: i32) -> Self {
        self.subtrack = subtrack.max(Self::NO_SUBTRACK);
        self
    }

    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }

    pub fn with_duration(mut self, samples: i64) -> Self {
        self.duration_samples = samples;
        self
    }

    pub fn has_duration(&self) -> bool {
        self.duration_samples >= 0
    }

    /// Record a probed length. A resolved duration is never overwritten.
    pub fn resolve_duration(&mut self, samples: i64) -> bool {
        if self.has_duration() || samples < 0 {
            return false;
        }
        self.duration_samples = samples;
        true
    }

    pub fn subtrack_index(&self) -> Option<u32> {
        u32::try_from(self.subtrack).ok()
    }

    /// Title, falling back to the file name
    pub fn display_name(&self) -> String {
        if !self.title.trim().is_empty() {
            return self.title.clone();
        }
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown Track")
            .to_string()
    }

    pub fn duration_seconds(&self, sample_rate: u32) -> i64 {
        timing::duration_seconds(self.duration_samples, sample_rate as i64)
    }
}

/// A game (album) owning an ordered list of tracks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub system: String,
    pub author: String,
    pub year: Option<u16>,
    pub source_archive: Option<PathBuf>,
    pub art_path: Option<PathBuf>,
    pub favorite: bool,
    pub tracks: Vec<Track>,
}

impl Game {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            system: String::new(),
            author: String::new(),
            year: None,
            source_archive: None,
            art_path: None,
            favorite: false,
            tracks: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_source_archive(mut self, archive: impl AsRef<Path>) -> Self {
        self.source_archive = Some(archive.as_ref().to_path_buf());
        self
    }

    /// Attach tracks, binding each to this game and ordering them by ordinal
    pub fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = tracks;
        for track in &mut self.tracks {
            track.game_id = self.id;
        }
        self.tracks.sort_by_key(|t| t.ordinal);
        self
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn index_of(&self, track_id: i64) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            "Unknown Game".to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Externally observed transport phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackPhase {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl PlaybackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "Idle",
            PlaybackPhase::Loading => "Loading",
            PlaybackPhase::Playing => "Playing",
            PlaybackPhase::Paused => "Paused",
            PlaybackPhase::Ended => "Ended",
        }
    }

    /// Whether a track is open in the engine in this phase
    pub fn has_open_track(&self) -> bool {
        matches!(self, PlaybackPhase::Playing | PlaybackPhase::Paused)
    }
}

/// Effect switches forwarded opaquely to the native engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectToggles {
    pub bass: bool,
    pub reverb: bool,
}

/// Published playback state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub game: Option<Arc<Game>>,
    pub track_index: Option<usize>,
    pub position: i64,
    pub total_samples: i64,
    pub sample_rate: u32,
    pub volume: f32,
    pub effects: EffectToggles,
    pub tags: Option<Tags>,
    /// Position reporting is suspended while a seek is in flight
    pub seeking: bool,
    /// Engine epoch of the open track, `None` when nothing is open
    pub epoch: Option<u64>,
    pub sequence_mode: SequenceMode,
    pub repeat: RepeatPolicy,
}

impl PlaybackSnapshot {
    pub fn idle(sample_rate: u32, volume: f32, effects: EffectToggles) -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            game: None,
            track_index: None,
            position: 0,
            total_samples: 0,
            sample_rate,
            volume,
            effects,
            tags: None,
            seeking: false,
            epoch: None,
            sequence_mode: SequenceMode::default(),
            repeat: RepeatPolicy::default(),
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        let game = self.game.as_ref()?;
        game.track(self.track_index?)
    }

    pub fn duration_seconds(&self) -> i64 {
        timing::duration_seconds(self.total_samples, self.sample_rate as i64)
    }

    pub fn position_seconds(&self) -> i64 {
        timing::duration_seconds(self.position, self.sample_rate as i64)
    }

    /// Progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.total_samples > 0 {
            (self.position as f32 / self.total_samples as f32).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Display title: tags first, then the track entry
    pub fn title(&self) -> String {
        match (&self.tags, self.current_track()) {
            (Some(tags), Some(track)) if !tags.has_track_title() => track.display_name(),
            (Some(tags), _) => tags.display_title(),
            (None, Some(track)) => track.display_name(),
            (None, None) => "Unknown Track".to_string(),
        }
    }
}
