use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::models::Game;

/// How the next track of a game is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    #[default]
    Sequential,
    Shuffle,
    FavoritesOnly,
}

impl SequenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceMode::Sequential => "sequential",
            SequenceMode::Shuffle => "shuffle",
            SequenceMode::FavoritesOnly => "favorites",
        }
    }

    /// Next mode in the cycle used by the `mode` command without argument
    pub fn cycle(self) -> Self {
        match self {
            SequenceMode::Sequential => SequenceMode::Shuffle,
            SequenceMode::Shuffle => SequenceMode::FavoritesOnly,
            SequenceMode::FavoritesOnly => SequenceMode::Sequential,
        }
    }
}

impl fmt::Display for SequenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SequenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "seq" | "sequential" | "normal" => Ok(SequenceMode::Sequential),
            "shuffle" | "random" => Ok(SequenceMode::Shuffle),
            "fav" | "favs" | "favorites" | "favorites_only" => Ok(SequenceMode::FavoritesOnly),
            other => Err(format!("Unknown sequence mode '{}'", other)),
        }
    }
}

/// What happens at the boundaries of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    #[default]
    Off,
    Game,
    Track,
}

impl RepeatPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatPolicy::Off => "off",
            RepeatPolicy::Game => "game",
            RepeatPolicy::Track => "track",
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            RepeatPolicy::Off => RepeatPolicy::Game,
            RepeatPolicy::Game => RepeatPolicy::Track,
            RepeatPolicy::Track => RepeatPolicy::Off,
        }
    }
}

impl fmt::Display for RepeatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(RepeatPolicy::Off),
            "game" | "all" => Ok(RepeatPolicy::Game),
            "track" | "one" => Ok(RepeatPolicy::Track),
            other => Err(format!("Unknown repeat policy '{}'", other)),
        }
    }
}

/// Why the sequencer is asked for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The current track finished playing
    Auto,
    /// The user asked to skip
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTrack {
    Track(usize),
    EndOfGame,
}

impl NextTrack {
    pub fn index(self) -> Option<usize> {
        match self {
            NextTrack::Track(index) => Some(index),
            NextTrack::EndOfGame => None,
        }
    }
}

/// Chooses the next track within one game
pub struct TrackSequencer {
    mode: SequenceMode,
    repeat: RepeatPolicy,
    rng: StdRng,
    /// Shuffle cycle: indices already played in `cycle_game`
    played: HashSet<usize>,
    cycle_game: Option<i64>,
}

impl TrackSequencer {
    pub fn new(mode: SequenceMode, repeat: RepeatPolicy) -> Self {
        Self::with_rng(mode, repeat, StdRng::from_entropy())
    }

    /// Deterministic shuffle order
    pub fn with_seed(mode: SequenceMode, repeat: RepeatPolicy, seed: u64) -> Self {
        Self::with_rng(mode, repeat, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mode: SequenceMode, repeat: RepeatPolicy, rng: StdRng) -> Self {
        Self {
            mode,
            repeat,
            rng,
            played: HashSet::new(),
            cycle_game: None,
        }
    }

    pub fn mode(&self) -> SequenceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SequenceMode) {
        if mode != self.mode {
            self.mode = mode;
            self.played.clear();
        }
    }

    pub fn repeat(&self) -> RepeatPolicy {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatPolicy) {
        self.repeat = repeat;
    }

    /// Record that `index` of `game` started playing
    pub fn mark_played(&mut self, game: &Game, index: usize) {
        if self.cycle_game != Some(game.id) {
            self.cycle_game = Some(game.id);
            self.played.clear();
        }
        self.played.insert(index);
    }

    /// Track to play after `current`
    pub fn next(&mut self, game: &Game, current: usize, advance: Advance) -> NextTrack {
        if game.is_empty() {
            return NextTrack::EndOfGame;
        }
        if advance == Advance::Auto && self.repeat == RepeatPolicy::Track && current < game.len() {
            return NextTrack::Track(current);
        }
        let wrap = self.repeat == RepeatPolicy::Game;

        match self.mode {
            SequenceMode::Sequential => {
                if current + 1 < game.len() {
                    NextTrack::Track(current + 1)
                } else if wrap {
                    NextTrack::Track(0)
                } else {
                    NextTrack::EndOfGame
                }
            }
            SequenceMode::FavoritesOnly => {
                let favorites: Vec<usize> = game
                    .tracks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.favorite)
                    .map(|(i, _)| i)
                    .collect();
                match favorites.iter().find(|&&i| i > current) {
                    Some(&i) => NextTrack::Track(i),
                    None if wrap && !favorites.is_empty() => NextTrack::Track(favorites[0]),
                    None => NextTrack::EndOfGame,
                }
            }
            SequenceMode::Shuffle => self.next_shuffled(game, current, wrap),
        }
    }

    fn next_shuffled(&mut self, game: &Game, current: usize, wrap: bool) -> NextTrack {
        if self.cycle_game != Some(game.id) {
            self.cycle_game = Some(game.id);
            self.played.clear();
        }
        self.played.insert(current);

        let mut candidates: Vec<usize> = (0..game.len())
            .filter(|i| !self.played.contains(i))
            .collect();
        if candidates.is_empty() {
            if !wrap {
                return NextTrack::EndOfGame;
            }
            // new cycle, never starting with the track that just played
            self.played.clear();
            candidates = (0..game.len()).filter(|&i| i != current).collect();
            if candidates.is_empty() {
                candidates.push(current);
            }
        }

        match candidates.choose(&mut self.rng) {
            Some(&index) => NextTrack::Track(index),
            None => NextTrack::EndOfGame,
        }
    }

    /// Positionally previous track, `None` at the first track unless the game repeats
    pub fn previous(&self, game: &Game, current: usize) -> Option<usize> {
        if game.is_empty() {
            None
        } else if current > 0 {
            Some((current - 1).min(game.len() - 1))
        } else if self.repeat == RepeatPolicy::Game {
            Some(game.len() - 1)
        } else {
            None
        }
    }
}
