//! Game/track catalog used by the session.
//!
//! `DirectoryLibrary` is an in-memory catalog built from a directory tree:
//! every directory holding playable files becomes one game whose tracks are
//! ordered by file name.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};

use crate::error::LibraryError;
use crate::models::{Game, Track};

/// File extensions picked up by directory scans
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "wave", "flac", "ogg", "oga", "mp3"];

const ART_FILE_NAMES: &[&str] = &["cover.png", "cover.jpg", "folder.jpg", "folder.png"];

/// Filter for `TrackLibrary::search`
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive match on track title, game name or author
    pub text: String,
    pub favorites_only: bool,
    /// Case-insensitive system/chip label
    pub system: Option<String>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn favorites() -> Self {
        Self {
            favorites_only: true,
            ..Default::default()
        }
    }
}

/// A search result: the track and the game it belongs to
#[derive(Debug, Clone)]
pub struct TrackHit {
    pub game: Arc<Game>,
    pub index: usize,
}

impl TrackHit {
    pub fn track(&self) -> Option<&Track> {
        self.game.track(self.index)
    }
}

pub trait TrackLibrary: Send + Sync {
    fn game(&self, id: i64) -> Result<Arc<Game>, LibraryError>;

    fn games(&self) -> Vec<Arc<Game>>;

    fn search(&self, query: &SearchQuery) -> Vec<TrackHit>;

    fn set_favorite(&self, track_id: i64, favorite: bool) -> Result<(), LibraryError>;

    /// Persist a probed length; a known duration is kept
    fn record_duration(&self, track_id: i64, samples: i64) -> Result<(), LibraryError>;

    fn set_art_path(&self, game_id: i64, path: &Path) -> Result<(), LibraryError>;
}

pub struct DirectoryLibrary {
    root: Option<PathBuf>,
    games: RwLock<Vec<Arc<Game>>>,
}

impl DirectoryLibrary {
    /// Catalog built from already constructed games
    pub fn from_games(games: Vec<Game>) -> Self {
        Self {
            root: None,
            games: RwLock::new(games.into_iter().map(Arc::new).collect()),
        }
    }

    /// Scan `root` recursively
    pub fn scan(root: &Path) -> Result<Self, LibraryError> {
        if !root.is_dir() {
            return Err(LibraryError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let mut dirs = Vec::new();
        Self::collect_dirs(root, &mut dirs)?;
        dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut next_track_id = 1i64;
        let games: Vec<Arc<Game>> = dirs
            .into_iter()
            .enumerate()
            .map(|(i, (dir, files))| {
                let game = Self::build_game(i as i64 + 1, &dir, files, &mut next_track_id);
                Arc::new(game)
            })
            .collect();

        info!("Scanned {:?}: {} games", root, games.len());
        Ok(Self {
            root: Some(root.to_path_buf()),
            games: RwLock::new(games),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn is_supported_format(extension: &str) -> bool {
        let ext = extension.to_lowercase();
        SUPPORTED_EXTENSIONS.contains(&ext.as_str())
    }

    /// Directories holding at least one playable file, with their files sorted
    fn collect_dirs(dir: &Path, out: &mut Vec<(PathBuf, Vec<PathBuf>)>) -> Result<(), LibraryError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_dirs(&path, out)?;
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, Self::is_supported_format)
            {
                files.push(path);
            }
        }
        if !files.is_empty() {
            files.sort();
            out.push((dir.to_path_buf(), files));
        }
        Ok(())
    }

    fn build_game(id: i64, dir: &Path, files: Vec<PathBuf>, next_track_id: &mut i64) -> Game {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown Game")
            .to_string();
        let system = files
            .first()
            .and_then(|f| f.extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_uppercase())
            .unwrap_or_default();

        let tracks = files
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let title = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let track = Track::new(*next_track_id, path, title, i as u32 + 1);
                *next_track_id += 1;
                track
            })
            .collect();

        let mut game = Game::new(id, name).with_system(system).with_tracks(tracks);
        game.art_path = ART_FILE_NAMES
            .iter()
            .map(|n| dir.join(n))
            .find(|p| p.is_file());
        debug!("Game {} '{}': {} tracks", id, game.name, game.len());
        game
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Game>>> {
        self.games.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Game>>> {
        self.games.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_track<F>(&self, track_id: i64, update: F) -> Result<(), LibraryError>
    where
        F: FnOnce(&mut Track),
    {
        let mut games = self.write();
        for game in games.iter_mut() {
            if let Some(index) = game.index_of(track_id) {
                update(&mut Arc::make_mut(game).tracks[index]);
                return Ok(());
            }
        }
        Err(LibraryError::TrackNotFound { id: track_id })
    }
}

impl TrackLibrary for DirectoryLibrary {
    fn game(&self, id: i64) -> Result<Arc<Game>, LibraryError> {
        self.read()
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or(LibraryError::GameNotFound { id })
    }

    fn games(&self) -> Vec<Arc<Game>> {
        self.read().clone()
    }

    fn search(&self, query: &SearchQuery) -> Vec<TrackHit> {
        let text = query.text.trim().to_lowercase();
        let system = query.system.as_ref().map(|s| s.to_lowercase());

        let games = self.read();
        let mut hits = Vec::new();
        for game in games.iter() {
            if let Some(system) = &system {
                if !game.system.to_lowercase().contains(system.as_str()) {
                    continue;
                }
            }
            let game_matches = game.name.to_lowercase().contains(&text)
                || game.author.to_lowercase().contains(&text);
            for (index, track) in game.tracks.iter().enumerate() {
                if query.favorites_only && !track.favorite {
                    continue;
                }
                if text.is_empty() || game_matches || track.title.to_lowercase().contains(&text) {
                    hits.push(TrackHit {
                        game: Arc::clone(game),
                        index,
                    });
                }
            }
        }
        hits
    }

    fn set_favorite(&self, track_id: i64, favorite: bool) -> Result<(), LibraryError> {
        self.update_track(track_id, |track| track.favorite = favorite)
    }

    fn record_duration(&self, track_id: i64, samples: i64) -> Result<(), LibraryError> {
        self.update_track(track_id, |track| {
            track.resolve_duration(samples);
        })
    }

    fn set_art_path(&self, game_id: i64, path: &Path) -> Result<(), LibraryError> {
        let mut games = self.write();
        let game = games
            .iter_mut()
            .find(|g| g.id == game_id)
            .ok_or(LibraryError::GameNotFound { id: game_id })?;
        Arc::make_mut(game).art_path = Some(path.to_path_buf());
        Ok(())
    }
}
