use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Audio output error: {0}")]
    Output(#[from] OutputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Engine(err) => err.user_message(),
            PlayerError::Session(err) => err.user_message(),
            PlayerError::Output(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Library(err) => err.user_message(),
            PlayerError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Engine(err) => err.recovery_suggestions(),
            PlayerError::Session(err) => err.recovery_suggestions(),
            PlayerError::Output(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Library(err) => err.recovery_suggestions(),
            PlayerError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Engine(err) => err.is_recoverable(),
            PlayerError::Session(err) => err.is_recoverable(),
            PlayerError::Output(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::Library(err) => err.is_recoverable(),
            PlayerError::Parse(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Engine(EngineError::Stalled { .. }) => ErrorSeverity::Warning,
            PlayerError::Engine(EngineError::Crashed { .. }) => ErrorSeverity::Critical,
            PlayerError::Engine(_) => ErrorSeverity::Error,
            PlayerError::Session(SessionError::NoTrackLoaded) => ErrorSeverity::Info,
            PlayerError::Session(SessionError::Engine(_)) => ErrorSeverity::Error,
            PlayerError::Session(_) => ErrorSeverity::Warning,
            PlayerError::Output(OutputError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Output(_) => ErrorSeverity::Critical,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Library(_) => ErrorSeverity::Warning,
            PlayerError::Parse(_) => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Failures of the native decoding engine, converted at the gateway boundary
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Cannot read {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Unsupported or corrupt file {path:?}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("Native call '{operation}' crashed: {reason}")]
    Crashed { operation: &'static str, reason: String },

    #[error("Native call '{operation}' did not return within {waited:?}")]
    Stalled { operation: &'static str, waited: Duration },
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Unreadable { path, .. } => {
                format!("Cannot open '{}' - the file is missing or unreadable", path.display())
            }
            EngineError::Unsupported { path, .. } => {
                format!("'{}' is not a supported or valid music file", path.display())
            }
            EngineError::Crashed { operation, .. } => {
                format!("The playback engine failed during '{}'", operation)
            }
            EngineError::Stalled { .. } => {
                "Playback stalled - the engine stopped responding".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            EngineError::Unreadable { .. } => vec![
                "Check that the file still exists and is readable".to_string(),
                "Rescan the library directory".to_string(),
            ],
            EngineError::Unsupported { .. } => vec![
                "Some systems need ROM/BIOS files - set 'asset_path' in the configuration".to_string(),
                "Skip to the next track with 'next'".to_string(),
            ],
            EngineError::Crashed { .. } => vec![
                "Open the track again".to_string(),
                "Restart the application if the problem persists".to_string(),
            ],
            EngineError::Stalled { .. } => vec![
                "Press 'play' to reopen the track".to_string(),
                "Close other applications to reduce system load".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Unreadable { .. } => false,
            EngineError::Unsupported { .. } => false,
            EngineError::Crashed { .. } => true,
            EngineError::Stalled { .. } => true,
        }
    }
}

/// Errors from transport commands on the playback session
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("No track loaded")]
    NoTrackLoaded,

    #[error("Game has no tracks")]
    EmptyGame,

    #[error("Invalid track index {index} (game has {len} tracks)")]
    InvalidTrackIndex { index: usize, len: usize },

    #[error("Load failed: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NoTrackLoaded => "Nothing is loaded - open a track first".to_string(),
            SessionError::EmptyGame => "This game has no playable tracks".to_string(),
            SessionError::InvalidTrackIndex { index, len } => {
                format!("Track number {} is not valid for a game with {} tracks", index + 1, len)
            }
            SessionError::Engine(err) => err.user_message(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            SessionError::NoTrackLoaded => vec!["Use 'open <n>' to load a track".to_string()],
            SessionError::EmptyGame => vec!["Use 'games' to pick another game".to_string()],
            SessionError::InvalidTrackIndex { .. } => vec![
                "Use 'list' to see available tracks".to_string(),
                "Track numbers start from 1".to_string(),
            ],
            SessionError::Engine(err) => err.recovery_suggestions(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::NoTrackLoaded => true,
            SessionError::EmptyGame => false,
            SessionError::InvalidTrackIndex { .. } => false,
            SessionError::Engine(err) => err.is_recoverable(),
        }
    }
}

/// Audio output device errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported sample format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),
}

impl OutputError {
    pub fn user_message(&self) -> String {
        match self {
            OutputError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            OutputError::UnsupportedFormat { format } => {
                format!("The audio device uses an unsupported sample format ({})", format)
            }
            OutputError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            OutputError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            OutputError::DeviceNotFound { .. } => vec![
                "Check that your audio device is connected and powered on".to_string(),
                "Remove 'preferred_device' from the configuration to use the default device".to_string(),
            ],
            OutputError::UnsupportedFormat { .. } => vec![
                "Select a different output device".to_string(),
            ],
            OutputError::StreamError(_) => vec![
                "Try stopping and restarting playback".to_string(),
                "Check audio device connections".to_string(),
            ],
            OutputError::InitializationFailed(_) => vec![
                "Restart the application".to_string(),
                "Run with --no-audio to use the player without a device".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            OutputError::DeviceNotFound { .. } => true,
            OutputError::UnsupportedFormat { .. } => false,
            OutputError::StreamError(_) => true,
            OutputError::InitializationFailed(_) => true,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => format!("Cannot access configuration file: {}", err),
            ConfigError::SerializationError(_) => "Failed to save configuration settings".to_string(),
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/vgmp/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Library (catalog) errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Game not found: {id}")]
    GameNotFound { id: i64 },

    #[error("Track not found: {id}")]
    TrackNotFound { id: i64 },

    #[error("Not a directory: {path:?}")]
    NotADirectory { path: PathBuf },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LibraryError {
    pub fn user_message(&self) -> String {
        match self {
            LibraryError::GameNotFound { id } => format!("Game #{} does not exist", id),
            LibraryError::TrackNotFound { id } => format!("Track #{} does not exist", id),
            LibraryError::NotADirectory { path } => {
                format!("'{}' is not a directory", path.display())
            }
            LibraryError::IoError(err) => format!("Cannot read the library: {}", err),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            LibraryError::GameNotFound { .. } | LibraryError::TrackNotFound { .. } => {
                vec!["Use 'games' and 'list' to see what is available".to_string()]
            }
            LibraryError::NotADirectory { .. } => {
                vec!["Pass a directory containing music files".to_string()]
            }
            LibraryError::IoError(_) => vec!["Check directory permissions".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, LibraryError::IoError(_))
    }
}
