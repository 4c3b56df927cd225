use std::path::PathBuf;

use clap::Parser;

use crate::config::PlayerConfig;
use crate::engine::timing;
use crate::sequencer::{RepeatPolicy, SequenceMode};

pub mod status;
pub use status::StatusDisplay;

/// Game music player
#[derive(Debug, Parser)]
#[command(name = "vgmp")]
#[command(about = "Plays game soundtracks from a directory of rips, one game per folder")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Library directory to scan (defaults to the configured library)
    pub directory: Option<PathBuf>,

    /// Pick the next track at random
    #[arg(long, conflicts_with = "favorites")]
    pub shuffle: bool,

    /// Only play tracks marked as favorite
    #[arg(long)]
    pub favorites: bool,

    /// Repeat policy: off, game or track
    #[arg(long)]
    pub repeat: Option<RepeatPolicy>,

    /// Engine sample rate when no audio device is used
    #[arg(long)]
    pub rate: Option<u32>,

    /// ROM/BIOS directory for the engine
    #[arg(long)]
    pub asset_path: Option<PathBuf>,

    /// Output device name
    #[arg(long)]
    pub device: Option<String>,

    /// Render without an audio device, paced in real time
    #[arg(long)]
    pub no_audio: bool,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    pub fn sequence_mode(&self) -> Option<SequenceMode> {
        if self.shuffle {
            Some(SequenceMode::Shuffle)
        } else if self.favorites {
            Some(SequenceMode::FavoritesOnly)
        } else {
            None
        }
    }

    /// Overlay command line flags on the loaded configuration
    pub fn apply_to(&self, config: &mut PlayerConfig) {
        if let Some(mode) = self.sequence_mode() {
            config.sequence_mode = mode;
        }
        if let Some(repeat) = self.repeat {
            config.repeat_policy = repeat;
        }
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if let Some(path) = &self.asset_path {
            config.asset_path = Some(Self::expand_path(&path.to_string_lossy()));
        }
        if let Some(directory) = &self.directory {
            config.library_directory = Some(Self::expand_path(&directory.to_string_lossy()));
        }
        if self.device.is_some() {
            config.preferred_device = self.device.clone();
        }
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse command from string (for interactive mode)
    pub fn parse_command(input: &str) -> Result<Command, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        if args.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        match args[0] {
            "play" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "toggle" | "p" => Ok(Command::Toggle),
            "stop" => Ok(Command::Stop),
            "next" | "n" => Ok(Command::Next),
            "prev" | "previous" => Ok(Command::Prev),
            "seek" => {
                let position = Self::required(&args, "seek", "position")?;
                Ok(Command::Seek {
                    seconds: Self::parse_time(position)?,
                })
            }
            "volume" | "vol" => {
                let value = Self::required(&args, "volume", "level")?;
                match value.parse::<u8>() {
                    Ok(level) if level <= 100 => Ok(Command::Volume { level }),
                    _ => Err(ParseError::InvalidArgument {
                        argument: "volume level".to_string(),
                        value: value.to_string(),
                        expected: "0-100".to_string(),
                    }),
                }
            }
            "bass" => Ok(Command::Bass),
            "reverb" => Ok(Command::Reverb),
            "mode" => match args.get(1) {
                None => Ok(Command::Mode(None)),
                Some(value) => value
                    .parse::<SequenceMode>()
                    .map(|mode| Command::Mode(Some(mode)))
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "mode".to_string(),
                        value: value.to_string(),
                        expected: "seq, shuffle or fav".to_string(),
                    }),
            },
            "repeat" => match args.get(1) {
                None => Ok(Command::Repeat(None)),
                Some(value) => value
                    .parse::<RepeatPolicy>()
                    .map(|repeat| Command::Repeat(Some(repeat)))
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "repeat".to_string(),
                        value: value.to_string(),
                        expected: "off, game or track".to_string(),
                    }),
            },
            "fav" | "favorite" => Ok(Command::Favorite),
            "list" | "ls" => Ok(Command::List),
            "games" => Ok(Command::Games),
            "open" => {
                let value = Self::required(&args, "open", "game number")?;
                match value.parse::<usize>() {
                    Ok(number) if number > 0 => {
                        let track = match args.get(2) {
                            Some(track) => Some(Self::parse_number(track, "track number")?),
                            None => None,
                        };
                        Ok(Command::Open { game: number, track })
                    }
                    _ => Err(ParseError::InvalidArgument {
                        argument: "game number".to_string(),
                        value: value.to_string(),
                        expected: "a number from 'games'".to_string(),
                    }),
                }
            }
            "search" | "find" => {
                if args.len() < 2 {
                    return Err(ParseError::MissingArgument {
                        command: "search".to_string(),
                        argument: "text".to_string(),
                    });
                }
                Ok(Command::Search {
                    text: args[1..].join(" "),
                })
            }
            "chips" => Ok(Command::Chips),
            "outputs" | "devices" => Ok(Command::Outputs),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            _ => Err(ParseError::UnknownCommand {
                command: args[0].to_string(),
            }),
        }
    }

    fn required<'a>(args: &[&'a str], command: &str, argument: &str) -> Result<&'a str, ParseError> {
        args.get(1).copied().ok_or_else(|| ParseError::MissingArgument {
            command: command.to_string(),
            argument: argument.to_string(),
        })
    }

    fn parse_number(value: &str, argument: &str) -> Result<usize, ParseError> {
        match value.parse::<usize>() {
            Ok(number) if number > 0 => Ok(number),
            _ => Err(ParseError::InvalidArgument {
                argument: argument.to_string(),
                value: value.to_string(),
                expected: "a positive number".to_string(),
            }),
        }
    }

    /// Parse "1:30", "90" or "90s" into whole seconds
    pub fn parse_time(time_str: &str) -> Result<i64, ParseError> {
        timing::parse_duration(time_str).ok_or_else(|| ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        })
    }

    /// Display help information
    pub fn display_help() {
        println!("vgmp - Available Commands:");
        println!();
        println!("Playback Control:");
        println!("  play              - Start or resume playback");
        println!("  pause             - Pause playback");
        println!("  toggle, p         - Toggle play/pause");
        println!("  stop              - Stop and close the track");
        println!("  next, n           - Next track");
        println!("  prev              - Previous track");
        println!("  seek <m:ss>       - Seek to position (e.g. '1:30', '90')");
        println!("  volume <0-100>    - Set volume level");
        println!();
        println!("Sound:");
        println!("  bass              - Toggle bass boost");
        println!("  reverb            - Toggle reverb");
        println!("  chips             - List the sound chips of the current track");
        println!("  outputs           - List audio output devices");
        println!();
        println!("Sequencing:");
        println!("  mode [seq|shuffle|fav]     - Set or cycle the sequence mode");
        println!("  repeat [off|game|track]    - Set or cycle the repeat policy");
        println!("  fav                        - Toggle favorite on the current track");
        println!();
        println!("Library:");
        println!("  games             - List games");
        println!("  open <n> [track]  - Open game n (optionally at a track)");
        println!("  list              - List tracks of the current game");
        println!("  search <text>     - Find tracks by title or game");
        println!();
        println!("General:");
        println!("  status            - Show current player status");
        println!("  help              - Show this help message");
        println!("  quit, exit        - Exit the player");
    }
}

/// Interactive commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    Seek { seconds: i64 },
    Volume { level: u8 },
    Bass,
    Reverb,
    /// `None` cycles to the next mode
    Mode(Option<SequenceMode>),
    /// `None` cycles to the next policy
    Repeat(Option<RepeatPolicy>),
    Favorite,
    List,
    Games,
    /// 1-based game and track numbers as listed
    Open { game: usize, track: Option<usize> },
    Search { text: String },
    Chips,
    Outputs,
    Status,
    Help,
    Quit,
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },
}


#[cfg(test)]
mod path_tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde_home() {
        let expanded = CliApp::expand_path("~/Music/VGM");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("Music/VGM"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let path = "/absolute/path/to/rips";
        assert_eq!(CliApp::expand_path(path).to_string_lossy(), path);
        assert_eq!(CliApp::expand_path("relative/rips").to_string_lossy(), "relative/rips");
    }
}
