use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sequencer::{RepeatPolicy, SequenceMode};

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Engine output rate; replaced by the device rate when a device is open
    pub sample_rate: u32,
    pub buffer_frames: usize,
    /// Render watchdog in milliseconds
    pub watchdog_ms: u64,
    /// ROM/BIOS directory handed to the engine
    pub asset_path: Option<PathBuf>,
    pub default_volume: f32,
    pub sequence_mode: SequenceMode,
    pub repeat_policy: RepeatPolicy,
    pub autoplay: bool,
    pub bass: bool,
    pub reverb: bool,
    pub max_stall_recoveries: u32,
    pub preferred_device: Option<String>,
    pub library_directory: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_frames: 1024,
            watchdog_ms: 500,
            asset_path: None,
            default_volume: 0.8,
            sequence_mode: SequenceMode::Sequential,
            repeat_policy: RepeatPolicy::Off,
            autoplay: true,
            bass: false,
            reverb: false,
            max_stall_recoveries: crate::error_recovery::DEFAULT_MAX_RECOVERY_ATTEMPTS,
            preferred_device: None,
            library_directory: None,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load `~/.config/vgmp/config.toml`, using defaults when it is missing or unreadable
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Ok(Self::with_path(config_path))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!("Ignoring configuration at {:?}: {}", config_path, err);
                PlayerConfig::default()
            }
        };
        Self {
            config,
            config_path,
        }
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn set_sequence_mode(&mut self, mode: SequenceMode) -> Result<(), ConfigError> {
        self.config.sequence_mode = mode;
        self.save_config()
    }

    pub fn set_repeat_policy(&mut self, repeat: RepeatPolicy) -> Result<(), ConfigError> {
        self.config.repeat_policy = repeat;
        self.save_config()
    }

    pub fn set_asset_path(&mut self, path: Option<PathBuf>) -> Result<(), ConfigError> {
        self.config.asset_path = path;
        self.save_config()
    }

    pub fn set_library_directory(&mut self, directory: Option<PathBuf>) -> Result<(), ConfigError> {
        self.config.library_directory = directory;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("vgmp");

        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            debug!("No configuration at {:?}, using defaults", path);
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));
        (config_manager, temp_dir)
    }

    #[test]
    fn test_player_config_default() {
        let config = PlayerConfig::default();

        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.buffer_frames, 1024);
        assert_eq!(config.watchdog_ms, 500);
        assert_eq!(config.default_volume, 0.8);
        assert_eq!(config.sequence_mode, SequenceMode::Sequential);
        assert_eq!(config.repeat_policy, RepeatPolicy::Off);
        assert!(config.autoplay);
        assert!(!config.bass && !config.reverb);
        assert_eq!(config.max_stall_recoveries, 3);
        assert_eq!(config.preferred_device, None);
    }

    #[test]
    fn test_config_serialization() {
        let config = PlayerConfig {
            sample_rate: 48_000,
            asset_path: Some(PathBuf::from("/roms")),
            sequence_mode: SequenceMode::Shuffle,
            repeat_policy: RepeatPolicy::Game,
            preferred_device: Some("Test Device".to_string()),
            ..Default::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("sequence_mode = \"shuffle\""));
        let deserialized: PlayerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: PlayerConfig = toml::from_str("default_volume = 0.3\nrepeat_policy = \"track\"\n").unwrap();
        assert_eq!(config.default_volume, 0.3);
        assert_eq!(config.repeat_policy, RepeatPolicy::Track);
        assert_eq!(config.buffer_frames, 1024);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.default_volume = 0.6;
        config_manager.config.buffer_frames = 2048;
        config_manager.save_config().unwrap();

        let loaded_config = ConfigManager::load_config(config_manager.config_path()).unwrap();
        assert_eq!(loaded_config.default_volume, 0.6);
        assert_eq!(loaded_config.buffer_frames, 2048);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigManager::load_config(&temp_dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other.map(|_| ())),
        }

        // the manager falls back to defaults
        let manager = ConfigManager::with_path(config_path);
        assert_eq!(manager.get_config(), &PlayerConfig::default());
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager
            .update_config(|config| {
                config.default_volume = 0.9;
                config.watchdog_ms = 250;
            })
            .unwrap();

        let loaded_config = ConfigManager::load_config(config_manager.config_path()).unwrap();
        assert_eq!(loaded_config.default_volume, 0.9);
        assert_eq!(loaded_config.watchdog_ms, 250);
    }

    #[test]
    fn test_setters_persist() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_volume(1.5).unwrap();
        config_manager.set_sequence_mode(SequenceMode::FavoritesOnly).unwrap();
        config_manager.set_repeat_policy(RepeatPolicy::Track).unwrap();
        config_manager.set_asset_path(Some(PathBuf::from("/bios"))).unwrap();

        let loaded = ConfigManager::load_config(config_manager.config_path()).unwrap();
        assert_eq!(loaded.default_volume, 1.0);
        assert_eq!(loaded.sequence_mode, SequenceMode::FavoritesOnly);
        assert_eq!(loaded.repeat_policy, RepeatPolicy::Track);
        assert_eq!(loaded.asset_path, Some(PathBuf::from("/bios")));
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();
        config_manager.set_preferred_device(Some("USB DAC".to_string())).unwrap();
        config_manager.set_library_directory(Some(PathBuf::from("/music"))).unwrap();

        config_manager.reset_to_defaults().unwrap();
        assert_eq!(config_manager.get_config(), &PlayerConfig::default());
        let loaded = ConfigManager::load_config(config_manager.config_path()).unwrap();
        assert_eq!(loaded.preferred_device, None);
    }
}
