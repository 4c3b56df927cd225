use crate::error::{EngineError, PlayerError};
use crate::logging::PlaybackLogger;
use log::{info, warn};
use std::collections::HashMap;

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Bounded automatic recovery from engine faults.
///
/// Each fault kind gets `max_recovery_attempts` retries; a successful track
/// load clears the counters.
pub struct ErrorRecoveryManager {
    logger: PlaybackLogger,
    recovery_attempts: HashMap<String, u32>,
    max_recovery_attempts: u32,
}

impl ErrorRecoveryManager {
    pub fn new(logger: PlaybackLogger) -> Self {
        Self::with_max_attempts(logger, DEFAULT_MAX_RECOVERY_ATTEMPTS)
    }

    pub fn with_max_attempts(logger: PlaybackLogger, max_recovery_attempts: u32) -> Self {
        Self {
            logger,
            recovery_attempts: HashMap::new(),
            max_recovery_attempts,
        }
    }

    pub fn max_recovery_attempts(&self) -> u32 {
        self.max_recovery_attempts
    }

    /// Decide how to react to `error`, counting the attempt
    pub fn attempt_recovery(&mut self, error: &PlayerError) -> RecoveryResult {
        let error_key = Self::error_key(error);
        let attempts = self.recovery_attempts.get(&error_key).copied().unwrap_or(0) + 1;

        if attempts > self.max_recovery_attempts {
            warn!(
                "Maximum recovery attempts ({}) exceeded for error: {}",
                self.max_recovery_attempts, error
            );
            return RecoveryResult::Failed("Maximum recovery attempts exceeded".to_string());
        }

        let result = match error {
            PlayerError::Engine(engine_err) => self.recover_engine_error(engine_err),
            PlayerError::Session(_) => {
                RecoveryResult::Failed("Session errors require a new command".to_string())
            }
            PlayerError::Output(_) => {
                RecoveryResult::Retry("Audio output failed. Restart playback to reopen the device".to_string())
            }
            PlayerError::Config(_) => {
                RecoveryResult::Success("Using default configuration settings".to_string())
            }
            PlayerError::Library(_) => {
                RecoveryResult::Failed("Library errors require manual intervention".to_string())
            }
            PlayerError::Parse(_) => {
                RecoveryResult::Failed("Parse errors require correct input".to_string())
            }
        };

        match &result {
            RecoveryResult::Success(msg) => {
                info!("Recovery successful: {}", msg);
                self.recovery_attempts.remove(&error_key);
            }
            RecoveryResult::Retry(msg) => {
                info!("Recovery attempt {}: {}", attempts, msg);
                self.recovery_attempts.insert(error_key, attempts);
            }
            RecoveryResult::Failed(msg) => {
                warn!("Recovery failed: {}", msg);
            }
        }

        result
    }

    fn recover_engine_error(&mut self, error: &EngineError) -> RecoveryResult {
        match error {
            EngineError::Stalled { waited, .. } => {
                self.logger.log_stall(*waited, true);
                RecoveryResult::Retry("Engine stalled. Reopening the track at the last position".to_string())
            }
            EngineError::Crashed { operation, .. } => RecoveryResult::Retry(format!(
                "Engine failed during '{}'. Reopening the track",
                operation
            )),
            EngineError::Unreadable { path, .. } | EngineError::Unsupported { path, .. } => {
                RecoveryResult::Failed(format!("'{}' cannot be played", path.display()))
            }
        }
    }

    fn error_key(error: &PlayerError) -> String {
        match error {
            PlayerError::Engine(EngineError::Stalled { operation, .. }) => format!("engine_stalled_{}", operation),
            PlayerError::Engine(EngineError::Crashed { operation, .. }) => format!("engine_crashed_{}", operation),
            PlayerError::Engine(EngineError::Unreadable { path, .. }) => {
                format!("engine_unreadable_{}", path.display())
            }
            PlayerError::Engine(EngineError::Unsupported { path, .. }) => {
                format!("engine_unsupported_{}", path.display())
            }
            PlayerError::Session(err) => format!("session_{:?}", std::mem::discriminant(err)),
            PlayerError::Output(err) => format!("output_{:?}", std::mem::discriminant(err)),
            PlayerError::Config(err) => format!("config_{:?}", std::mem::discriminant(err)),
            PlayerError::Library(err) => format!("library_{:?}", std::mem::discriminant(err)),
            PlayerError::Parse(_) => "parse_error".to_string(),
        }
    }

    /// Attempts made so far for faults like `error`
    pub fn attempts_for(&self, error: &PlayerError) -> u32 {
        self.recovery_attempts
            .get(&Self::error_key(error))
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_recovery_attempts(&mut self, error: &PlayerError) {
        self.recovery_attempts.remove(&Self::error_key(error));
    }

    pub fn clear_recovery_attempts(&mut self) {
        self.recovery_attempts.clear();
    }

    pub fn get_recovery_statistics(&self) -> RecoveryStatistics {
        RecoveryStatistics {
            total_errors_tracked: self.recovery_attempts.len(),
            max_attempts_for_any_error: self.recovery_attempts.values().max().copied().unwrap_or(0),
        }
    }
}

/// Result of an error recovery attempt
#[derive(Debug, Clone)]
pub enum RecoveryResult {
    /// Recovered, nothing else to do
    Success(String),
    /// Retry the failed operation
    Retry(String),
    /// Give up and surface the error
    Failed(String),
}

impl RecoveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RecoveryResult::Success(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, RecoveryResult::Retry(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RecoveryResult::Success(msg) | RecoveryResult::Retry(msg) | RecoveryResult::Failed(msg) => msg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryStatistics {
    pub total_errors_tracked: usize,
    pub max_attempts_for_any_error: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SessionError};
    use std::path::PathBuf;
    use std::time::Duration;

    fn stalled() -> PlayerError {
        PlayerError::Engine(EngineError::Stalled {
            operation: "fill_buffer",
            waited: Duration::from_millis(500),
        })
    }

    #[test]
    fn test_stall_is_retried_up_to_limit() {
        let mut manager = ErrorRecoveryManager::with_max_attempts(PlaybackLogger::new(), 2);

        assert!(manager.attempt_recovery(&stalled()).is_retry());
        assert!(manager.attempt_recovery(&stalled()).is_retry());
        assert_eq!(manager.attempts_for(&stalled()), 2);

        let result = manager.attempt_recovery(&stalled());
        assert!(result.is_failed());
        assert!(result.message().contains("Maximum recovery attempts"));
    }

    #[test]
    fn test_reset_allows_new_attempts() {
        let mut manager = ErrorRecoveryManager::with_max_attempts(PlaybackLogger::new(), 1);
        assert!(manager.attempt_recovery(&stalled()).is_retry());
        assert!(manager.attempt_recovery(&stalled()).is_failed());

        manager.reset_recovery_attempts(&stalled());
        assert!(manager.attempt_recovery(&stalled()).is_retry());
    }

    #[test]
    fn test_unplayable_files_are_not_retried() {
        let mut manager = ErrorRecoveryManager::new(PlaybackLogger::new());
        let error = PlayerError::Engine(EngineError::Unsupported {
            path: PathBuf::from("/g/bad.spc"),
            reason: "bad header".to_string(),
        });
        let result = manager.attempt_recovery(&error);
        assert!(result.is_failed());
        assert!(result.message().contains("/g/bad.spc"));
        assert_eq!(manager.get_recovery_statistics().total_errors_tracked, 0);
    }

    #[test]
    fn test_config_error_recovers_with_defaults() {
        let mut manager = ErrorRecoveryManager::new(PlaybackLogger::new());
        let result = manager.attempt_recovery(&PlayerError::Config(ConfigError::ConfigDirNotFound));
        assert!(result.is_success());
        assert!(result.message().contains("default"));
    }

    #[test]
    fn test_distinct_faults_tracked_separately() {
        let mut manager = ErrorRecoveryManager::new(PlaybackLogger::new());
        let crashed = PlayerError::Engine(EngineError::Crashed {
            operation: "open",
            reason: "panic".to_string(),
        });
        manager.attempt_recovery(&stalled());
        manager.attempt_recovery(&crashed);
        manager.attempt_recovery(&crashed);

        let stats = manager.get_recovery_statistics();
        assert_eq!(stats.total_errors_tracked, 2);
        assert_eq!(stats.max_attempts_for_any_error, 2);

        manager.clear_recovery_attempts();
        assert_eq!(manager.attempts_for(&crashed), 0);
    }

    #[test]
    fn test_session_errors_fail() {
        let mut manager = ErrorRecoveryManager::new(PlaybackLogger::new());
        let result = manager.attempt_recovery(&PlayerError::Session(SessionError::NoTrackLoaded));
        assert!(result.is_failed());
    }
}
