use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{key} must be {expected}, got: {value:?}")]
    Invalid {
        key: String,
        expected: &'static str,
        value: String,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Timing and debounce settings for the machine. Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoothConfig {
    pub countdown_secs: u32,
    pub result_secs: u32,
    /// Consecutive positive frames needed before presence is trusted.
    pub debounce_frames: u32,
    /// Upper bound on one compositing step.
    pub capture_timeout: Duration,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            result_secs: 15,
            debounce_frames: 3,
            capture_timeout: Duration::from_secs(5),
        }
    }
}

impl BoothConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.countdown_secs == 0 {
            return Err(ConfigError::NotPositive("countdown_secs"));
        }
        if self.result_secs == 0 {
            return Err(ConfigError::NotPositive("result_secs"));
        }
        if self.debounce_frames == 0 {
            return Err(ConfigError::NotPositive("debounce_frames"));
        }
        if self.capture_timeout.is_zero() {
            return Err(ConfigError::NotPositive("capture_timeout"));
        }
        Ok(())
    }
}
