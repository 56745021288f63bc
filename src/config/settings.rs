//! Stream settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A loaded configuration that cannot drive a stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("stream.chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("playback.sample_rate must be greater than zero")]
    ZeroSampleRate,
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Producer-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base64 characters per chunk handed to the decoder.  Any size works;
    /// 256 matches what a small HTTP read buffer yields.
    pub chunk_size: usize,
    /// Bound of the command channel between the fetch task and the runner.
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            queue_capacity: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Consumer-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sample rate of the PCM payload in Hz.  Only used for reporting; the
    /// decoder itself is rate-agnostic.
    pub sample_rate: u32,
    /// Bound of the sample batch channel between the runner and playback.
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            queue_capacity: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use tts_stream::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would stall or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.stream.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("stream.queue_capacity"));
        }
        if self.playback.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("playback.queue_capacity"));
        }
        if self.playback.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.stream.chunk_size, 256);
        assert_eq!(cfg.stream.queue_capacity, 8);
        assert_eq!(cfg.playback.sample_rate, 24_000);
        assert_eq!(cfg.playback.queue_capacity, 4);
        assert!(cfg.validate().is_ok());
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.stream.chunk_size, 256);
        assert_eq!(config.playback.sample_rate, 24_000);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = AppConfig::default();
        cfg.stream.chunk_size = 1024;
        cfg.stream.queue_capacity = 2;
        cfg.playback.sample_rate = 16_000;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.stream.chunk_size, 1024);
        assert_eq!(loaded.stream.queue_capacity, 2);
        assert_eq!(loaded.playback.sample_rate, 16_000);
        assert_eq!(loaded.playback.queue_capacity, 4);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[playback]\nsample_rate = 8000\n").unwrap();

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded.playback.sample_rate, 8_000);
        assert_eq!(loaded.playback.queue_capacity, 4);
        assert_eq!(loaded.stream.chunk_size, 256);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "stream = 5").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = AppConfig::default();
        cfg.stream.chunk_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroChunkSize));

        let mut cfg = AppConfig::default();
        cfg.playback.queue_capacity = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroCapacity("playback.queue_capacity"))
        );

        let mut cfg = AppConfig::default();
        cfg.playback.sample_rate = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSampleRate));
    }
}
