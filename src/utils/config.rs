//! Configuration management for syncplay
//!
//! This module handles loading and managing application configuration
//! from config files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::utils::error::{PlayerError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window configuration
    pub window: WindowConfig,

    /// Audio output and queue configuration
    pub audio: AudioConfig,

    /// Playback loop timing
    pub playback: PlaybackConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window width
    pub width: u32,

    /// Initial window height
    pub height: u32,

    /// Window title
    pub title: String,
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Device buffer size in frames (0 lets the backend choose)
    pub buffer_frames: u32,

    /// Maximum number of audio units held in the queue (0 = unbounded)
    pub max_queued_units: usize,

    /// Slots in the ring that hands finished units back from the callback
    pub recycle_capacity: usize,
}

/// Playback loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Media file opened when none is given on the command line
    pub input_path: PathBuf,

    /// Wait between source polls while waiting for the first units
    pub startup_poll_ms: u64,

    /// Longest idle wait of one main loop iteration
    pub idle_wait_ms: u64,

    /// Upper bound on waiting for queued audio to finish at shutdown
    pub drain_timeout_ms: u64,

    /// Decoded video frames allowed to wait ahead of presentation
    pub max_buffered_frames: usize,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title: "syncplay".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 2048,
            max_queued_units: 512,
            recycle_capacity: 64,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("video_test.ogv"),
            startup_poll_ms: 10,
            idle_wait_ms: 10,
            drain_timeout_ms: 10_000,
            max_buffered_frames: 30,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn startup_poll(&self) -> Duration {
        Duration::from_millis(self.startup_poll_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/syncplay/config.toml on Linux)
    /// 3. User config file (~/.config/syncplay/config.toml on Linux)
    /// 4. Environment variables (SYNCPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; keys missing from the file keep their defaults
    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PlayerError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| PlayerError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value.parse()
                .map_err(|_| PlayerError::Config(format!("Invalid {}", key)))
        }

        if let Some(width) = lookup("SYNCPLAY_WINDOW_WIDTH") {
            self.window.width = parse("SYNCPLAY_WINDOW_WIDTH", width)?;
        }

        if let Some(height) = lookup("SYNCPLAY_WINDOW_HEIGHT") {
            self.window.height = parse("SYNCPLAY_WINDOW_HEIGHT", height)?;
        }

        if let Some(frames) = lookup("SYNCPLAY_AUDIO_BUFFER_FRAMES") {
            self.audio.buffer_frames = parse("SYNCPLAY_AUDIO_BUFFER_FRAMES", frames)?;
        }

        if let Some(timeout) = lookup("SYNCPLAY_DRAIN_TIMEOUT_MS") {
            self.playback.drain_timeout_ms = parse("SYNCPLAY_DRAIN_TIMEOUT_MS", timeout)?;
        }

        if let Some(log_level) = lookup("SYNCPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(PlayerError::Config("Window dimensions must be non-zero".to_string()));
        }

        if self.playback.idle_wait_ms == 0 || self.playback.startup_poll_ms == 0 {
            return Err(PlayerError::Config("Poll intervals must be non-zero".to_string()));
        }

        if self.playback.max_buffered_frames == 0 {
            return Err(PlayerError::Config("At least one video frame must be buffered".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/syncplay/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("syncplay").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/syncplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("syncplay").join("config.toml"))
    }
}
