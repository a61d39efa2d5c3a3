//! Shared plumbing: the error type, layered configuration, and a couple of
//! formatting helpers for log output

pub mod config;
pub mod error;

pub use config::{AudioConfig, Config, PlaybackConfig, WindowConfig};
pub use error::{IntoPlayerError, PlayerError, Result};

/// Defaults, then the system and user config files, then `SYNCPLAY_*`
/// environment overrides
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// `MM:SS`, or `HH:MM:SS` from one hour up
pub fn format_duration(duration: std::time::Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
