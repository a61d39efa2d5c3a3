//! Error types for syncplay
//!
//! This module defines the error type surfaced by the playback driver and
//! its collaborators. We use thiserror for the library error type and anyhow
//! for application-level error handling in the binary.

use thiserror::Error;

/// Main error type for syncplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// A display or audio subsystem could not be brought up
    #[error("Initialization failed: {0}")]
    Init(String),

    /// The unit source reported a decode fault
    #[error("Decoder error: {0}")]
    Decode(String),

    /// Audio output errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Display surface errors
    #[error("Display error: {0}")]
    Display(String),

    /// Window-related errors
    #[error("Window error: {0}")]
    Window(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PlayerError::Decode(format!("FFmpeg error: {}", err))
    }
}

impl PlayerError {
    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::Decode(msg.into())
    }

    /// Whether this error means playback never started
    pub fn is_init_failure(&self) -> bool {
        matches!(self, PlayerError::Init(_))
    }
}

/// Convenience type alias for Results in syncplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn init_err(self, context: &str) -> Result<T>;
    fn window_err(self, context: &str) -> Result<T>;
    fn display_err(self, context: &str) -> Result<T>;
    fn decoder_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn init_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Init(format!("{}: {}", context, e)))
    }

    fn window_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Window(format!("{}: {}", context, e)))
    }

    fn display_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Display(format!("{}: {}", context, e)))
    }

    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Decode(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Audio(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}
