//! syncplay keeps decoded audio and video in step during playback.
//!
//! A [`decoder::UnitSource`] delivers decoded audio units and video frames;
//! the [`player::PlaybackDriver`] queues audio for the device callback,
//! schedules frames against a presentation clock, and drains the audio queue
//! before shutting down.

pub mod audio;
pub mod decoder;
pub mod player;
pub mod renderer;
pub mod utils;
pub mod window;

pub use player::{DriverOptions, PlaybackDriver, PlaybackReport};
pub use utils::error::{PlayerError, Result};
