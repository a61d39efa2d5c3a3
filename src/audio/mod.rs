//! Audio output module for syncplay
//!
//! This module owns the audio side of playback: the queue of decoded units
//! shared with the device callback, the float to 16-bit conversion, and the
//! cpal-backed output device.

pub mod convert;
mod cpal_output;
mod queue;

pub use cpal_output::CpalAudioOutput;
pub use queue::{AudioQueue, AudioRenderer, EnqueueError, QueueStats};

use crate::utils::error::Result;

/// Audio output trait defining the interface the playback driver drives
///
/// The output pulls samples from the [`AudioRenderer`] on its own schedule.
/// A freshly opened output is paused; nothing is rendered until
/// `pause(false)`.
pub trait AudioOutput {
    /// Open the device with the requested format
    ///
    /// # Returns
    ///
    /// The format actually obtained, or `PlayerError::Init` when no device
    /// can be opened
    fn open(&mut self, spec: AudioSpec, renderer: AudioRenderer) -> Result<AudioSpec>;

    /// Pause or resume the callback
    fn pause(&mut self, paused: bool) -> Result<()>;

    /// Stop the callback and release the device
    fn close(&mut self);
}

/// Sample encodings the callback can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit, native endian
    I16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
        }
    }
}

/// Negotiated output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,

    pub sample_format: SampleFormat,

    /// Frames per callback the device is asked for, 0 for its default
    pub buffer_frames: u32,
}

impl AudioSpec {
    pub fn new(sample_rate: u32, channels: u16, buffer_frames: u32) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::I16,
            buffer_frames,
        }
    }

    /// Bytes one callback buffer occupies
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_frames as usize * self.channels as usize * self.sample_format.bytes_per_sample()
    }
}
