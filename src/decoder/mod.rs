//! Decoded unit types and the source contract
//!
//! The playback core never decodes anything itself. A [`UnitSource`] hands
//! over already-decoded audio packets and video frames, each stamped with its
//! presentation time, and the core takes ownership of every unit it polls.

mod channel_source;
mod ffmpeg_source;

pub use channel_source::{channel_source, ChannelSource, UnitFeeder};
pub use ffmpeg_source::FfmpegSource;

use crate::utils::error::{PlayerError, Result};
use std::time::Duration;

/// Non-blocking access to a decoder running in another execution context
pub trait UnitSource: Send {
    /// Take the next decoded audio packet, if one is ready
    fn poll_audio(&mut self) -> Option<AudioUnit>;

    /// Take the next decoded video frame, if one is ready
    fn poll_video(&mut self) -> Option<VideoUnit>;

    /// True while the producer is still running or undelivered units remain
    fn is_active(&self) -> bool;

    /// True once the producer has hit a decode fault
    fn has_error(&self) -> bool;

    /// Description of the decode fault, when there is one
    fn error_message(&self) -> Option<String> {
        None
    }

    /// Block for at most `timeout` or until a unit may be ready
    fn wait_ready(&self, timeout: Duration) {
        std::thread::sleep(timeout);
    }
}

/// Planar 4:2:0 layouts a [`VideoUnit`] can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Y, then U (Cb), then V (Cr)
    Iyuv,

    /// Y, then V (Cr), then U (Cb)
    Yv12,
}

impl PixelFormat {
    /// Bytes needed for a tightly packed frame of the given size
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        w * h + 2 * (w / 2) * (h / 2)
    }
}

/// A decoded block of interleaved float PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUnit {
    /// Presentation time in milliseconds from stream start
    pub play_ms: u32,
    pub channels: u16,
    pub sample_rate: u32,
    /// Sample frames (one sample per channel each)
    pub frames: usize,
    /// `frames * channels` interleaved samples
    pub samples: Vec<f32>,
}

impl AudioUnit {
    pub fn new(play_ms: u32, channels: u16, sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(PlayerError::InvalidInput("Audio unit has no channels".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(PlayerError::InvalidInput(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }

        Ok(Self {
            play_ms,
            channels,
            sample_rate,
            frames: samples.len() / channels as usize,
            samples,
        })
    }

    /// Samples of frame `frame` onward
    pub fn samples_from(&self, frame: usize) -> &[f32] {
        let start = (frame * self.channels as usize).min(self.samples.len());
        &self.samples[start..]
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }
}

/// A decoded planar 4:2:0 picture
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUnit {
    /// Presentation time in milliseconds from stream start
    pub play_ms: u32,
    /// Frame rate hint from the stream headers, 0.0 when unknown
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed planes, luma first
    pub pixels: Vec<u8>,
}

impl VideoUnit {
    pub fn new(
        play_ms: u32,
        fps: f64,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let needed = format.frame_size(width, height);
        if pixels.len() < needed {
            return Err(PlayerError::InvalidInput(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                needed,
                pixels.len()
            )));
        }

        Ok(Self {
            play_ms,
            fps,
            width,
            height,
            format,
            pixels,
        })
    }

    /// Whole milliseconds between frames, or 0 when the rate is unknown
    pub fn frame_interval_ms(&self) -> u32 {
        if self.fps > 0.0 {
            (1000.0 / self.fps) as u32
        } else {
            0
        }
    }

    /// The luma plane followed by the two chroma planes in storage order
    pub fn planes(&self) -> (&[u8], &[u8], &[u8]) {
        let luma = self.width as usize * self.height as usize;
        let chroma = (self.width as usize / 2) * (self.height as usize / 2);
        let (y, rest) = self.pixels.split_at(luma);
        let (first, rest) = rest.split_at(chroma);
        (y, first, &rest[..chroma])
    }
}
