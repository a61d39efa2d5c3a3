//! CPAL audio output implementation for syncplay
//!
//! Opens the default output device with a 16-bit stream and hands every
//! device callback to an [`AudioRenderer`].

use crate::audio::{AudioOutput, AudioRenderer, AudioSpec};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Host, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use log::{error, info, warn};

/// CPAL audio output implementation
pub struct CpalAudioOutput {
    host: Host,

    /// Open stream; dropping it stops the callback
    stream: Option<Stream>,

    spec: Option<AudioSpec>,
}

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            stream: None,
            spec: None,
        }
    }

    /// Format of the open stream, if any
    pub fn spec(&self) -> Option<AudioSpec> {
        self.spec
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalAudioOutput {
    fn open(&mut self, spec: AudioSpec, mut renderer: AudioRenderer) -> Result<AudioSpec> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| PlayerError::Init("No default audio output device found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let buffer_size = device
            .default_output_config()
            .map(|config| choose_buffer_size(spec.buffer_frames, config.buffer_size()))
            .unwrap_or(BufferSize::Default);
        if let BufferSize::Fixed(frames) = buffer_size {
            if frames != spec.buffer_frames {
                warn!(
                    "Audio device {} cannot use {} frames per buffer, using {}",
                    name, spec.buffer_frames, frames
                );
            }
        } else if spec.buffer_frames > 0 {
            warn!("Audio device {} does not report buffer sizes, using its default", name);
        }

        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .init_err("Failed to open audio stream")?;

        // Some backends start streams as soon as they are built
        if let Err(e) = stream.pause() {
            warn!("Audio stream could not be paused after opening: {}", e);
        }

        let obtained = AudioSpec {
            buffer_frames: match buffer_size {
                BufferSize::Fixed(frames) => frames,
                BufferSize::Default => 0,
            },
            ..spec
        };
        info!(
            "Audio output on {}: {} Hz, {} channels, {} frames per buffer",
            name, obtained.sample_rate, obtained.channels, obtained.buffer_frames
        );

        self.stream = Some(stream);
        self.spec = Some(obtained);
        Ok(obtained)
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlayerError::Audio("Audio output is not open".to_string()))?;

        if paused {
            stream.pause().audio_err("Failed to pause audio stream")
        } else {
            stream.play().audio_err("Failed to start audio stream")
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio output closed");
        }
        self.spec = None;
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick the stream buffer size for a requested frame count
fn choose_buffer_size(requested: u32, supported: &SupportedBufferSize) -> BufferSize {
    match supported {
        _ if requested == 0 => BufferSize::Default,
        SupportedBufferSize::Range { min, max } if min <= max => {
            BufferSize::Fixed(requested.clamp(*min, *max))
        }
        _ => BufferSize::Default,
    }
}
