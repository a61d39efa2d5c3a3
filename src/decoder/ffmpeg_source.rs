//! FFmpeg-backed unit source
//!
//! Decodes a media file on a dedicated producer thread using the ffmpeg-next
//! crate and feeds the resulting units through a [`ChannelSource`]. Video is
//! converted to planar 4:2:0 and audio to interleaved f32, the two layouts
//! the playback core consumes.

use crate::decoder::channel_source::{channel_source, ChannelSource, UnitFeeder};
use crate::decoder::{AudioUnit, PixelFormat, UnitSource, VideoUnit};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use crossbeam_channel::bounded;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{self, sample, Pixel, Sample};
use ffmpeg_next::media;
use ffmpeg_next::software::{resampling, scaling};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Unit source decoding a file with FFmpeg
pub struct FfmpegSource {
    inner: ChannelSource,

    /// Declared after `inner` so the channels disconnect before the join
    _worker: WorkerGuard,
}

/// Joins the producer thread when the source goes away
struct WorkerGuard(Option<thread::JoinHandle<()>>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            let _ = handle.join();
        }
    }
}

impl FfmpegSource {
    /// Open `path` and start decoding it in the background
    ///
    /// Returns once the container and both codecs are open, so a missing file
    /// or stream is reported here rather than through `has_error`.
    pub fn open(path: &Path, max_video_frames: usize) -> Result<Self> {
        ffmpeg::init().decoder_err("Failed to initialize FFmpeg")?;
        ffmpeg::log::set_level(ffmpeg::log::Level::Warning);

        let (feeder, inner) = channel_source(max_video_frames);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let path = path.to_path_buf();

        let handle = thread::Builder::new()
            .name("syncplay-decode".to_string())
            .spawn(move || {
                let mut decoder = match StreamDecoder::open(&path) {
                    Ok(decoder) => {
                        let _ = ready_tx.send(Ok(()));
                        decoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = decoder.run(&feeder) {
                    error!("Decoding {:?} failed: {}", path, e);
                    feeder.fail(e.to_string());
                }
            })
            .decoder_err("Failed to spawn decode thread")?;

        let worker = WorkerGuard(Some(handle));
        ready_rx
            .recv()
            .map_err(|_| PlayerError::Decode("Decode thread exited during open".to_string()))??;

        Ok(Self {
            inner,
            _worker: worker,
        })
    }
}

impl UnitSource for FfmpegSource {
    fn poll_audio(&mut self) -> Option<AudioUnit> {
        self.inner.poll_audio()
    }

    fn poll_video(&mut self) -> Option<VideoUnit> {
        self.inner.poll_video()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn has_error(&self) -> bool {
        self.inner.has_error()
    }

    fn error_message(&self) -> Option<String> {
        self.inner.error_message()
    }

    fn wait_ready(&self, timeout: Duration) {
        self.inner.wait_ready(timeout)
    }
}

/// Demuxer plus one decoder per selected stream
struct StreamDecoder {
    input: format::context::Input,
    video: VideoTrack,
    audio: AudioTrack,
}

struct VideoTrack {
    index: usize,
    decoder: ffmpeg::decoder::Video,
    time_base: ffmpeg::Rational,
    fps: f64,
    scaler: Option<scaling::Context>,
}

struct AudioTrack {
    index: usize,
    decoder: ffmpeg::decoder::Audio,
    time_base: ffmpeg::Rational,
    resampler: Option<resampling::Context>,
}

impl StreamDecoder {
    fn open(path: &PathBuf) -> Result<Self> {
        let input = format::input(path)?;

        let video = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| PlayerError::decoder_error("No video stream found"))?;
            let rate = stream.avg_frame_rate();
            let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
                f64::from(rate)
            } else {
                0.0
            };
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;

            VideoTrack {
                index: stream.index(),
                decoder: context.decoder().video()?,
                time_base: stream.time_base(),
                fps,
                scaler: None,
            }
        };

        let audio = {
            let stream = input
                .streams()
                .best(media::Type::Audio)
                .ok_or_else(|| PlayerError::decoder_error("No audio stream found"))?;
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;

            AudioTrack {
                index: stream.index(),
                decoder: context.decoder().audio()?,
                time_base: stream.time_base(),
                resampler: None,
            }
        };

        info!(
            "Opened {:?}: video {}x{} @ {:.2} fps, audio {} Hz",
            path,
            video.decoder.width(),
            video.decoder.height(),
            video.fps,
            audio.decoder.rate()
        );

        Ok(Self { input, video, audio })
    }

    /// Decode until end of file, a fault, or the consumer going away
    fn run(&mut self, feeder: &UnitFeeder) -> Result<()> {
        for (stream, packet) in self.input.packets() {
            if feeder.is_cancelled() {
                debug!("Consumer gone, stopping decode");
                return Ok(());
            }

            let delivered = if stream.index() == self.video.index {
                self.video.decoder.send_packet(&packet)?;
                self.video.drain(feeder)?
            } else if stream.index() == self.audio.index {
                self.audio.decoder.send_packet(&packet)?;
                self.audio.drain(feeder)?
            } else {
                true
            };

            if !delivered {
                return Ok(());
            }
        }

        self.video.decoder.send_eof()?;
        self.video.drain(feeder)?;
        self.audio.decoder.send_eof()?;
        self.audio.drain(feeder)?;

        debug!("Decode finished");
        Ok(())
    }
}

impl VideoTrack {
    /// Forward every frame the decoder has ready; false once nobody listens
    fn drain(&mut self, feeder: &UnitFeeder) -> Result<bool> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let unit = self.convert(&decoded)?;
            if !feeder.send_video(unit) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<VideoUnit> {
        let play_ms = timestamp_ms(decoded.timestamp().or(decoded.pts()), self.time_base);
        let (width, height) = (decoded.width(), decoded.height());

        let pixels = if decoded.format() == Pixel::YUV420P {
            pack_planes(decoded)
        } else {
            let stale = self.scaler.as_ref().map_or(true, |scaler| {
                let input = scaler.input();
                input.format != decoded.format() || input.width != width || input.height != height
            });
            if stale {
                self.scaler = Some(scaling::Context::get(
                    decoded.format(),
                    width,
                    height,
                    Pixel::YUV420P,
                    width,
                    height,
                    scaling::Flags::BILINEAR,
                )?);
            }

            let mut converted = ffmpeg::frame::Video::empty();
            if let Some(scaler) = self.scaler.as_mut() {
                scaler.run(decoded, &mut converted)?;
            }
            pack_planes(&converted)
        };

        VideoUnit::new(play_ms, self.fps, width, height, PixelFormat::Iyuv, pixels)
    }
}

impl AudioTrack {
    fn drain(&mut self, feeder: &UnitFeeder) -> Result<bool> {
        let mut decoded = ffmpeg::frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let unit = self.convert(&decoded)?;
            if !feeder.send_audio(unit) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Audio) -> Result<AudioUnit> {
        let play_ms = timestamp_ms(decoded.timestamp().or(decoded.pts()), self.time_base);
        let target = Sample::F32(sample::Type::Packed);

        let stale = self.resampler.as_ref().map_or(true, |resampler| {
            let input = resampler.input();
            input.format != decoded.format() || input.rate != decoded.rate()
        });
        if stale {
            self.resampler = Some(resampling::Context::get(
                decoded.format(),
                decoded.channel_layout(),
                decoded.rate(),
                target,
                decoded.channel_layout(),
                decoded.rate(),
            )?);
        }

        let mut packed = ffmpeg::frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(decoded, &mut packed)?;
        }

        let channels = decoded.channels() as u16;
        let count = packed.samples() * channels as usize;
        let bytes = packed.data(0);
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .take(count)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        AudioUnit::new(play_ms, channels, decoded.rate(), samples)
    }
}

/// Copy the three planes of a YUV420P frame into one tightly packed buffer
fn pack_planes(frame: &ffmpeg::frame::Video) -> Vec<u8> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let mut pixels = Vec::with_capacity(PixelFormat::Iyuv.frame_size(frame.width(), frame.height()));

    for (plane, plane_w, plane_h) in [(0, w, h), (1, w / 2, h / 2), (2, w / 2, h / 2)] {
        let data = frame.data(plane);
        let stride = frame.stride(plane);
        for row in 0..plane_h {
            let start = row * stride;
            pixels.extend_from_slice(&data[start..start + plane_w]);
        }
    }

    pixels
}

/// Convert a stream timestamp to whole milliseconds, clamping negatives to 0
fn timestamp_ms(timestamp: Option<i64>, time_base: ffmpeg::Rational) -> u32 {
    let ts = match timestamp {
        Some(ts) if ts > 0 => ts as i128,
        _ => return 0,
    };
    let num = time_base.numerator() as i128;
    let den = time_base.denominator() as i128;
    if den <= 0 {
        return 0;
    }
    (ts * num * 1000 / den).clamp(0, u32::MAX as i128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversion() {
        let vorbis = ffmpeg::Rational::new(1, 44100);
        assert_eq!(timestamp_ms(Some(44100), vorbis), 1000);
        assert_eq!(timestamp_ms(Some(22050), vorbis), 500);

        let theora = ffmpeg::Rational::new(1, 30);
        assert_eq!(timestamp_ms(Some(3), theora), 100);

        assert_eq!(timestamp_ms(None, theora), 0);
        assert_eq!(timestamp_ms(Some(-5), theora), 0);
        assert_eq!(timestamp_ms(Some(10), ffmpeg::Rational::new(1, 0)), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegSource::open(Path::new("/nonexistent/clip.ogv"), 4);
        assert!(matches!(result, Err(PlayerError::Decode(_))));
    }
}
