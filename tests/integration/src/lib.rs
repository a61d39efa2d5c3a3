//! Fixtures for the syncplay integration tests
//!
//! - A scripted unit source with everything available up front
//! - A fake audio device that renders from its own thread
//! - Small audio and video unit builders

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use syncplay::audio::{AudioOutput, AudioRenderer, AudioSpec};
use syncplay::decoder::{AudioUnit, PixelFormat, UnitSource, VideoUnit};
use syncplay::{PlayerError, Result};

/// Interleaved stereo unit with every sample set to `value`
pub fn audio_unit(play_ms: u32, frames: usize, value: f32) -> AudioUnit {
    AudioUnit::new(play_ms, 2, 48000, vec![value; frames * 2]).unwrap()
}

/// Tiny 4x4 IYUV frame
pub fn video_frame(play_ms: u32, fps: f64) -> VideoUnit {
    VideoUnit::new(play_ms, fps, 4, 4, PixelFormat::Iyuv, vec![128; 24]).unwrap()
}

/// Source whose units are all available up front
#[derive(Default)]
pub struct ScriptedSource {
    pub audio: VecDeque<AudioUnit>,
    pub video: VecDeque<VideoUnit>,
}

impl ScriptedSource {
    pub fn with_frames(times: &[u32], fps: f64) -> Self {
        Self {
            audio: VecDeque::new(),
            video: times.iter().map(|&t| video_frame(t, fps)).collect(),
        }
    }
}

impl UnitSource for ScriptedSource {
    fn poll_audio(&mut self) -> Option<AudioUnit> {
        self.audio.pop_front()
    }

    fn poll_video(&mut self) -> Option<VideoUnit> {
        self.video.pop_front()
    }

    fn is_active(&self) -> bool {
        !self.audio.is_empty() || !self.video.is_empty()
    }

    fn has_error(&self) -> bool {
        false
    }
}

/// What a [`ThreadedOutput`] observed, readable after the driver owns it
#[derive(Default)]
pub struct OutputMonitor {
    samples: Mutex<Vec<i16>>,
    callbacks: AtomicUsize,
    open: AtomicBool,
    spec: Mutex<Option<AudioSpec>>,
}

impl OutputMonitor {
    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().clone()
    }

    pub fn callbacks(&self) -> usize {
        self.callbacks.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn spec(&self) -> Option<AudioSpec> {
        *self.spec.lock()
    }
}

/// Audio output that calls the renderer from its own thread, like a device
pub struct ThreadedOutput {
    period: Duration,
    buffer_frames: usize,
    fail_open: bool,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    monitor: Arc<OutputMonitor>,
}

impl ThreadedOutput {
    pub fn new(buffer_frames: usize, period: Duration) -> (Self, Arc<OutputMonitor>) {
        let monitor = Arc::new(OutputMonitor::default());
        let output = Self {
            period,
            buffer_frames,
            fail_open: false,
            playing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            monitor: Arc::clone(&monitor),
        };
        (output, monitor)
    }

    /// Output whose device never opens
    pub fn unavailable() -> Self {
        let (mut output, _) = Self::new(64, Duration::from_millis(1));
        output.fail_open = true;
        output
    }
}

impl AudioOutput for ThreadedOutput {
    fn open(&mut self, spec: AudioSpec, mut renderer: AudioRenderer) -> Result<AudioSpec> {
        if self.fail_open {
            return Err(PlayerError::Init("no audio device available".to_string()));
        }

        let samples = self.buffer_frames * spec.channels as usize;
        let period = self.period;
        let playing = Arc::clone(&self.playing);
        let stop = Arc::clone(&self.stop);
        let monitor = Arc::clone(&self.monitor);

        self.worker = Some(thread::spawn(move || {
            let mut buffer = vec![0i16; samples];
            while !stop.load(Ordering::Acquire) {
                if playing.load(Ordering::Acquire) {
                    renderer.render(&mut buffer);
                    monitor.samples.lock().extend_from_slice(&buffer);
                    monitor.callbacks.fetch_add(1, Ordering::AcqRel);
                }
                thread::sleep(period);
            }
        }));

        *self.monitor.spec.lock() = Some(spec);
        self.monitor.open.store(true, Ordering::Release);
        Ok(spec)
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.playing.store(!paused, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.monitor.open.store(false, Ordering::Release);
    }
}

impl Drop for ThreadedOutput {
    fn drop(&mut self) {
        self.close();
    }
}
