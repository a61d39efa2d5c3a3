//! Channel-backed unit source
//!
//! A producer thread owns the [`UnitFeeder`] half and pushes decoded units;
//! the playback core owns the [`ChannelSource`] half and polls it without
//! blocking. Video is bounded so a fast decoder cannot run arbitrarily far
//! ahead of presentation; audio is unbounded because the driver may stop
//! pulling it until the first video frame shows up.

use crate::decoder::{AudioUnit, UnitSource, VideoUnit};
use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State both halves can see
#[derive(Default)]
struct Shared {
    /// Producer has delivered its last unit
    finished: AtomicBool,

    /// Consumer went away; the producer should stop decoding
    cancelled: AtomicBool,

    error: Mutex<Option<String>>,
}

/// Create a connected feeder/source pair
///
/// `max_video_frames` bounds how many decoded frames may wait undelivered.
pub fn channel_source(max_video_frames: usize) -> (UnitFeeder, ChannelSource) {
    let (audio_tx, audio_rx) = unbounded();
    let (video_tx, video_rx) = bounded(max_video_frames.max(1));
    let shared = Arc::new(Shared::default());

    let feeder = UnitFeeder {
        audio_tx,
        video_tx,
        shared: Arc::clone(&shared),
    };
    let source = ChannelSource {
        audio_rx,
        video_rx,
        shared,
    };
    (feeder, source)
}

/// Producer half
pub struct UnitFeeder {
    audio_tx: Sender<AudioUnit>,
    video_tx: Sender<VideoUnit>,
    shared: Arc<Shared>,
}

impl UnitFeeder {
    /// Deliver an audio unit; false once the consumer is gone
    pub fn send_audio(&self, unit: AudioUnit) -> bool {
        self.audio_tx.send(unit).is_ok()
    }

    /// Deliver a video frame, blocking while the frame budget is used up;
    /// false once the consumer is gone
    pub fn send_video(&self, unit: VideoUnit) -> bool {
        self.video_tx.send(unit).is_ok()
    }

    /// Whether the consumer has dropped its half
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Record a decode fault; the source keeps delivering what was queued
    pub fn fail(&self, message: impl Into<String>) {
        let mut error = self.shared.error.lock();
        if error.is_none() {
            *error = Some(message.into());
        }
    }
}

impl Drop for UnitFeeder {
    fn drop(&mut self) {
        self.shared.finished.store(true, Ordering::Release);
    }
}

/// Consumer half, polled by the playback driver
pub struct ChannelSource {
    audio_rx: Receiver<AudioUnit>,
    video_rx: Receiver<VideoUnit>,
    shared: Arc<Shared>,
}

impl ChannelSource {
    /// Units delivered but not yet polled, as (audio, video)
    pub fn backlog(&self) -> (usize, usize) {
        (self.audio_rx.len(), self.video_rx.len())
    }
}

impl UnitSource for ChannelSource {
    fn poll_audio(&mut self) -> Option<AudioUnit> {
        self.audio_rx.try_recv().ok()
    }

    fn poll_video(&mut self) -> Option<VideoUnit> {
        self.video_rx.try_recv().ok()
    }

    fn is_active(&self) -> bool {
        !self.shared.finished.load(Ordering::Acquire)
            || !self.audio_rx.is_empty()
            || !self.video_rx.is_empty()
    }

    fn has_error(&self) -> bool {
        self.shared.error.lock().is_some()
    }

    fn error_message(&self) -> Option<String> {
        self.shared.error.lock().clone()
    }

    fn wait_ready(&self, timeout: Duration) {
        let mut select = Select::new();
        select.recv(&self.audio_rx);
        select.recv(&self.video_rx);
        let _ = select.ready_timeout(timeout);
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PixelFormat;
    use std::time::Instant;

    fn frame(play_ms: u32) -> VideoUnit {
        VideoUnit::new(play_ms, 30.0, 2, 2, PixelFormat::Iyuv, vec![0; 6]).unwrap()
    }

    #[test]
    fn test_poll_order_and_liveness() {
        let (feeder, mut source) = channel_source(4);
        assert!(source.is_active());
        assert!(source.poll_video().is_none());

        assert!(feeder.send_video(frame(0)));
        assert!(feeder.send_video(frame(33)));
        assert!(feeder.send_audio(AudioUnit::new(0, 1, 8000, vec![0.0; 8]).unwrap()));
        drop(feeder);

        // Finished producer with undelivered units is still active
        assert!(source.is_active());
        assert_eq!(source.backlog(), (1, 2));
        assert_eq!(source.poll_video().map(|f| f.play_ms), Some(0));
        assert_eq!(source.poll_video().map(|f| f.play_ms), Some(33));
        assert!(source.poll_audio().is_some());
        assert!(!source.is_active());
    }

    #[test]
    fn test_error_reporting() {
        let (feeder, source) = channel_source(1);
        assert!(!source.has_error());
        feeder.fail("bad packet");
        feeder.fail("second fault is ignored");
        assert!(source.has_error());
        assert_eq!(source.error_message().as_deref(), Some("bad packet"));
    }

    #[test]
    fn test_cancel_on_consumer_drop() {
        let (feeder, source) = channel_source(1);
        assert!(!feeder.is_cancelled());
        drop(source);
        assert!(feeder.is_cancelled());
        assert!(!feeder.send_video(frame(0)));
    }

    #[test]
    fn test_wait_ready_wakes_on_delivery() {
        let (feeder, source) = channel_source(1);
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            feeder.send_video(frame(0));
            feeder
        });

        let started = Instant::now();
        source.wait_ready(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(producer.join().unwrap());
    }
}
