//! End-to-end playback tests
//!
//! These tests drive the public API the way the binary does, with a fake
//! audio device rendering on its own thread and an in-memory display:
//! - Audio callback output and partial-unit carry-over
//! - Video catch-up under lag
//! - Draining queued audio on quit and at end of stream
//! - Decode and initialization failures

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use syncplay::audio::AudioQueue;
use syncplay::decoder::channel_source;
use syncplay::player::{Decision, ManualTime, PresentationClock, VideoScheduler};
use syncplay::renderer::MemoryDisplay;
use syncplay::{DriverOptions, PlaybackDriver, PlayerError};
use syncplay_integration_tests::{audio_unit, video_frame, ScriptedSource, ThreadedOutput};

fn fast_options() -> DriverOptions {
    DriverOptions {
        buffer_frames: 64,
        startup_poll: Duration::from_millis(1),
        idle_wait: Duration::from_millis(2),
        drain_timeout: Duration::from_secs(5),
        ..DriverOptions::default()
    }
}

#[test]
fn test_callback_converts_queued_units_in_order() -> Result<()> {
    let (queue, mut renderer) = AudioQueue::with_renderer(0, 8);
    for i in 0..3 {
        let samples = (0..20).map(|s| if s % 2 == 0 { 0.5 } else { -0.5 }).collect();
        queue.enqueue(syncplay::decoder::AudioUnit::new(i * 10, 2, 48000, samples)?)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    let mut out = [0i16; 40];
    renderer.render(&mut out);

    let expected: Vec<i16> = (0..40).map(|i| if i % 2 == 0 { 16383 } else { -16383 }).collect();
    assert_eq!(out.to_vec(), expected);
    assert!(queue.is_empty());
    assert_eq!(queue.pending_units(), 1);
    assert_eq!(queue.stats().units_completed, 2);
    assert_eq!(renderer.current_offset(), Some(0));

    // The third unit carries on from its start on the next callback
    let mut out = [0i16; 6];
    renderer.render(&mut out);
    assert_eq!(out, [16383, -16383, 16383, -16383, 16383, -16383]);
    assert_eq!(renderer.current_offset(), Some(3));

    Ok(())
}

#[test]
fn test_lagging_video_skips_to_newest_due_frame() -> Result<()> {
    let time = Arc::new(ManualTime::new(0));
    let mut clock = PresentationClock::new(time.clone());
    clock.start();

    let mut source = ScriptedSource::with_frames(&[33, 66, 99, 132], 30.0);
    let mut scheduler = VideoScheduler::new(video_frame(0, 30.0));

    time.advance(140);
    let shown = match scheduler.step(&mut source, clock.now_ms()) {
        Decision::Present(frame) => frame.play_ms,
        other => anyhow::bail!("expected a frame, got {:?}", other),
    };

    assert_eq!(shown, 132);
    assert_eq!(scheduler.stats().dropped, 4);
    assert_eq!(scheduler.stats().presented, 1);
    Ok(())
}

#[test]
fn test_quit_mid_playback_drains_audio() -> Result<()> {
    let (feeder, source) = channel_source(8);
    for i in 0..20 {
        feeder.send_audio(audio_unit(i * 10, 64, 0.5));
    }
    for i in 0..8 {
        feeder.send_video(video_frame(i * 40, 25.0));
    }

    let (output, monitor) = ThreadedOutput::new(64, Duration::from_millis(2));
    let display = MemoryDisplay::new().quit_after(4);
    let mut driver = PlaybackDriver::new(source, display, output, fast_options());

    let report = driver.run()?;

    assert!(report.terminated_early);
    assert!(report.drained);
    assert_eq!(report.audio_units_played, 20);
    assert!(!monitor.is_open());

    // Every queued sample reached the device exactly once
    let played = monitor.samples().iter().filter(|&&s| s == 16383).count();
    assert_eq!(played, 20 * 64 * 2);

    drop(feeder);
    Ok(())
}

#[test]
fn test_end_of_stream_plays_everything() -> Result<()> {
    let (feeder, source) = channel_source(8);
    for i in 0..10 {
        feeder.send_audio(audio_unit(i * 5, 32, 0.25));
    }
    for i in 0..4 {
        feeder.send_video(video_frame(i * 10, 100.0));
    }
    drop(feeder);

    let (output, monitor) = ThreadedOutput::new(64, Duration::from_millis(1));
    let mut driver = PlaybackDriver::new(source, MemoryDisplay::new(), output, fast_options());

    let report = driver.run()?;

    assert!(!report.terminated_early);
    assert!(report.drained);
    assert_eq!(report.frames_presented + report.frames_dropped, 4);
    assert_eq!(driver.display().presented_frames(), report.frames_presented);
    assert_eq!(driver.display().surface_size(), Some((4, 4)));
    assert_eq!(report.audio_units_played, 10);

    let spec = monitor.spec().ok_or_else(|| anyhow::anyhow!("output never opened"))?;
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.buffer_frames, 64);
    Ok(())
}

#[test]
fn test_decode_error_stops_playback() -> Result<()> {
    let (feeder, source) = channel_source(8);
    feeder.send_audio(audio_unit(0, 64, 0.5));
    feeder.send_video(video_frame(0, 25.0));
    feeder.send_video(video_frame(5_000, 25.0));

    let (output, monitor) = ThreadedOutput::new(64, Duration::from_millis(2));
    let mut driver = PlaybackDriver::new(source, MemoryDisplay::new(), output, fast_options());

    let failer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        feeder.fail("corrupt page");
        feeder
    });

    let result = driver.run();
    assert!(matches!(result, Err(PlayerError::Decode(ref msg)) if msg == "corrupt page"));
    assert!(!monitor.is_open());

    drop(failer.join());
    Ok(())
}

#[test]
fn test_missing_audio_device_is_init_failure() {
    let mut source = ScriptedSource::with_frames(&[0, 40], 25.0);
    source.audio.push_back(audio_unit(0, 16, 0.1));

    let mut driver = PlaybackDriver::new(
        source,
        MemoryDisplay::new(),
        ThreadedOutput::unavailable(),
        fast_options(),
    );

    match driver.run() {
        Err(e) => assert!(e.is_init_failure()),
        Ok(report) => panic!("playback should not start, got {:?}", report),
    }
}
