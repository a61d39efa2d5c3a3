//! Playback driver
//!
//! Owns one playback session from start to finish:
//!
//! 1. Startup polls the source until at least one audio unit and one video
//!    frame are available, opens the audio output from the first audio unit
//!    and the streaming surface from the first frame, queues every audio
//!    unit seen so far, then starts the clock and the audio callback.
//! 2. The main loop runs the video scheduler, feeds the audio queue, and
//!    checks for termination, until the source runs dry, faults, or a quit
//!    is requested.
//! 3. Shutdown waits (bounded) for queued audio to finish playing before
//!    the output is closed.

use crate::audio::{AudioOutput, AudioQueue, AudioSpec};
use crate::decoder::{AudioUnit, UnitSource, VideoUnit};
use crate::player::clock::{MonotonicTime, PresentationClock, TimeSource};
use crate::player::scheduler::{Decision, VideoScheduler};
use crate::renderer::{Display, FramePresenter};
use crate::utils::config::Config;
use crate::utils::error::{PlayerError, Result};
use crate::utils::format_duration;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Tunables for a playback session
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Frames per audio callback requested from the device
    pub buffer_frames: u32,

    /// Queued audio units before enqueue pushes back, 0 for unbounded
    pub max_queued_units: usize,

    /// Finished units the callback can hand back before freeing in place
    pub recycle_capacity: usize,

    /// Wait between source polls during startup
    pub startup_poll: Duration,

    /// Longest the main loop idles in one iteration
    pub idle_wait: Duration,

    /// Longest shutdown waits for queued audio to play out
    pub drain_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DriverOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_frames: config.audio.buffer_frames,
            max_queued_units: config.audio.max_queued_units,
            recycle_capacity: config.audio.recycle_capacity,
            startup_poll: config.playback.startup_poll(),
            idle_wait: config.playback.idle_wait(),
            drain_timeout: config.playback.drain_timeout(),
        }
    }
}

/// Summary of a finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub audio_units_played: u64,
    pub underruns: u64,

    /// Clock position when the main loop ended
    pub position: Duration,

    /// A quit request ended playback before the source ran dry
    pub terminated_early: bool,

    /// Every queued audio unit finished playing before shutdown
    pub drained: bool,
}

/// What the startup phase gathered
struct Primed {
    first_frame: VideoUnit,
    audio: VecDeque<AudioUnit>,
}

/// Drives a [`UnitSource`] onto a [`Display`] and an [`AudioOutput`]
pub struct PlaybackDriver<S, D, A> {
    source: S,
    display: D,
    audio: A,
    options: DriverOptions,
    time: Arc<dyn TimeSource>,
    shutdown: Arc<AtomicBool>,
}

impl<S, D, A> PlaybackDriver<S, D, A>
where
    S: UnitSource,
    D: Display,
    A: AudioOutput,
{
    pub fn new(source: S, display: D, audio: A, options: DriverOptions) -> Self {
        Self {
            source,
            display,
            audio,
            options,
            time: Arc::new(MonotonicTime::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read the presentation clock from `time` instead of the wall clock
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Flag that ends playback when set, checked once per iteration
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Play the source to completion
    ///
    /// # Returns
    ///
    /// A report once playback ended normally or by request. `Init` when the
    /// audio output or display cannot be set up; `Decode` when the source
    /// faults or ends before playback could start.
    pub fn run(&mut self) -> Result<PlaybackReport> {
        let Some(primed) = self.prime()? else {
            info!("Quit requested during startup");
            return Ok(PlaybackReport {
                terminated_early: true,
                drained: true,
                ..PlaybackReport::default()
            });
        };
        let Primed {
            first_frame,
            audio: mut backlog,
        } = primed;

        let first_audio = backlog
            .front()
            .ok_or_else(|| PlayerError::Internal("Startup finished without audio".to_string()))?;
        let spec = AudioSpec::new(
            first_audio.sample_rate,
            first_audio.channels,
            self.options.buffer_frames,
        );
        info!(
            "Starting playback: {}x{} video @ {:.2} fps, {} Hz {} channel audio",
            first_frame.width,
            first_frame.height,
            first_frame.fps,
            spec.sample_rate,
            spec.channels
        );

        self.display.create_streaming_surface(
            first_frame.width,
            first_frame.height,
            FramePresenter::SURFACE_FORMAT,
        )?;
        let mut presenter = FramePresenter::for_surface(first_frame.width, first_frame.height);

        let (queue, renderer) =
            AudioQueue::with_renderer(self.options.max_queued_units, self.options.recycle_capacity);
        self.audio.open(spec, renderer)?;

        feed_audio(&mut self.source, &queue, &mut backlog);
        debug!("Queued {} audio units before start", queue.len());

        let mut clock = PresentationClock::new(Arc::clone(&self.time));
        let mut scheduler = VideoScheduler::new(first_frame);
        clock.start();
        if let Err(e) = self.audio.pause(false) {
            self.audio.close();
            return Err(PlayerError::Init(e.to_string()));
        }

        let mut terminated_early = false;
        loop {
            if self.quit_requested() {
                info!("Quit requested at {}", format_duration(clock.position()));
                terminated_early = true;
                break;
            }
            if self.source.has_error() {
                return Err(self.abort_decode(&queue));
            }

            let decision = scheduler.step(&mut self.source, clock.now_ms());
            if let Decision::Present(frame) = &decision {
                if let Err(e) = presenter.present(&mut self.display, frame) {
                    self.audio.close();
                    return Err(e);
                }
            }

            feed_audio(&mut self.source, &queue, &mut backlog);
            queue.reclaim();

            if !self.source.is_active() && scheduler.current().is_none() && backlog.is_empty() {
                // A producer that faults on its way out also goes inactive
                if self.source.has_error() {
                    return Err(self.abort_decode(&queue));
                }
                info!("Source finished at {}", format_duration(clock.position()));
                break;
            }

            match decision {
                Decision::Present(_) => {}
                Decision::Hold { due_in_ms } => {
                    thread::sleep(self.options.idle_wait.min(Duration::from_millis(due_in_ms as u64)));
                }
                // Audio already waiting in the source would wake wait_ready at once
                Decision::Waiting if !backlog.is_empty() => thread::sleep(self.options.idle_wait),
                Decision::Waiting => self.source.wait_ready(self.options.idle_wait),
            }
        }

        let position = clock.position();
        if let Some(frame) = scheduler.take_current() {
            debug!("Releasing unpresented frame at {} ms", frame.play_ms);
        }
        if !backlog.is_empty() {
            debug!("Releasing {} audio units never queued", backlog.len());
            backlog.clear();
        }

        queue.finish_input();
        let drained = queue.wait_drained(self.options.drain_timeout);
        if !drained {
            warn!(
                "Audio did not drain within {:?}; discarding {} queued units",
                self.options.drain_timeout,
                queue.pending_units()
            );
            queue.clear();
        }
        self.audio.close();
        queue.reclaim();

        let audio_stats = queue.stats();
        let video_stats = scheduler.stats();
        let report = PlaybackReport {
            frames_presented: video_stats.presented,
            frames_dropped: video_stats.dropped,
            audio_units_played: audio_stats.units_completed,
            underruns: audio_stats.underruns,
            position,
            terminated_early,
            drained,
        };
        info!(
            "Playback finished: {} frames shown, {} dropped, {} audio units played, {} underruns",
            report.frames_presented, report.frames_dropped, report.audio_units_played, report.underruns
        );
        Ok(report)
    }

    /// Poll until one unit of each kind is in hand; `None` if a quit came first
    fn prime(&mut self) -> Result<Option<Primed>> {
        let mut first_frame = None;
        let mut audio = VecDeque::new();

        loop {
            if self.quit_requested() {
                return Ok(None);
            }

            while let Some(unit) = self.source.poll_audio() {
                audio.push_back(unit);
            }
            if first_frame.is_none() {
                first_frame = self.source.poll_video();
            }

            if !audio.is_empty() {
                if let Some(frame) = first_frame.take() {
                    return Ok(Some(Primed {
                        first_frame: frame,
                        audio,
                    }));
                }
            }

            if self.source.has_error() {
                let message = self
                    .source
                    .error_message()
                    .unwrap_or_else(|| "unknown decode error".to_string());
                return Err(PlayerError::Decode(message));
            }
            if !self.source.is_active() {
                return Err(PlayerError::Decode(format!(
                    "Source ended before playback could start (audio: {}, video: {})",
                    !audio.is_empty(),
                    first_frame.is_some()
                )));
            }

            self.source.wait_ready(self.options.startup_poll);
        }
    }

    /// Tear down audio after a source fault and build the error to return
    fn abort_decode(&mut self, queue: &AudioQueue) -> PlayerError {
        let message = self
            .source
            .error_message()
            .unwrap_or_else(|| "unknown decode error".to_string());
        error!("Source reported a decode error: {}", message);
        self.audio.close();
        queue.clear();
        queue.reclaim();
        PlayerError::Decode(message)
    }

    fn quit_requested(&mut self) -> bool {
        let window_quit = self.display.pump_events();
        window_quit || self.shutdown.load(Ordering::Acquire)
    }
}

/// Move audio into the queue, oldest first, holding back what it rejects
///
/// Units the queue refused stay at the front of `backlog`; the source is
/// only polled once the backlog is empty.
fn feed_audio<S: UnitSource + ?Sized>(source: &mut S, queue: &AudioQueue, backlog: &mut VecDeque<AudioUnit>) {
    while let Some(unit) = backlog.pop_front() {
        if let Err(rejected) = queue.enqueue(unit) {
            debug!("Audio queue pushing back: {}", rejected);
            backlog.push_front(rejected.into_unit());
            return;
        }
    }

    while let Some(unit) = source.poll_audio() {
        if let Err(rejected) = queue.enqueue(unit) {
            debug!("Audio queue pushing back: {}", rejected);
            backlog.push_back(rejected.into_unit());
            return;
        }
    }
}
