//! Player module for syncplay
//!
//! This module keeps audio and video in step: the presentation clock, the
//! video scheduler deciding which frame is shown when, and the driver
//! orchestrating a whole playback session.

pub mod clock;
pub mod driver;
pub mod scheduler;

pub use clock::{ManualTime, MonotonicTime, PresentationClock, TimeSource};
pub use driver::{DriverOptions, PlaybackDriver, PlaybackReport};
pub use scheduler::{Decision, FrameState, SchedulerStats, VideoScheduler};
