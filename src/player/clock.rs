//! Presentation clock
//!
//! Playback position is the time elapsed since [`PresentationClock::start`],
//! read from a pluggable [`TimeSource`] so tests can drive it by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond counter
pub trait TimeSource: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin; never decreases
    fn now_ms(&self) -> u64;
}

/// Wall-clock time source backed by [`Instant`]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Time source that only moves when told to
#[derive(Default)]
pub struct ManualTime {
    now: AtomicU64,
}

impl ManualTime {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }

    /// Jump to `ms`; earlier values are ignored
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::AcqRel);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Playback clock anchored at a single start timestamp
pub struct PresentationClock {
    source: Arc<dyn TimeSource>,
    start_ms: Option<u64>,
}

impl PresentationClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            start_ms: None,
        }
    }

    /// Anchor position zero at the current time
    pub fn start(&mut self) {
        self.start_ms = Some(self.source.now_ms());
    }

    pub fn is_started(&self) -> bool {
        self.start_ms.is_some()
    }

    /// Current position in milliseconds, 0 before the clock starts
    pub fn now_ms(&self) -> u32 {
        match self.start_ms {
            Some(start) => self
                .source
                .now_ms()
                .saturating_sub(start)
                .min(u32::MAX as u64) as u32,
            None => 0,
        }
    }

    pub fn position(&self) -> Duration {
        Duration::from_millis(self.now_ms() as u64)
    }
}
