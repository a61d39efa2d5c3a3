//! Video frame scheduling
//!
//! Each loop iteration the scheduler decides whether the current frame is
//! presented now, held for later, or skipped because the decoder has fallen
//! behind. Under lag it discards intermediate frames until it reaches the
//! newest one that is still due, keeping visible delay near one frame
//! interval.

use crate::decoder::{UnitSource, VideoUnit};
use log::debug;

/// Where the current frame stands relative to the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame in hand
    WaitingForFrame,

    /// Frame in hand, presentation time not reached
    Pending,

    /// Presentation time reached
    FrameDue,

    /// Presentation time passed by at least one frame interval
    FrameLate,
}

/// Outcome of one scheduling step
#[derive(Debug)]
pub enum Decision {
    /// Nothing to show and nothing buffered
    Waiting,

    /// The current frame becomes due in `due_in_ms`
    Hold { due_in_ms: u32 },

    /// Show this frame now
    Present(VideoUnit),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub presented: u64,
    pub dropped: u64,
}

pub struct VideoScheduler {
    current: Option<VideoUnit>,

    /// Lateness threshold in ms; 0 disables catch-up
    interval_ms: u32,

    last_presented_ms: Option<u32>,
    stats: SchedulerStats,
}

impl VideoScheduler {
    /// Start with `first` as the current frame, taking the frame interval
    /// from its rate hint
    pub fn new(first: VideoUnit) -> Self {
        let mut scheduler = Self::with_interval(first.frame_interval_ms());
        scheduler.current = Some(first);
        scheduler
    }

    pub fn with_interval(interval_ms: u32) -> Self {
        Self {
            current: None,
            interval_ms,
            last_presented_ms: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn frame_interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn current(&self) -> Option<&VideoUnit> {
        self.current.as_ref()
    }

    /// Give up the frame in hand, if any
    pub fn take_current(&mut self) -> Option<VideoUnit> {
        self.current.take()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn state(&self, now_ms: u32) -> FrameState {
        match &self.current {
            None => FrameState::WaitingForFrame,
            Some(frame) if frame.play_ms > now_ms => FrameState::Pending,
            Some(frame) if self.is_late(frame, now_ms) => FrameState::FrameLate,
            Some(_) => FrameState::FrameDue,
        }
    }

    /// Advance one iteration at clock position `now_ms`
    pub fn step<S: UnitSource + ?Sized>(&mut self, source: &mut S, now_ms: u32) -> Decision {
        if self.current.is_none() {
            self.current = self.fetch(source);
        }
        let Some(mut due) = self.current.take() else {
            return Decision::Waiting;
        };

        if due.play_ms > now_ms {
            let due_in_ms = due.play_ms - now_ms;
            self.current = Some(due);
            return Decision::Hold { due_in_ms };
        }

        while self.is_late(&due, now_ms) {
            let Some(next) = self.fetch(source) else {
                break;
            };
            if next.play_ms > now_ms {
                // Not due yet; keep it for a later iteration
                self.current = Some(next);
                break;
            }
            debug!("Dropping late frame at {} ms (clock {} ms)", due.play_ms, now_ms);
            self.stats.dropped += 1;
            due = next;
        }

        self.stats.presented += 1;
        self.last_presented_ms = Some(due.play_ms);
        Decision::Present(due)
    }

    fn is_late(&self, frame: &VideoUnit, now_ms: u32) -> bool {
        self.interval_ms > 0 && now_ms.saturating_sub(frame.play_ms) >= self.interval_ms
    }

    /// Next frame from the source, skipping any older than what was shown
    fn fetch<S: UnitSource + ?Sized>(&mut self, source: &mut S) -> Option<VideoUnit> {
        while let Some(frame) = source.poll_video() {
            match self.last_presented_ms {
                Some(last) if frame.play_ms < last => {
                    debug!("Dropping out-of-order frame at {} ms", frame.play_ms);
                    self.stats.dropped += 1;
                }
                _ => return Some(frame),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{AudioUnit, PixelFormat};
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Frames(VecDeque<VideoUnit>);

    impl UnitSource for Frames {
        fn poll_audio(&mut self) -> Option<AudioUnit> {
            None
        }

        fn poll_video(&mut self) -> Option<VideoUnit> {
            self.0.pop_front()
        }

        fn is_active(&self) -> bool {
            !self.0.is_empty()
        }

        fn has_error(&self) -> bool {
            false
        }
    }

    fn frame(play_ms: u32) -> VideoUnit {
        VideoUnit::new(play_ms, 30.0, 2, 2, PixelFormat::Iyuv, vec![0; 6]).unwrap()
    }

    fn frames(times: &[u32]) -> Frames {
        Frames(times.iter().map(|&t| frame(t)).collect())
    }

    #[test]
    fn test_catch_up_presents_newest_due_frame() {
        let mut source = frames(&[33, 66, 99, 132]);
        let mut scheduler = VideoScheduler::new(frame(0));
        assert_eq!(scheduler.frame_interval_ms(), 33);
        assert_eq!(scheduler.state(140), FrameState::FrameLate);

        match scheduler.step(&mut source, 140) {
            Decision::Present(shown) => assert_eq!(shown.play_ms, 132),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(scheduler.stats(), SchedulerStats { presented: 1, dropped: 4 });
        assert!(matches!(scheduler.step(&mut source, 140), Decision::Waiting));
    }

    #[test]
    fn test_hold_until_due() {
        let mut source = frames(&[]);
        let mut scheduler = VideoScheduler::new(frame(40));
        assert_eq!(scheduler.state(10), FrameState::Pending);

        match scheduler.step(&mut source, 10) {
            Decision::Hold { due_in_ms } => assert_eq!(due_in_ms, 30),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(scheduler.state(40), FrameState::FrameDue);
        assert!(matches!(scheduler.step(&mut source, 40), Decision::Present(_)));
    }

    #[test]
    fn test_future_frame_is_not_shown_early() {
        let mut source = frames(&[33, 200]);
        let mut scheduler = VideoScheduler::new(frame(0));

        match scheduler.step(&mut source, 80) {
            Decision::Present(shown) => assert_eq!(shown.play_ms, 33),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(scheduler.current().map(|f| f.play_ms), Some(200));
        assert_eq!(scheduler.stats().dropped, 1);
    }

    #[test]
    fn test_late_frame_without_successor_is_shown() {
        let mut source = frames(&[]);
        let mut scheduler = VideoScheduler::new(frame(0));
        assert!(matches!(scheduler.step(&mut source, 500), Decision::Present(_)));
        assert_eq!(scheduler.stats().dropped, 0);
    }

    #[test]
    fn test_unknown_rate_disables_catch_up() {
        let mut source = frames(&[10, 20]);
        let mut scheduler = VideoScheduler::with_interval(0);

        match scheduler.step(&mut source, 1000) {
            Decision::Present(shown) => assert_eq!(shown.play_ms, 10),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(scheduler.stats().dropped, 0);
    }

    #[test]
    fn test_out_of_order_frames_are_dropped() {
        let mut source = frames(&[50, 20, 60]);
        let mut scheduler = VideoScheduler::with_interval(33);

        assert!(matches!(scheduler.step(&mut source, 55), Decision::Present(_)));
        match scheduler.step(&mut source, 60) {
            Decision::Present(shown) => assert_eq!(shown.play_ms, 60),
            other => panic!("unexpected decision {:?}", other),
        }
        assert_eq!(scheduler.stats().dropped, 1);
    }

    proptest! {
        #[test]
        fn presentation_order_never_goes_back(
            times in proptest::collection::vec(0u32..5_000, 1..40),
            steps in proptest::collection::vec(0u32..200, 1..60),
            interval in 0u32..100,
        ) {
            let mut source = frames(&times);
            let mut scheduler = VideoScheduler::with_interval(interval);
            let mut now = 0u32;
            let mut shown = Vec::new();

            for step in steps {
                now += step;
                if let Decision::Present(frame) = scheduler.step(&mut source, now) {
                    prop_assert!(frame.play_ms <= now);
                    shown.push(frame.play_ms);
                }
            }

            prop_assert!(shown.windows(2).all(|pair| pair[0] <= pair[1]));
        }

        #[test]
        fn sustained_lag_drops_frames(interval in 10u32..60, count in 3usize..20) {
            let times: Vec<u32> = (0..count as u32).map(|i| i * interval).collect();
            let mut source = frames(&times[1..]);
            let mut scheduler = VideoScheduler {
                interval_ms: interval,
                ..VideoScheduler::new(frame(0))
            };

            let now = times[count - 1] + interval;
            match scheduler.step(&mut source, now) {
                Decision::Present(shown) => prop_assert_eq!(shown.play_ms, times[count - 1]),
                other => prop_assert!(false, "unexpected decision {:?}", other),
            }
            prop_assert!(scheduler.stats().dropped >= 1);
        }
    }
}
