//! Audio queue shared between the playback loop and the audio callback
//!
//! The playback loop appends decoded [`AudioUnit`]s at the tail; the
//! [`AudioRenderer`] running inside the output device callback drains them
//! from the head, converting to 16-bit PCM as it goes. The FIFO is the only
//! state the two contexts share and is only touched under its mutex. The
//! unit being converted is moved out of the FIFO first, so conversion runs
//! without the lock held.
//!
//! Finished units are not freed on the callback thread. They travel back
//! through a lock-free ring and are dropped by [`AudioQueue::reclaim`].

use crate::audio::convert::convert_samples;
use crate::decoder::AudioUnit;
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A unit plus how many of its frames have been emitted
#[derive(Debug)]
struct QueueNode {
    unit: AudioUnit,
    offset: usize,
}

impl QueueNode {
    fn new(unit: AudioUnit) -> Self {
        Self { unit, offset: 0 }
    }

    fn remaining_frames(&self) -> usize {
        self.unit.frames.saturating_sub(self.offset)
    }
}

#[derive(Default)]
struct QueueState {
    nodes: VecDeque<QueueNode>,

    /// Queued nodes plus the one the renderer holds
    outstanding: usize,
}

/// Rejected enqueue; the unit is handed back untouched
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("audio queue is full")]
    Full(AudioUnit),

    #[error("audio queue storage could not grow")]
    OutOfMemory(AudioUnit),
}

impl EnqueueError {
    pub fn into_unit(self) -> AudioUnit {
        match self {
            EnqueueError::Full(unit) | EnqueueError::OutOfMemory(unit) => unit,
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub units_completed: u64,
    pub frames_rendered: u64,
    pub underruns: u64,
}

/// FIFO of pending audio units
pub struct AudioQueue {
    state: Mutex<QueueState>,
    drained: Condvar,

    /// Maximum queued nodes, 0 for unbounded
    capacity: usize,

    /// Set once no more units will be enqueued
    input_done: AtomicBool,

    recycled: Mutex<HeapCons<AudioUnit>>,

    units_completed: AtomicU64,
    frames_rendered: AtomicU64,
    underruns: AtomicU64,
}

impl AudioQueue {
    /// Create a queue together with the renderer that drains it
    ///
    /// `capacity` bounds queued units (0 = unbounded); `recycle_capacity`
    /// sizes the ring carrying finished units back from the callback.
    pub fn with_renderer(capacity: usize, recycle_capacity: usize) -> (Arc<Self>, AudioRenderer) {
        let (recycle, recycled) = HeapRb::<AudioUnit>::new(recycle_capacity.max(1)).split();

        let queue = Arc::new(Self {
            state: Mutex::new(QueueState {
                nodes: VecDeque::with_capacity(capacity),
                outstanding: 0,
            }),
            drained: Condvar::new(),
            capacity,
            input_done: AtomicBool::new(false),
            recycled: Mutex::new(recycled),
            units_completed: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        });

        let renderer = AudioRenderer {
            queue: Arc::clone(&queue),
            current: None,
            recycle,
        };

        (queue, renderer)
    }

    /// Append a unit at the tail
    pub fn enqueue(&self, unit: AudioUnit) -> Result<(), EnqueueError> {
        let mut state = self.state.lock();
        if self.capacity > 0 && state.nodes.len() >= self.capacity {
            return Err(EnqueueError::Full(unit));
        }
        if state.nodes.try_reserve(1).is_err() {
            return Err(EnqueueError::OutOfMemory(unit));
        }

        state.nodes.push_back(QueueNode::new(unit));
        state.outstanding += 1;
        Ok(())
    }

    /// Units waiting in the FIFO, not counting one being rendered
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().nodes.is_empty()
    }

    /// Units not yet fully played, including one being rendered
    pub fn pending_units(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Block until every unit has been played or `timeout` passes
    ///
    /// Returns whether the queue drained.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.outstanding > 0 {
            if self.drained.wait_until(&mut state, deadline).timed_out() {
                return state.outstanding == 0;
            }
        }
        true
    }

    /// Drop every unit still waiting in the FIFO, returning how many
    pub fn clear(&self) -> usize {
        let removed: Vec<QueueNode> = {
            let mut state = self.state.lock();
            let removed: Vec<QueueNode> = state.nodes.drain(..).collect();
            state.outstanding -= removed.len();
            if state.outstanding == 0 {
                self.drained.notify_all();
            }
            removed
        };
        removed.len()
    }

    /// Drop units the renderer has finished with, returning how many
    pub fn reclaim(&self) -> usize {
        let mut recycled = self.recycled.lock();
        let mut count = 0;
        while let Some(unit) = recycled.try_pop() {
            drop(unit);
            count += 1;
        }
        count
    }

    /// Mark that no more units will arrive; later silence is not an underrun
    pub fn finish_input(&self) {
        self.input_done.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            units_completed: self.units_completed.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }

    fn take_head(&self) -> Option<QueueNode> {
        self.state.lock().nodes.pop_front()
    }

    fn complete(&self) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding == 0 {
            self.drained.notify_all();
        }
    }
}

/// Callback-side half of an [`AudioQueue`]
///
/// Lives inside the output device callback. Holds the unit currently being
/// converted together with its offset across invocations.
pub struct AudioRenderer {
    queue: Arc<AudioQueue>,
    current: Option<QueueNode>,
    recycle: HeapProd<AudioUnit>,
}

impl AudioRenderer {
    /// Fill `out` with interleaved 16-bit PCM from the queue
    ///
    /// Only whole frames are written; whatever the queue cannot supply is
    /// silence. Never allocates and only takes the queue lock briefly.
    pub fn render(&mut self, out: &mut [i16]) {
        let mut written = 0;
        let mut frames_rendered = 0u64;

        loop {
            if self.current.is_none() {
                self.current = self.queue.take_head();
            }
            let Some(node) = self.current.as_mut() else {
                break;
            };

            let channels = (node.unit.channels as usize).max(1);
            let room = (out.len() - written) / channels;
            let frames = node.remaining_frames().min(room);
            if frames > 0 {
                let count = frames * channels;
                let src = &node.unit.samples_from(node.offset)[..count];
                convert_samples(src, &mut out[written..written + count]);
                written += count;
                node.offset += frames;
                frames_rendered += frames as u64;
            }

            if node.remaining_frames() > 0 {
                break;
            }
            if let Some(done) = self.current.take() {
                self.release(done.unit);
            }
        }

        if written < out.len() {
            out[written..].fill(0);
            if !self.queue.input_done.load(Ordering::Acquire) {
                self.queue.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.queue
            .frames_rendered
            .fetch_add(frames_rendered, Ordering::Relaxed);
    }

    /// Frames of the in-flight unit already emitted
    pub fn current_offset(&self) -> Option<usize> {
        self.current.as_ref().map(|node| node.offset)
    }

    fn release(&mut self, unit: AudioUnit) {
        self.queue.units_completed.fetch_add(1, Ordering::Relaxed);
        // A full ring means the loop is behind on reclaiming; free it here
        if let Err(unit) = self.recycle.try_push(unit) {
            drop(unit);
        }
        self.queue.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(play_ms: u32, frames: usize) -> AudioUnit {
        let samples = (0..frames * 2)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        AudioUnit::new(play_ms, 2, 48000, samples).unwrap()
    }

    fn queue_of(units: Vec<AudioUnit>) -> (Arc<AudioQueue>, AudioRenderer) {
        let (queue, renderer) = AudioQueue::with_renderer(0, 8);
        for unit in units {
            queue.enqueue(unit).unwrap();
        }
        (queue, renderer)
    }

    #[test]
    fn test_whole_units_in_order() {
        let (queue, mut renderer) = queue_of(vec![
            alternating(0, 10),
            alternating(10, 10),
            alternating(20, 10),
        ]);

        let mut out = [0i16; 40];
        renderer.render(&mut out);

        for pair in out.chunks_exact(2) {
            assert_eq!(pair, &[16383, -16383]);
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_units(), 1);
        assert_eq!(renderer.current_offset(), None);
        assert_eq!(queue.stats().units_completed, 2);
        assert_eq!(queue.reclaim(), 2);
    }

    #[test]
    fn test_partial_unit_offset_carries_over() {
        let (queue, mut renderer) = queue_of(vec![alternating(0, 10), alternating(10, 10)]);

        let mut out = [0i16; 30];
        renderer.render(&mut out);
        assert_eq!(renderer.current_offset(), Some(5));
        assert_eq!(queue.pending_units(), 1);

        let mut out = [1i16; 12];
        renderer.render(&mut out);
        assert_eq!(&out[..10], &[16383, -16383, 16383, -16383, 16383, -16383, 16383, -16383, 16383, -16383]);
        assert_eq!(&out[10..], &[0, 0]);
        assert_eq!(queue.pending_units(), 0);
        assert_eq!(queue.stats().frames_rendered, 20);
    }

    #[test]
    fn test_clamping_through_callback() {
        let unit = AudioUnit::new(0, 1, 8000, vec![-1.5, 2.0, 1.0, -1.0]).unwrap();
        let (_queue, mut renderer) = queue_of(vec![unit]);

        let mut out = [0i16; 4];
        renderer.render(&mut out);
        assert_eq!(out, [-32768, 32767, 32767, -32767]);
    }

    #[test]
    fn test_only_whole_frames_emitted() {
        let unit = AudioUnit::new(0, 2, 8000, vec![0.5, 0.5, 0.5, 0.5]).unwrap();
        let (_queue, mut renderer) = queue_of(vec![unit]);

        let mut out = [9i16; 3];
        renderer.render(&mut out);
        assert_eq!(out, [16383, 16383, 0]);
        assert_eq!(renderer.current_offset(), Some(1));
    }

    #[test]
    fn test_idempotent_drain() {
        let (queue, mut renderer) = queue_of(vec![alternating(0, 2)]);
        queue.finish_input();

        let mut out = [0i16; 8];
        renderer.render(&mut out);
        assert_eq!(&out[4..], &[0, 0, 0, 0]);

        for _ in 0..3 {
            let mut out = [5i16; 8];
            renderer.render(&mut out);
            assert_eq!(out, [0; 8]);
        }
        assert_eq!(queue.stats().underruns, 0);
        assert!(queue.wait_drained(Duration::ZERO));
    }

    #[test]
    fn test_underrun_counted_while_input_open() {
        let (queue, mut renderer) = queue_of(vec![]);
        let mut out = [0i16; 4];
        renderer.render(&mut out);
        renderer.render(&mut out);
        assert_eq!(queue.stats().underruns, 2);
    }

    #[test]
    fn test_capacity_backpressure() {
        let (queue, _renderer) = AudioQueue::with_renderer(2, 4);
        queue.enqueue(alternating(0, 1)).unwrap();
        queue.enqueue(alternating(1, 1)).unwrap();

        let rejected = queue.enqueue(alternating(2, 1)).unwrap_err();
        assert!(matches!(rejected, EnqueueError::Full(_)));
        assert_eq!(rejected.into_unit().play_ms, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_full_recycle_ring_drops_in_place() {
        let (queue, mut renderer) = AudioQueue::with_renderer(0, 1);
        for i in 0..3 {
            queue.enqueue(alternating(i, 1)).unwrap();
        }

        let mut out = [0i16; 6];
        renderer.render(&mut out);
        assert_eq!(queue.stats().units_completed, 3);
        assert_eq!(queue.reclaim(), 1);
        assert_eq!(queue.pending_units(), 0);
    }

    #[test]
    fn test_clear_releases_waiters() {
        let (queue, _renderer) = queue_of(vec![alternating(0, 4), alternating(4, 4)]);
        assert!(!queue.wait_drained(Duration::from_millis(5)));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.wait_drained(Duration::ZERO));
    }

    #[test]
    fn test_wait_drained_across_threads() {
        let (queue, mut renderer) = queue_of(vec![alternating(0, 4), alternating(4, 4)]);

        let callback = std::thread::spawn(move || {
            let mut out = [0i16; 4];
            for _ in 0..4 {
                std::thread::sleep(Duration::from_millis(5));
                renderer.render(&mut out);
            }
        });

        assert!(queue.wait_drained(Duration::from_secs(5)));
        callback.join().unwrap();
        assert_eq!(queue.stats().units_completed, 2);
    }
}
