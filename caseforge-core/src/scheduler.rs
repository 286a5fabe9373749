//! Virtual clock and cooperative task queue
//!
//! Every delayed step of a conversation (acknowledgement delays, resynthesis,
//! case start/step/finish) is a task queued here against a virtual millisecond
//! clock. Nothing sleeps: the owner pops due tasks in time order and handles
//! them one at a time, so interleaved timelines stay deterministic.
//!
//! Tasks due at the same instant pop in the order they were scheduled.

use chrono::{DateTime, Duration, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Millisecond clock anchored at a wall-clock origin.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: DateTime<Utc>,
    elapsed_ms: u64,
}

impl VirtualClock {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            elapsed_ms: 0,
        }
    }

    /// Milliseconds since the origin
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Wall-clock time for the current instant
    pub fn now(&self) -> DateTime<Utc> {
        self.at(self.elapsed_ms)
    }

    /// Wall-clock time for an arbitrary offset, saturating at the latest
    /// representable instant.
    pub fn at(&self, elapsed_ms: u64) -> DateTime<Utc> {
        i64::try_from(elapsed_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| self.origin.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Move forward; moving backwards is ignored.
    fn advance_to(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = self.elapsed_ms.max(elapsed_ms);
    }
}

struct Slot<T> {
    due_ms: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

/// Time-ordered queue of pending tasks over a [`VirtualClock`].
pub struct Scheduler<T> {
    clock: VirtualClock,
    queue: BinaryHeap<Reverse<Slot<T>>>,
    next_seq: u64,
}

impl<T> Scheduler<T> {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            clock: VirtualClock::new(origin),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    /// Queue a task at an absolute offset. Offsets in the past run at the next pop.
    pub fn schedule_at(&mut self, due_ms: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Slot { due_ms, seq, task }));
    }

    /// Queue a task `delay_ms` after the current instant.
    pub fn schedule_after(&mut self, delay_ms: u64, task: T) {
        let due = self.clock.elapsed_ms().saturating_add(delay_ms);
        self.schedule_at(due, task);
    }

    /// Offset of the earliest queued task
    pub fn next_due_ms(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(slot)| slot.due_ms)
    }

    /// Pop the earliest task if it is due at or before `until_ms`, moving the
    /// clock to its due time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<T> {
        let due = self.next_due_ms()?;
        if due > until_ms {
            return None;
        }
        self.pop_next()
    }

    /// Pop the earliest task regardless of its due time.
    pub fn pop_next(&mut self) -> Option<T> {
        let Reverse(slot) = self.queue.pop()?;
        self.clock.advance_to(slot.due_ms);
        Some(slot.task)
    }

    /// Move the clock forward without running anything.
    ///
    /// Callers drain due tasks first; this only fills the idle gap.
    pub fn advance_clock_to(&mut self, elapsed_ms: u64) {
        self.clock.advance_to(elapsed_ms);
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued task; the clock keeps its position.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
