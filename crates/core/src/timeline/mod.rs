//! Virtual session time and cancellable timers.
//!
//! Time is a [`Duration`] since the session started. Core code never reads a
//! wall clock; the bridge samples [`SessionClock`] and passes `now` in, and
//! tests pass whatever instants they like.

use std::time::{Duration, Instant};

/// Monotonic clock measuring time since the session started.
#[derive(Debug, Clone)]
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Identifies one scheduled timer. Never reused within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    pub handle: TimerHandle,
    pub deadline: Duration,
    pub event: E,
}

/// Pending one-shot timers. Firing a timer yields its event value; the owner
/// decides what to run for it.
#[derive(Debug)]
pub struct TimerQueue<E> {
    events: Vec<ScheduledEvent<E>>,
    next_handle: u64,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn schedule(&mut self, now: Duration, delay: Duration, event: E) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.events.push(ScheduledEvent {
            handle,
            deadline: now + delay,
            event,
        });
        handle
    }

    /// Returns whether the timer was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.events.len();
        self.events.retain(|scheduled| scheduled.handle != handle);
        self.events.len() != before
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.events.iter().any(|scheduled| scheduled.handle == handle)
    }

    /// Removes every timer whose deadline has passed and returns them in
    /// deadline order (scheduling order on ties).
    pub fn fire_due(&mut self, now: Duration) -> Vec<ScheduledEvent<E>> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .events
            .drain(..)
            .partition(|scheduled| scheduled.deadline <= now);
        self.events = pending;
        due.sort_by_key(|scheduled| (scheduled.deadline, scheduled.handle.0));
        due
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.events.iter().map(|scheduled| scheduled.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
