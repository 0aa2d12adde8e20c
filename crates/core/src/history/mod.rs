//! Display window of conditioned readings and the matches that highlight it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::MotionReading;

/// A recognized occurrence, expressed as an inclusive tick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub start_time: u64,
    pub end_time: u64,
}

impl Match {
    pub fn new(start_time: u64, end_time: u64) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, tick: u64) -> bool {
        self.start_time <= tick && tick <= self.end_time
    }
}

/// Bounded most-recent window of readings paired with a monotonic tick
/// counter.
///
/// The counter advances by exactly one per appended reading and is never
/// reset, so the reading appended as the `n`th frame of a session carries
/// tick `n - 1` for as long as it stays in the window.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    readings: VecDeque<MotionReading>,
    ticks: u64,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity + 1),
            ticks: 0,
        }
    }

    /// Appends a reading, evicting the oldest ones beyond capacity, and
    /// returns the tick assigned to it.
    pub fn append(&mut self, reading: MotionReading) -> u64 {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }

        let tick = self.ticks;
        self.ticks += 1;
        tick
    }

    /// Number of readings ever appended. This is also the tick the next
    /// reading will receive.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn latest_tick(&self) -> Option<u64> {
        self.ticks.checked_sub(1)
    }

    /// Tick of the oldest reading still held, if any.
    pub fn oldest_tick(&self) -> Option<u64> {
        self.tick_at(0)
    }

    /// Absolute tick of the reading at `offset` (0 is the oldest).
    pub fn tick_at(&self, offset: usize) -> Option<u64> {
        if offset >= self.readings.len() {
            return None;
        }
        let latest = self.latest_tick()?;
        Some(latest - (self.readings.len() - 1 - offset) as u64)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Chronological (oldest first) view of the buffered readings.
    pub fn iter(&self) -> impl Iterator<Item = &MotionReading> + '_ {
        self.readings.iter()
    }

    pub fn contents(&self) -> Vec<MotionReading> {
        self.readings.iter().copied().collect()
    }

    /// Whether the reading at `offset` falls inside any tracked match.
    pub fn is_match(&self, offset: usize, tracker: &MatchTracker) -> bool {
        self.tick_at(offset)
            .map(|tick| tracker.contains(tick))
            .unwrap_or(false)
    }
}

/// Matches reported by the active matcher.
///
/// Only matches that can still overlap the display window are worth keeping;
/// [`MatchTracker::retain_from`] drops the rest.
#[derive(Debug, Clone, Default)]
pub struct MatchTracker {
    matches: Vec<Match>,
}

impl MatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, found: Match) {
        self.matches.push(found);
    }

    pub fn contains(&self, tick: u64) -> bool {
        self.matches.iter().any(|found| found.contains(tick))
    }

    /// Drops every match that ends before `oldest_tick`.
    pub fn retain_from(&mut self, oldest_tick: u64) {
        self.matches.retain(|found| found.end_time >= oldest_tick);
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }
}
