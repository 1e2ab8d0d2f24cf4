//! Sliding-window occurrence counter.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

const PREALLOCATED: usize = 64;

/// Counts occurrences inside a rolling time window.
///
/// Occurrences older than `now - period` are pruned lazily whenever the
/// available capacity is read, so every retained instant is always inside the
/// window at the time of the read.
#[derive(Debug, Clone)]
pub struct RollingTimer {
    period: Duration,
    capacity: usize,
    occurrences: VecDeque<Instant>,
}

impl RollingTimer {
    /// Creates a timer allowing `capacity` occurrences per `period`.
    pub fn new(period: Duration, capacity: usize) -> Self {
        Self {
            period,
            capacity,
            occurrences: VecDeque::with_capacity(capacity.min(PREALLOCATED)),
        }
    }

    /// Window of one second.
    pub fn per_second(capacity: usize) -> Self {
        Self::new(Duration::from_secs(1), capacity)
    }

    /// Window of one minute.
    pub fn per_minute(capacity: usize) -> Self {
        Self::new(Duration::from_secs(60), capacity)
    }

    /// Records an occurrence now.
    pub fn add_occurrence(&mut self) {
        self.add_occurrence_at(Instant::now());
    }

    /// Records an occurrence at `at`.
    ///
    /// Instants are kept ordered so pruning can stop at the first live entry.
    pub fn add_occurrence_at(&mut self, at: Instant) {
        let pos = self.occurrences.partition_point(|t| *t <= at);
        self.occurrences.insert(pos, at);
    }

    /// Remaining occurrences allowed in the current window.
    pub fn available_occurrences(&mut self) -> usize {
        self.available_occurrences_at(Instant::now())
    }

    /// Remaining occurrences allowed in the window ending at `now`.
    pub fn available_occurrences_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.capacity.saturating_sub(self.occurrences.len())
    }

    /// Clears all recorded occurrences.
    pub fn reset(&mut self) {
        self.occurrences.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.period) else {
            return;
        };
        while self.occurrences.front().is_some_and(|t| *t < cutoff) {
            self.occurrences.pop_front();
        }
    }
}
