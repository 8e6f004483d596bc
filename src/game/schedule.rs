//! Per-category update frequencies for the broadcaster.
//!
//! Four priority tiers share the broadcast wall clock: critical events
//! go out immediately, standard and low tiers gate periodic snapshots,
//! and static data is re-announced about once a second.

use std::time::{Duration, Instant};

/// Broadcast priority tiers with their nominal frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePriority {
    /// 60 per second: damage feedback, deaths
    Critical,
    /// 30 per second: reserved for high-rate channels
    Standard,
    /// 10 per second: delta snapshots, per-player state
    Low,
    /// 1 per second: config re-announcements
    Static,
}

impl UpdatePriority {
    pub fn interval(&self) -> Duration {
        match self {
            UpdatePriority::Critical => Duration::from_millis(1000 / 60),
            UpdatePriority::Standard => Duration::from_millis(1000 / 30),
            UpdatePriority::Low => Duration::from_millis(100),
            UpdatePriority::Static => Duration::from_millis(1000),
        }
    }
}

/// Tracks the last emission per tier against the wall clock.
#[derive(Debug)]
pub struct UpdateScheduler {
    last_emit: [Option<Instant>; 4],
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            last_emit: [None; 4],
        }
    }

    fn slot(priority: UpdatePriority) -> usize {
        match priority {
            UpdatePriority::Critical => 0,
            UpdatePriority::Standard => 1,
            UpdatePriority::Low => 2,
            UpdatePriority::Static => 3,
        }
    }

    /// True when the tier's interval has elapsed; marks the emission.
    pub fn due(&mut self, priority: UpdatePriority, now: Instant) -> bool {
        let slot = Self::slot(priority);
        let ready = self.last_emit[slot]
            .map_or(true, |last| now.duration_since(last) >= priority.interval());
        if ready {
            self.last_emit[slot] = Some(now);
        }
        ready
    }

    /// Peek without consuming the slot.
    pub fn is_due(&self, priority: UpdatePriority, now: Instant) -> bool {
        let slot = Self::slot(priority);
        self.last_emit[slot]
            .map_or(true, |last| now.duration_since(last) >= priority.interval())
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
