//! Ping/pong liveness accounting.
//!
//! The outbound pump pings every `interval`. At each tick it asks the
//! connection whether the peer was heard from since the previous tick. Once
//! `timeout / interval` consecutive ticks pass in silence (at least one), the
//! peer is considered gone.

use std::time::Duration;

/// Verdict for one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Peer was heard from; the miss counter was reset.
    Alive,
    /// Peer was silent for this many consecutive ticks, below the limit.
    Missed(u32),
    /// Peer exceeded the silence budget.
    Expired,
}

/// Miss counter for one connection.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    max_missed: u32,
    missed: u32,
}

impl Heartbeat {
    /// Build from a ping interval and an idle timeout.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let max_missed = u32::try_from(timeout.as_millis() / interval_ms)
            .unwrap_or(u32::MAX)
            .max(1);
        Self {
            interval,
            max_missed,
            missed: 0,
        }
    }

    /// Ping interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consecutive silent ticks tolerated.
    pub fn max_missed(&self) -> u32 {
        self.max_missed
    }

    /// Record one tick.
    pub fn tick(&mut self, heard_from_peer: bool) -> Beat {
        if heard_from_peer {
            self.missed = 0;
            return Beat::Alive;
        }
        self.missed = self.missed.saturating_add(1);
        if self.missed >= self.max_missed {
            Beat::Expired
        } else {
            Beat::Missed(self.missed)
        }
    }
}
