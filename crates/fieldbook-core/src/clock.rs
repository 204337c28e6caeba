//! Store-owned logical clock for record timestamps.
//!
//! Every `created_at`/`updated_at` the store writes comes from a [`StoreClock`],
//! which never issues the same value twice and never goes backward, even when
//! the wall clock does. Timestamps received from the server are fed back through
//! [`StoreClock::observe`] so later local edits always sort after them.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// How far past local wall time an observed timestamp may pull the clock (one day).
pub const MAX_OBSERVED_SKEW_MS: i64 = 24 * 60 * 60 * 1_000;

/// Source of wall-clock time in Unix milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven time, for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualTime {
    now: AtomicI64,
}

impl ManualTime {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_ms),
        })
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Monotonic timestamp issuer owned by a store.
pub struct StoreClock {
    source: Arc<dyn TimeSource>,
    last_issued: AtomicI64,
}

impl StoreClock {
    pub fn new(source: Arc<dyn TimeSource>, floor: i64) -> Self {
        Self {
            source,
            last_issued: AtomicI64::new(floor),
        }
    }

    /// Issue the next timestamp: wall time, or one past the last issued value.
    pub fn next(&self) -> i64 {
        let now = self.source.now_ms();
        let previous = self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }

    /// Advance past a timestamp seen elsewhere (a pulled record).
    ///
    /// Values more than [`MAX_OBSERVED_SKEW_MS`] ahead of wall time are capped
    /// there, so one bogus remote value cannot pin the clock. Returns `false`
    /// when the timestamp was capped.
    pub fn observe(&self, timestamp: i64) -> bool {
        let ceiling = self.source.now_ms().saturating_add(MAX_OBSERVED_SKEW_MS);
        self.last_issued.fetch_max(timestamp.min(ceiling), Ordering::SeqCst);
        timestamp <= ceiling
    }

    pub fn last_issued(&self) -> i64 {
        self.last_issued.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StoreClock {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StoreClock")
            .field("last_issued", &self.last_issued())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_follows_wall_time_when_it_advances() {
        let time = ManualTime::new(100);
        let clock = StoreClock::new(time.clone(), 0);
        assert_eq!(clock.next(), 100);
        time.set(250);
        assert_eq!(clock.next(), 250);
    }

    #[test]
    fn next_is_strictly_monotonic_when_wall_time_stalls_or_rewinds() {
        let time = ManualTime::new(100);
        let clock = StoreClock::new(time.clone(), 0);
        assert_eq!(clock.next(), 100);
        assert_eq!(clock.next(), 101);
        time.set(50);
        assert_eq!(clock.next(), 102);
    }

    #[test]
    fn observe_pushes_future_timestamps_past_remote_values() {
        let time = ManualTime::new(100);
        let clock = StoreClock::new(time, 0);
        assert!(clock.observe(300));
        assert_eq!(clock.next(), 301);
        assert!(clock.observe(200));
        assert_eq!(clock.next(), 302);
    }

    #[test]
    fn observe_caps_timestamps_far_ahead_of_wall_time() {
        let time = ManualTime::new(1_000);
        let clock = StoreClock::new(time.clone(), 0);
        assert!(!clock.observe(i64::MAX));

        let ceiling = 1_000 + MAX_OBSERVED_SKEW_MS;
        assert_eq!(clock.next(), ceiling + 1);
        assert_eq!(clock.next(), ceiling + 2);

        time.advance(2 * MAX_OBSERVED_SKEW_MS);
        assert_eq!(clock.next(), 1_000 + 2 * MAX_OBSERVED_SKEW_MS);
    }
}
