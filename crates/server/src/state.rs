// crates/server/src/state.rs
//! Mutable daemon state: generation counter, activity timing, cache stats,
//! and the consecutive-database-error circuit.
//!
//! All mutation happens from handler tasks or the coordinator, behind one
//! mutex held only for field updates (never across an await).

use std::time::{Duration, Instant};

/// What the caller should do after a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitAction {
    /// First consecutive failure: tell the client to retry.
    Retry,
    /// Second consecutive failure: initiate daemon shutdown.
    Shutdown,
}

#[derive(Debug)]
pub struct DaemonState {
    generation: u64,
    started: Instant,
    last_activity: Instant,
    cache_lookups: u64,
    cache_hits: u64,
    db_error_streak: u32,
    last_rss_check: Option<Instant>,
}

impl DaemonState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            generation: 0,
            started: now,
            last_activity: now,
            cache_lookups: 0,
            cache_hits: 0,
            db_error_streak: 0,
            last_rss_check: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate all derived caches by moving to a new generation.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record request activity for the idle timer.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn record_cache_lookup(&mut self, hit: bool) {
        self.cache_lookups += 1;
        if hit {
            self.cache_hits += 1;
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        if self.cache_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.cache_lookups as f64
        }
    }

    pub fn record_db_error(&mut self) -> CircuitAction {
        self.db_error_streak += 1;
        if self.db_error_streak >= 2 {
            CircuitAction::Shutdown
        } else {
            CircuitAction::Retry
        }
    }

    pub fn record_db_success(&mut self) {
        self.db_error_streak = 0;
    }

    /// Rate-limit RSS sampling to once per `interval`; returns true when a
    /// sample is due and marks it taken.
    pub fn should_check_rss(&mut self, interval: Duration) -> bool {
        let due = self
            .last_rss_check
            .map(|last| last.elapsed() >= interval)
            .unwrap_or(true);
        if due {
            self.last_rss_check = Some(Instant::now());
        }
        due
    }
}

impl Default for DaemonState {
    fn default() -> Self {
        Self::new()
    }
}
