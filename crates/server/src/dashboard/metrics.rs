//! Lock-free performance counters.
//!
//! Simulation loops and handlers update these via atomic operations: no
//! locks, no allocations, no blocking on the tick path. The dashboard server
//! reads them at its own pace.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Monotonic counters
    matches_created: AtomicU64,
    matches_finished: AtomicU64,
    matches_discarded: AtomicU64,
    ticks_total: AtomicU64,
    tick_ns_sum: AtomicU64,
    broadcasts: AtomicU64,
    store_writes: AtomicU64,
    store_write_failures: AtomicU64,
    tournaments_started: AtomicU64,
    tournaments_completed: AtomicU64,

    // Tick duration histogram
    hist_under_1us: AtomicU64,
    hist_1_10us: AtomicU64,
    hist_10_100us: AtomicU64,
    hist_100us_1ms: AtomicU64,
    hist_over_1ms: AtomicU64,

    // Gauges
    connections: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            matches_created: AtomicU64::new(0),
            matches_finished: AtomicU64::new(0),
            matches_discarded: AtomicU64::new(0),
            ticks_total: AtomicU64::new(0),
            tick_ns_sum: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            store_writes: AtomicU64::new(0),
            store_write_failures: AtomicU64::new(0),
            tournaments_started: AtomicU64::new(0),
            tournaments_completed: AtomicU64::new(0),
            hist_under_1us: AtomicU64::new(0),
            hist_1_10us: AtomicU64::new(0),
            hist_10_100us: AtomicU64::new(0),
            hist_100us_1ms: AtomicU64::new(0),
            hist_over_1ms: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Called once per simulation tick, lock held time included.
    pub fn record_tick(&self, duration: Duration) {
        self.ticks_total.fetch_add(1, Relaxed);
        self.tick_ns_sum.fetch_add(duration.as_nanos() as u64, Relaxed);

        let bucket = match duration.as_micros() as u64 {
            0 => &self.hist_under_1us,
            1..=9 => &self.hist_1_10us,
            10..=99 => &self.hist_10_100us,
            100..=999 => &self.hist_100us_1ms,
            _ => &self.hist_over_1ms,
        };
        bucket.fetch_add(1, Relaxed);
    }

    pub fn match_created(&self) {
        self.matches_created.fetch_add(1, Relaxed);
    }

    pub fn match_finished(&self) {
        self.matches_finished.fetch_add(1, Relaxed);
    }

    pub fn match_discarded(&self) {
        self.matches_discarded.fetch_add(1, Relaxed);
    }

    pub fn broadcast(&self) {
        self.broadcasts.fetch_add(1, Relaxed);
    }

    pub fn store_write_ok(&self) {
        self.store_writes.fetch_add(1, Relaxed);
    }

    pub fn store_write_failed(&self) {
        self.store_write_failures.fetch_add(1, Relaxed);
    }

    pub fn tournament_started(&self) {
        self.tournaments_started.fetch_add(1, Relaxed);
    }

    pub fn tournament_completed(&self) {
        self.tournaments_completed.fetch_add(1, Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Relaxed);
    }

    /// Read all counters into a serializable snapshot.
    pub fn snapshot(&self, live_matches: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            live_matches,
            matches_created: self.matches_created.load(Relaxed),
            matches_finished: self.matches_finished.load(Relaxed),
            matches_discarded: self.matches_discarded.load(Relaxed),
            ticks_total: self.ticks_total.load(Relaxed),
            tick_ns_sum: self.tick_ns_sum.load(Relaxed),
            broadcasts: self.broadcasts.load(Relaxed),
            store_writes: self.store_writes.load(Relaxed),
            store_write_failures: self.store_write_failures.load(Relaxed),
            tournaments_started: self.tournaments_started.load(Relaxed),
            tournaments_completed: self.tournaments_completed.load(Relaxed),
            connections: self.connections.load(Relaxed),
            hist: [
                self.hist_under_1us.load(Relaxed),
                self.hist_1_10us.load(Relaxed),
                self.hist_10_100us.load(Relaxed),
                self.hist_100us_1ms.load(Relaxed),
                self.hist_over_1ms.load(Relaxed),
            ],
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of all metrics at a point in time.
/// Clients compute rates (ticks/sec, etc.) by diffing consecutive snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub live_matches: u64,
    pub matches_created: u64,
    pub matches_finished: u64,
    pub matches_discarded: u64,
    pub ticks_total: u64,
    pub tick_ns_sum: u64,
    pub broadcasts: u64,
    pub store_writes: u64,
    pub store_write_failures: u64,
    pub tournaments_started: u64,
    pub tournaments_completed: u64,
    pub connections: u64,
    /// `[<1μs, 1-10μs, 10-100μs, 100μs-1ms, >1ms]`
    pub hist: [u64; 5],
}
