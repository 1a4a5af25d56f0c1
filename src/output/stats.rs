//! Run statistics
//!
//! This module provides the lock-free counters workers update during a run
//! and the immutable snapshot handed back to the caller.

use crate::state::{lock, RunState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters and timings updated by workers during a run
///
/// Each update is a single atomic operation, so no worker ever suspends in
/// the middle of one.
#[derive(Debug)]
pub struct StatisticsCollector {
    requests_attempted: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    robots_rejected: AtomicU64,
    items_saved: AtomicU64,
    items_dropped: AtomicU64,
    invalid_urls: AtomicU64,
    extraction_errors: AtomicU64,
    sink_errors: AtomicU64,
    depth_limited: AtomicU64,
    total_fetch_micros: AtomicU64,
    clock: Mutex<RunClock>,
}

#[derive(Debug, Clone, Copy)]
struct RunClock {
    started_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Duration>,
}

impl RunClock {
    fn now() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            finished: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(|| self.started.elapsed())
    }
}

impl StatisticsCollector {
    /// Creates a collector; the run clock starts now and may be restarted
    /// with [`StatisticsCollector::start`]
    pub fn new() -> Self {
        Self {
            requests_attempted: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            robots_rejected: AtomicU64::new(0),
            items_saved: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
            invalid_urls: AtomicU64::new(0),
            extraction_errors: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            depth_limited: AtomicU64::new(0),
            total_fetch_micros: AtomicU64::new(0),
            clock: Mutex::new(RunClock::now()),
        }
    }

    /// Restarts the run clock
    pub fn start(&self) {
        *lock(&self.clock) = RunClock::now();
    }

    pub fn increment_requests_attempted(&self) {
        self.requests_attempted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_robots_rejected(&self) {
        self.robots_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_items_saved(&self) {
        self.items_saved.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_items_dropped(&self) {
        self.items_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_invalid_urls(&self) {
        self.invalid_urls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_extraction_errors(&self) {
        self.extraction_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_sink_errors(&self) {
        self.sink_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_depth_limited(&self) {
        self.depth_limited.fetch_add(1, Ordering::SeqCst);
    }

    /// Adds the duration of one fetch to the running total
    pub fn record_fetch_time(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_fetch_micros.fetch_add(micros, Ordering::SeqCst);
    }

    /// Stops the run clock; later snapshots report the same elapsed time
    pub fn finish(&self) {
        let mut clock = lock(&self.clock);
        if clock.finished.is_none() {
            clock.finished = Some(clock.started.elapsed());
        }
    }

    /// Wall time since the run started (or until it finished)
    pub fn elapsed(&self) -> Duration {
        lock(&self.clock).elapsed()
    }

    /// Captures the current counters
    pub fn snapshot(&self, state: RunState) -> RunStatistics {
        let clock = *lock(&self.clock);
        RunStatistics {
            state,
            started_at: clock.started_at,
            elapsed: clock.elapsed(),
            requests_attempted: self.requests_attempted.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            robots_rejected: self.robots_rejected.load(Ordering::SeqCst),
            items_saved: self.items_saved.load(Ordering::SeqCst),
            items_dropped: self.items_dropped.load(Ordering::SeqCst),
            invalid_urls: self.invalid_urls.load(Ordering::SeqCst),
            extraction_errors: self.extraction_errors.load(Ordering::SeqCst),
            sink_errors: self.sink_errors.load(Ordering::SeqCst),
            depth_limited: self.depth_limited.load(Ordering::SeqCst),
            total_fetch_time: Duration::from_micros(self.total_fetch_micros.load(Ordering::SeqCst)),
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of a run's statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Run state when the snapshot was taken
    pub state: RunState,

    pub started_at: DateTime<Utc>,

    /// Total wall time of the run
    pub elapsed: Duration,

    pub requests_attempted: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub robots_rejected: u64,
    pub items_saved: u64,
    pub items_dropped: u64,

    /// Seeds and discovered links that failed normalization
    pub invalid_urls: u64,

    /// Extractor calls that returned an error
    pub extraction_errors: u64,

    /// Items the sink failed to store
    pub sink_errors: u64,

    /// Links not followed because they were too deep
    pub depth_limited: u64,

    /// Sum of the durations of all fetches
    pub total_fetch_time: Duration,
}

impl RunStatistics {
    /// Average duration of a fetch attempt
    pub fn mean_fetch_time(&self) -> Option<Duration> {
        let attempts = u32::try_from(self.requests_attempted).ok()?;
        if attempts == 0 {
            return None;
        }
        Some(self.total_fetch_time / attempts)
    }

    /// Attempted requests per second of wall time
    pub fn requests_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.requests_attempted as f64 / seconds
        } else {
            0.0
        }
    }

    /// Converts the snapshot into a pretty-printed JSON string
    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Renders the snapshot as a markdown report
    pub fn to_markdown(&self) -> String {
        crate::output::summary::format_markdown_summary(self)
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Final state: {}", stats.state);
    println!("  Duration: {:.2?}", stats.elapsed);
    println!("  Speed: {:.2} req/s", stats.requests_per_second());
    if let Some(mean) = stats.mean_fetch_time() {
        println!("  Mean fetch time: {:.2?}", mean);
    }
    println!();

    println!("Requests:");
    println!("  Attempted: {}", stats.requests_attempted);
    println!("  Succeeded: {}", stats.requests_succeeded);
    println!("  Failed: {}", stats.requests_failed);
    println!("  Robots rejected: {}", stats.robots_rejected);
    println!();

    println!("Items:");
    println!("  Saved: {}", stats.items_saved);
    println!("  Dropped: {}", stats.items_dropped);
    println!();

    let problems = [
        ("Invalid URLs", stats.invalid_urls),
        ("Extraction errors", stats.extraction_errors),
        ("Sink errors", stats.sink_errors),
        ("Depth limited", stats.depth_limited),
    ];
    if problems.iter().any(|(_, count)| *count > 0) {
        println!("Skipped / Errors:");
        for (label, count) in problems.iter().filter(|(_, count)| *count > 0) {
            println!("  {}: {}", label, count);
        }
        println!();
    }

    let success_rate = if stats.requests_attempted > 0 {
        (stats.requests_succeeded as f64 / stats.requests_attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} requests succeeded)",
        success_rate, stats.requests_succeeded, stats.requests_attempted
    );
}
