//! Politeness delays between requests
//!
//! This module handles:
//! - Choosing the politeness key of a URL (its host, or one run-wide key)
//! - Drawing a delay uniformly from the configured range
//! - Reserving the next start slot per key so concurrent workers never start
//!   two requests closer together than the delay

use crate::config::{CrawlerConfig, PolitenessScope};
use crate::state::lock;
use crate::url::NormalizedUrl;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Key shared by every request when the scope is global
pub const GLOBAL_KEY: &str = "*";

/// Enforces a minimum gap between request starts sharing a key
///
/// Each call reserves a start slot under a short lock
/// (`start = max(now, last + delay)`, `last := start`) and then sleeps
/// outside the lock until that slot. Callers with different keys never wait
/// on each other.
#[derive(Debug)]
pub struct PolitenessGate {
    scope: PolitenessScope,
    min_delay: Duration,
    max_delay: Duration,
    last_start: Mutex<HashMap<String, Instant>>,
}

impl PolitenessGate {
    /// Creates a gate with a delay range
    ///
    /// # Arguments
    ///
    /// * `scope` - Whether delays apply per host or run-wide
    /// * `min_delay` - Lower bound of the gap between two starts
    /// * `max_delay` - Upper bound; clamped to at least `min_delay`
    pub fn new(scope: PolitenessScope, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            scope,
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_start: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a gate from the crawler configuration
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.politeness_scope, config.min_delay(), config.max_delay())
    }

    /// Returns the politeness key for a URL
    pub fn key_for(&self, url: &NormalizedUrl) -> String {
        match self.scope {
            PolitenessScope::Host => url.host_key(),
            PolitenessScope::Global => GLOBAL_KEY.to_string(),
        }
    }

    /// Draws the delay for one request, uniform in `[min_delay, max_delay]`
    pub fn draw_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    /// Reserves the next start slot for `key`
    ///
    /// # Arguments
    ///
    /// * `key` - The politeness key
    /// * `floor` - A lower bound on the delay, e.g. from robots.txt
    ///
    /// # Returns
    ///
    /// The instant at which the caller may start its request
    pub fn reserve(&self, key: &str, floor: Option<Duration>) -> Instant {
        let delay = match floor {
            Some(floor) => self.draw_delay().max(floor),
            None => self.draw_delay(),
        };

        let now = Instant::now();
        let mut last_start = lock(&self.last_start);
        let start = match last_start.get(key) {
            Some(previous) => (*previous + delay).max(now),
            None => now,
        };
        last_start.insert(key.to_string(), start);
        start
    }

    /// Suspends the caller until it may start a request under `key`
    pub async fn await_turn(&self, key: &str, floor: Option<Duration>) {
        let start = self.reserve(key, floor);
        if start > Instant::now() {
            tracing::trace!(
                "Waiting {:?} for politeness key {}",
                start - Instant::now(),
                key
            );
            tokio::time::sleep_until(start).await;
        }
    }

    /// Number of keys seen so far
    pub fn tracked_keys(&self) -> usize {
        lock(&self.last_start).len()
    }
}
