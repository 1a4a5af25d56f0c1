//! Per-host robots policy cache entry
//!
//! A policy is fetched once per host and kept for the whole run.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt data for a host
///
/// This structure stores parsed robots.txt content along with the timestamp
/// when it was fetched and whether the fetch itself failed.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// The parsed rules
    pub rules: ParsedRobots,

    /// When the robots.txt was fetched (or the fetch was given up)
    pub fetched_at: DateTime<Utc>,

    /// True when robots.txt could not be retrieved and the rules come from
    /// the fail-open/fail-closed setting
    pub fetch_failed: bool,
}

impl RobotsPolicy {
    /// Creates a policy from rules obtained from the host
    ///
    /// # Arguments
    ///
    /// * `rules` - The parsed robots.txt content
    ///
    /// # Returns
    ///
    /// A new RobotsPolicy instance with the current timestamp
    pub fn new(rules: ParsedRobots) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
            fetch_failed: false,
        }
    }

    /// Creates the policy used when robots.txt could not be fetched
    ///
    /// # Arguments
    ///
    /// * `fail_open` - Allow everything when true, deny everything otherwise
    pub fn unavailable(fail_open: bool) -> Self {
        let rules = if fail_open {
            ParsedRobots::allow_all()
        } else {
            ParsedRobots::deny_all()
        };
        Self {
            rules,
            fetched_at: Utc::now(),
            fetch_failed: true,
        }
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.rules.is_allowed(url, user_agent)
    }

    /// Minimum delay between requests demanded by the host, if any
    pub fn delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.rules.delay(user_agent)
    }
}
