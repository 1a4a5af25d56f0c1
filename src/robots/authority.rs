//! Per-run robots.txt authority
//!
//! Fetches each host's robots.txt on first use, caches the resulting policy
//! for the rest of the run and answers allow/deny questions.

use crate::config::RobotsConfig;
use crate::crawler::SharedFetch;
use crate::robots::{ParsedRobots, RobotsPolicy};
use crate::state::lock;
use crate::url::NormalizedUrl;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

type PolicyCell = Arc<OnceCell<Arc<RobotsPolicy>>>;

/// Decides whether URLs may be fetched according to their host's robots.txt
///
/// Concurrent first queries for the same host share a single fetch.
pub struct RobotsAuthority {
    enabled: bool,
    fail_open: bool,
    fetcher: SharedFetch,
    policies: Mutex<HashMap<String, PolicyCell>>,
}

impl RobotsAuthority {
    /// Creates an authority that fetches robots.txt through `fetcher`
    ///
    /// `fetcher` should be the base fetch capability, not the middleware
    /// chain: robots.txt requests are not crawl targets.
    pub fn new(config: &RobotsConfig, fetcher: SharedFetch) -> Self {
        Self {
            enabled: config.enabled,
            fail_open: config.fail_open,
            fetcher,
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if robots checking is enabled for the run
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks whether `url` may be fetched by `user_agent`
    ///
    /// # Arguments
    ///
    /// * `url` - The candidate URL
    /// * `user_agent` - The crawler's product token (e.g. `"trawl"`)
    ///
    /// # Returns
    ///
    /// * `true` - If robots checking is disabled, the URL is a local file, or
    ///   the host's policy allows it
    /// * `false` - If the host's policy denies it
    pub async fn allowed(&self, url: &NormalizedUrl, user_agent: &str) -> bool {
        match self.policy(url).await {
            Some(policy) => {
                let allowed = policy.is_allowed(url.as_str(), user_agent);
                if !allowed {
                    tracing::debug!("Blocked by robots.txt: {}", url);
                }
                allowed
            }
            None => true,
        }
    }

    /// Minimum delay the host's robots.txt asks for, if any
    ///
    /// Returns `None` when checking is disabled or the policy names no delay.
    pub async fn delay(&self, url: &NormalizedUrl, user_agent: &str) -> Option<Duration> {
        self.policy(url).await?.delay(user_agent)
    }

    /// Number of hosts with a cached policy
    pub fn cached_hosts(&self) -> usize {
        lock(&self.policies)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    /// Returns the cached policy for the URL's host, fetching it on first use
    ///
    /// `None` means the URL is not subject to robots rules.
    pub async fn policy(&self, url: &NormalizedUrl) -> Option<Arc<RobotsPolicy>> {
        if !self.enabled {
            return None;
        }
        let robots_url = url.robots_url()?;
        let host_key = url.host_key();

        let cell: PolicyCell = {
            let mut policies = lock(&self.policies);
            Arc::clone(policies.entry(host_key.clone()).or_default())
        };

        let policy = cell
            .get_or_init(move || async move {
                let policy = self.fetch_policy(&host_key, robots_url).await;
                Arc::new(policy)
            })
            .await;

        Some(Arc::clone(policy))
    }

    /// Fetches and classifies a host's robots.txt
    ///
    /// | Outcome | Policy |
    /// |---------|--------|
    /// | 2xx | Parsed rules |
    /// | 401 / 403 | Deny all |
    /// | Other status | Allow all |
    /// | Transport failure | Fail-open / fail-closed per configuration |
    async fn fetch_policy(&self, host_key: &str, robots_url: url::Url) -> RobotsPolicy {
        let target = match NormalizedUrl::from_url(robots_url) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!("Cannot build robots.txt URL for {}: {}", host_key, e);
                return RobotsPolicy::unavailable(self.fail_open);
            }
        };

        tracing::debug!("Fetching {}", target);

        match self.fetcher.fetch(&target).await {
            Ok(response) if response.is_success() => {
                RobotsPolicy::new(ParsedRobots::from_content(&response.text()))
            }
            Ok(response) if matches!(response.status, 401 | 403) => {
                tracing::info!(
                    "robots.txt for {} returned {}; treating host as disallowed",
                    host_key,
                    response.status
                );
                RobotsPolicy::new(ParsedRobots::deny_all())
            }
            Ok(response) => {
                tracing::debug!(
                    "robots.txt for {} returned {}; allowing all",
                    host_key,
                    response.status
                );
                RobotsPolicy::new(ParsedRobots::allow_all())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch robots.txt for {} ({}); failing {}",
                    host_key,
                    e,
                    if self.fail_open { "open" } else { "closed" }
                );
                RobotsPolicy::unavailable(self.fail_open)
            }
        }
    }
}
