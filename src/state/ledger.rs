use super::lock;
use crate::url::NormalizedUrl;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Terminal result recorded for a URL the run has dealt with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Fetched successfully
    Reachable,

    /// Fetch failed (transport error, timeout or error status)
    Unreachable,

    /// Denied by the host's robots policy; never fetched
    RobotExcluded,
}

#[derive(Debug, Default)]
struct LedgerInner {
    followed: HashSet<NormalizedUrl>,
    outcomes: HashMap<NormalizedUrl, Outcome>,
    attempts: HashMap<NormalizedUrl, u32>,
    request_count: u64,
}

/// Per-run bookkeeping of which URLs have been followed and what happened to
/// them
///
/// Every operation takes the internal lock once and never suspends while
/// holding it, so each check-then-act sequence is atomic with respect to
/// other workers.
///
/// The `clear_*` methods let long-running callers bound memory. Clearing
/// `followed` drops its deduplication memory: a URL discovered again after
/// the clear can be enqueued a second time. The orchestrator skips such
/// entries when the URL already has an outcome, so clearing both `followed`
/// and the outcome sets is what it takes for a URL to be fetched twice.
#[derive(Debug, Default)]
pub struct VisitationLedger {
    inner: Mutex<LedgerInner>,
}

impl VisitationLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `url` as followed if it was not already
    ///
    /// # Returns
    ///
    /// `true` exactly once per URL (until `clear_followed` is called).
    /// Every enqueue path consults this before pushing to the frontier.
    pub fn try_mark_followed(&self, url: &NormalizedUrl) -> bool {
        lock(&self.inner).followed.insert(url.clone())
    }

    /// Returns true if `url` has been followed
    pub fn is_followed(&self, url: &NormalizedUrl) -> bool {
        lock(&self.inner).followed.contains(url)
    }

    /// Records a successful fetch
    pub fn mark_reachable(&self, url: &NormalizedUrl) -> bool {
        self.record_outcome(url, Outcome::Reachable)
    }

    /// Records a failed fetch
    pub fn mark_unreachable(&self, url: &NormalizedUrl) -> bool {
        self.record_outcome(url, Outcome::Unreachable)
    }

    /// Records a robots exclusion
    pub fn mark_robot_excluded(&self, url: &NormalizedUrl) -> bool {
        self.record_outcome(url, Outcome::RobotExcluded)
    }

    /// Stores the first outcome recorded for a URL; later calls are no-ops
    ///
    /// # Returns
    ///
    /// `true` if this call recorded the outcome
    fn record_outcome(&self, url: &NormalizedUrl, outcome: Outcome) -> bool {
        let mut inner = lock(&self.inner);
        match inner.outcomes.get(url) {
            Some(existing) => {
                if *existing != outcome {
                    tracing::warn!(
                        "Ignoring {:?} for {}: already recorded as {:?}",
                        outcome,
                        url,
                        existing
                    );
                }
                false
            }
            None => {
                inner.outcomes.insert(url.clone(), outcome);
                true
            }
        }
    }

    /// Returns the outcome recorded for `url`, if any
    pub fn outcome(&self, url: &NormalizedUrl) -> Option<Outcome> {
        lock(&self.inner).outcomes.get(url).copied()
    }

    /// Counts one fetch attempt for `url` and returns its attempt number
    pub fn record_attempt(&self, url: &NormalizedUrl) -> u32 {
        let mut inner = lock(&self.inner);
        inner.request_count += 1;
        let attempts = inner.attempts.entry(url.clone()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    /// Number of fetch attempts made for `url`
    pub fn attempts(&self, url: &NormalizedUrl) -> u32 {
        lock(&self.inner).attempts.get(url).copied().unwrap_or(0)
    }

    /// Total number of fetch attempts across the run
    pub fn request_count(&self) -> u64 {
        lock(&self.inner).request_count
    }

    /// Snapshot of the followed set
    pub fn followed(&self) -> HashSet<NormalizedUrl> {
        lock(&self.inner).followed.clone()
    }

    /// Snapshot of the URLs fetched successfully
    pub fn reachable(&self) -> HashSet<NormalizedUrl> {
        self.with_outcome(Outcome::Reachable)
    }

    /// Snapshot of the URLs whose fetch failed
    pub fn unreachable(&self) -> HashSet<NormalizedUrl> {
        self.with_outcome(Outcome::Unreachable)
    }

    /// Snapshot of the URLs denied by robots policy
    pub fn robot_excluded(&self) -> HashSet<NormalizedUrl> {
        self.with_outcome(Outcome::RobotExcluded)
    }

    fn with_outcome(&self, wanted: Outcome) -> HashSet<NormalizedUrl> {
        lock(&self.inner)
            .outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == wanted)
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Forgets every followed URL
    pub fn clear_followed(&self) {
        lock(&self.inner).followed.clear();
    }

    /// Forgets every reachable URL
    pub fn clear_reachable(&self) {
        self.clear_outcome(Outcome::Reachable);
    }

    /// Forgets every unreachable URL
    pub fn clear_unreachable(&self) {
        self.clear_outcome(Outcome::Unreachable);
    }

    /// Forgets every robots-excluded URL
    pub fn clear_robot_excluded(&self) {
        self.clear_outcome(Outcome::RobotExcluded);
    }

    /// Forgets per-URL attempt counts; the total request count is kept
    pub fn clear_attempts(&self) {
        lock(&self.inner).attempts.clear();
    }

    fn clear_outcome(&self, cleared: Outcome) {
        lock(&self.inner)
            .outcomes
            .retain(|_, outcome| *outcome != cleared);
    }
}
