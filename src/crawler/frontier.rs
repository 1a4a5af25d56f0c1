//! Bounded FIFO frontier of URLs waiting to be fetched
//!
//! The frontier also tracks how many workers hold in-flight work, which is
//! what lets it tell "empty for now" apart from "exhausted".

use crate::state::lock;
use crate::url::NormalizedUrl;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// The URL to fetch
    pub url: NormalizedUrl,

    /// Monotonic discovery order index
    pub discovered_at: u64,

    /// Link distance from the seeds (seeds are 0)
    pub depth: u32,
}

#[derive(Debug, Default)]
struct FrontierInner {
    queue: VecDeque<FrontierEntry>,
    next_index: u64,
    in_flight: usize,
    waiting_producers: usize,
    closed: bool,
}

impl FrontierInner {
    fn push(&mut self, url: NormalizedUrl, depth: u32) -> u64 {
        let discovered_at = self.next_index;
        self.next_index += 1;
        self.queue.push_back(FrontierEntry {
            url,
            discovered_at,
            depth,
        });
        discovered_at
    }

    fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(entry)
    }
}

/// Bounded FIFO work queue shared by the workers of a run
///
/// Every entry handed out by [`Frontier::next`] or [`Frontier::try_dequeue`]
/// counts as in-flight until the worker calls [`Frontier::complete`].
/// Discovered links must be enqueued before completing, otherwise the
/// frontier may report exhaustion early.
#[derive(Debug)]
pub struct Frontier {
    bound: usize,
    worker_count: usize,
    inner: Mutex<FrontierInner>,
    changed: Notify,
}

impl Frontier {
    /// Creates a frontier
    ///
    /// # Arguments
    ///
    /// * `bound` - Maximum number of queued entries before `enqueue` waits
    /// * `worker_count` - Number of workers that may enqueue concurrently
    pub fn new(bound: usize, worker_count: usize) -> Self {
        Self {
            bound: bound.max(1),
            worker_count: worker_count.max(1),
            inner: Mutex::new(FrontierInner::default()),
            changed: Notify::new(),
        }
    }

    /// Adds a seed without regard to the bound
    pub fn push_seed(&self, url: NormalizedUrl) -> u64 {
        let index = lock(&self.inner).push(url, 0);
        self.changed.notify_waiters();
        index
    }

    /// Adds a discovered URL, waiting while the frontier is full
    ///
    /// If every worker is waiting here at once nobody is left to dequeue, so
    /// the last one in is admitted over the bound.
    ///
    /// # Returns
    ///
    /// * `true` - The entry was queued
    /// * `false` - The frontier was closed and the entry discarded
    pub async fn enqueue(&self, url: NormalizedUrl, depth: u32) -> bool {
        let mut waiting = false;

        let admitted = loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = lock(&self.inner);
                if inner.closed {
                    if waiting {
                        inner.waiting_producers -= 1;
                    }
                    break false;
                }

                let full = inner.queue.len() >= self.bound;
                let others_waiting = inner.waiting_producers - usize::from(waiting);
                if !full || others_waiting + 1 >= self.worker_count {
                    if full {
                        tracing::warn!(
                            "Frontier over its bound of {} to keep {} blocked workers moving",
                            self.bound,
                            self.worker_count
                        );
                    }
                    if waiting {
                        inner.waiting_producers -= 1;
                    }
                    inner.push(url.clone(), depth);
                    break true;
                }

                if !waiting {
                    inner.waiting_producers += 1;
                    waiting = true;
                }
            }

            notified.await;
        };

        self.changed.notify_waiters();
        admitted
    }

    /// Takes the next entry without waiting
    ///
    /// Returns `None` when nothing is queued right now. A returned entry is
    /// in-flight until [`Frontier::complete`] is called.
    pub fn try_dequeue(&self) -> Option<FrontierEntry> {
        let entry = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return None;
            }
            inner.pop()
        };
        if entry.is_some() {
            self.changed.notify_waiters();
        }
        entry
    }

    /// Waits for the next entry
    ///
    /// Returns `None` once the frontier is exhausted (nothing queued and
    /// nothing in flight) or closed.
    pub async fn next(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = lock(&self.inner);
                if inner.closed {
                    return None;
                }
                if let Some(entry) = inner.pop() {
                    drop(inner);
                    self.changed.notify_waiters();
                    return Some(entry);
                }
                if inner.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Releases the in-flight slot of a dequeued entry
    pub fn complete(&self) {
        {
            let mut inner = lock(&self.inner);
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Stops handing out entries and discards what is queued
    ///
    /// Waiting producers and consumers return immediately.
    pub fn close(&self) {
        let discarded = {
            let mut inner = lock(&self.inner);
            inner.closed = true;
            let discarded = inner.queue.len();
            inner.queue.clear();
            discarded
        };
        if discarded > 0 {
            tracing::debug!("Frontier closed, {} queued entries discarded", discarded);
        }
        self.changed.notify_waiters();
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).queue.is_empty()
    }

    /// Number of entries handed out and not yet completed
    pub fn in_flight(&self) -> usize {
        lock(&self.inner).in_flight
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn bound(&self) -> usize {
        self.bound
    }
}
