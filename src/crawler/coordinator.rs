//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the run state machine that ties the components
//! together:
//! - Validating seeds and seeding the frontier (INIT)
//! - Driving a bounded pool of workers over the frontier (RUNNING / DRAINING)
//! - Checking robots, waiting for politeness, fetching and extracting
//! - Routing items through the item pipeline to the sink
//! - Deduplicating and enqueueing discovered links
//! - Stopping on exhaustion or cancellation (FINISHED)

use crate::config::{validate, Config};
use crate::crawler::{
    ConcurrencyModel, CrawlContext, Extractor, Fetch, Frontier, FrontierEntry, HttpFetcher,
    LinkExtractor, Middleware, MiddlewarePipeline, PolitenessGate, Response, SharedFetch,
};
use crate::output::{
    ItemPipeline, ItemProcessor, MemorySink, RecordSink, RunStatistics, StatisticsCollector,
};
use crate::robots::RobotsAuthority;
use crate::state::{RunState, RunStateMachine, VisitationLedger};
use crate::url::NormalizedUrl;
use crate::{ConfigError, Item, TrawlError};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Log progress every this many requests
const PROGRESS_INTERVAL: u64 = 10;

/// Builder for a [`Crawler`]
///
/// Middlewares and item processors run in the order they are added.
pub struct CrawlerBuilder {
    config: Config,
    fetcher: Option<SharedFetch>,
    middlewares: MiddlewarePipeline,
    processors: ItemPipeline,
    sink: Option<Arc<dyn RecordSink>>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl CrawlerBuilder {
    /// Starts a builder for the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
            middlewares: MiddlewarePipeline::new(),
            processors: ItemPipeline::new(),
            sink: None,
            extractor: None,
        }
    }

    /// Replaces the base fetch capability (default: [`HttpFetcher`])
    ///
    /// robots.txt is fetched through this capability directly, outside the
    /// middleware chain.
    pub fn fetcher(mut self, fetcher: SharedFetch) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Adds a middleware around everything added after it
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Adds an item processor after the ones already added
    pub fn processor<P: ItemProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Sets the record sink (default: an in-memory [`MemorySink`])
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the extraction logic (default: same-host [`LinkExtractor`])
    pub fn extractor<E: Extractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Validates the configuration and stage kinds and builds the crawler
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to run
    /// * `Err(TrawlError::Config)` - The configuration is invalid
    /// * `Err(TrawlError::IncompatibleStageKind)` - A stage suspends but the
    ///   run uses the cooperative model
    /// * `Err(TrawlError::Fetch)` - The default HTTP client could not be built
    pub fn build(self) -> crate::Result<Crawler> {
        validate(&self.config)?;

        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(LinkExtractor::default()));

        let model = self.config.crawler.concurrency_model;
        for middleware in self.middlewares.stages() {
            model.check(middleware.name(), middleware.kind())?;
        }
        for processor in self.processors.stages() {
            model.check(processor.name(), processor.kind())?;
        }
        model.check(extractor.name(), extractor.kind())?;

        let base_fetch: SharedFetch = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::from_config(&self.config)?),
        };
        let fetch = self.middlewares.build(Arc::clone(&base_fetch));

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(MemorySink::new()) as Arc<dyn RecordSink>);

        let crawler = &self.config.crawler;
        let run = RunContext {
            frontier: Frontier::new(crawler.frontier_bound, crawler.worker_count),
            politeness: PolitenessGate::from_config(crawler),
            robots: RobotsAuthority::new(&self.config.robots, base_fetch),
            ledger: Arc::new(VisitationLedger::new()),
            stats: StatisticsCollector::new(),
            state: RunStateMachine::new(),
            fetch,
            processors: self.processors,
            sink,
            extractor,
            config: self.config,
        };

        Ok(Crawler { run: Arc::new(run) })
    }
}

/// A single crawl run
///
/// Every per-run structure (ledger, frontier, politeness state, robots cache,
/// statistics) belongs to one `Crawler`; running it a second time fails with
/// [`TrawlError::InvalidTransition`].
pub struct Crawler {
    run: Arc<RunContext>,
}

impl Crawler {
    /// Starts building a crawler for `config`
    pub fn builder(config: Config) -> CrawlerBuilder {
        CrawlerBuilder::new(config)
    }

    /// Runs the crawl until the frontier is exhausted
    pub async fn run(&self) -> crate::Result<RunStatistics> {
        self.run_with_cancellation(CancellationToken::new()).await
    }

    /// Runs the crawl until the frontier is exhausted or `cancel` fires
    ///
    /// On cancellation no new fetch starts; fetches already under way finish
    /// and deliver their items, but their links are not followed.
    ///
    /// # Returns
    ///
    /// * `Ok(RunStatistics)` - Final statistics; per-URL failures never error
    /// * `Err(TrawlError)` - No valid seed, or the crawler already ran
    pub async fn run_with_cancellation(
        &self,
        cancel: CancellationToken,
    ) -> crate::Result<RunStatistics> {
        let run = &self.run;

        let current = run.state.current();
        if current != RunState::Init {
            return Err(TrawlError::InvalidTransition {
                from: current,
                to: RunState::Running,
            });
        }

        run.stats.start();
        run.seed()?;
        run.state.transition(RunState::Running)?;

        let model = run.config.crawler.concurrency_model;
        let worker_count = run.config.crawler.worker_count;
        tracing::info!(
            "Starting crawl: {} seeds queued, {} workers, {} model, frontier bound {}, robots.txt {}",
            run.frontier.len(),
            worker_count,
            model,
            run.frontier.bound(),
            if run.robots.is_enabled() { "respected" } else { "ignored" }
        );

        // Closing the frontier releases workers parked in next() or enqueue()
        let closer = {
            let run = Arc::clone(run);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                tracing::info!("Cancellation requested, draining in-flight work");
                run.frontier.close();
            })
        };

        match model {
            ConcurrencyModel::Async => {
                let mut workers = JoinSet::new();
                for id in 0..worker_count {
                    workers.spawn(Arc::clone(run).worker(id, cancel.clone()));
                }
                while let Some(joined) = workers.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!("Worker task failed: {}", e);
                    }
                }
            }
            ConcurrencyModel::Cooperative => {
                let workers = (0..worker_count).map(|id| Arc::clone(run).worker(id, cancel.clone()));
                futures::future::join_all(workers).await;
            }
        }

        closer.abort();
        run.frontier.close();

        if let Err(e) = run.sink.flush().await {
            tracing::error!("Failed to flush record sink: {}", e);
            run.stats.increment_sink_errors();
        }

        run.state.transition(RunState::Finished)?;
        run.stats.finish();

        let stats = run.stats.snapshot(RunState::Finished);
        tracing::info!(
            "Crawl finished: {} requests ({} ok, {} failed, {} robots-rejected), {} items saved in {:.2?}",
            stats.requests_attempted,
            stats.requests_succeeded,
            stats.requests_failed,
            stats.robots_rejected,
            stats.items_saved,
            stats.elapsed
        );

        Ok(stats)
    }

    /// The run's visitation ledger
    ///
    /// Callers may clear its sets mid-run to bound memory. A cleared set
    /// loses its deduplication memory: a URL removed from `followed` can be
    /// enqueued again.
    pub fn ledger(&self) -> Arc<VisitationLedger> {
        Arc::clone(&self.run.ledger)
    }

    /// Snapshot of the run's statistics so far
    pub fn statistics(&self) -> RunStatistics {
        self.run.stats.snapshot(self.run.state.current())
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.run.state.current()
    }

    pub fn config(&self) -> &Config {
        &self.run.config
    }
}

/// Everything a worker shares with the other workers of the run
struct RunContext {
    config: Config,
    frontier: Frontier,
    politeness: PolitenessGate,
    robots: RobotsAuthority,
    ledger: Arc<VisitationLedger>,
    stats: StatisticsCollector,
    state: RunStateMachine,
    fetch: SharedFetch,
    processors: ItemPipeline,
    sink: Arc<dyn RecordSink>,
    extractor: Arc<dyn Extractor>,
}

/// Completes the frontier slot of a dequeued entry when dropped, including
/// when a worker unwinds
struct InFlight<'a> {
    frontier: &'a Frontier,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.frontier.complete();
    }
}

impl RunContext {
    /// INIT: normalizes seeds, marks them followed and queues them
    fn seed(&self) -> Result<(), TrawlError> {
        let mut rejected = 0;
        for raw in &self.config.seeds {
            match NormalizedUrl::normalize(raw) {
                Ok(url) => {
                    if self.ledger.try_mark_followed(&url) {
                        self.frontier.push_seed(url);
                    } else {
                        tracing::debug!("Duplicate seed ignored: {}", raw);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping invalid seed: {}", e);
                    self.stats.increment_invalid_urls();
                    rejected += 1;
                }
            }
        }

        if self.frontier.is_empty() {
            tracing::error!("No valid seed URL ({} rejected)", rejected);
            self.state.transition(RunState::Failed)?;
            self.stats.finish();
            return Err(ConfigError::NoValidSeeds(rejected).into());
        }
        Ok(())
    }

    async fn worker(self: Arc<Self>, id: usize, cancel: CancellationToken) {
        tracing::trace!("Worker {} started", id);

        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                entry = self.frontier.next() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let slot = InFlight {
                frontier: &self.frontier,
            };
            self.state.sync_activity(self.frontier.is_empty());

            self.process(entry, &cancel).await;

            drop(slot);
            self.state.sync_activity(self.frontier.is_empty());
        }

        tracing::trace!("Worker {} stopped", id);
    }

    /// Handles one dequeued URL from robots check to link enqueueing
    async fn process(&self, entry: FrontierEntry, cancel: &CancellationToken) {
        let url = entry.url;

        // Only possible after a caller cleared `followed`
        if let Some(outcome) = self.ledger.outcome(&url) {
            tracing::debug!("Skipping {}: already {:?}", url, outcome);
            return;
        }

        let agent = self.config.user_agent.crawler_name.as_str();
        if !self.robots.allowed(&url, agent).await {
            tracing::info!("URL {} disallowed by robots.txt", url);
            self.ledger.mark_robot_excluded(&url);
            self.stats.increment_robots_rejected();
            return;
        }

        let floor = self.robots.delay(&url, agent).await;
        let key = self.politeness.key_for(&url);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled before fetching {}", url);
                return;
            }
            _ = self.politeness.await_turn(&key, floor) => {}
        }

        let attempt = self.ledger.record_attempt(&url);
        self.stats.increment_requests_attempted();

        let started = Instant::now();
        let result = self.fetch.fetch(&url).await;
        self.stats.record_fetch_time(started.elapsed());
        self.log_progress();

        let response = match result {
            Ok(response) if response.status < 400 => response,
            Ok(response) => {
                tracing::warn!("HTTP {} for {}", response.status, url);
                self.ledger.mark_unreachable(&url);
                self.stats.increment_requests_failed();
                return;
            }
            Err(e) => {
                tracing::warn!("Fetch failed: {}", e);
                self.ledger.mark_unreachable(&url);
                self.stats.increment_requests_failed();
                return;
            }
        };

        self.ledger.mark_reachable(&url);
        self.stats.increment_requests_succeeded();
        tracing::debug!(
            "Fetched {} ({}, {} bytes, {:.2?})",
            url,
            response.status,
            response.body.len(),
            response.elapsed
        );

        let ctx = CrawlContext {
            url,
            depth: entry.depth,
            attempt,
            ledger: Arc::clone(&self.ledger),
        };
        let extraction = match self.extractor.extract(&ctx, &response).await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!(
                    "Extractor '{}' failed on {}: {:#}",
                    self.extractor.name(),
                    ctx.url,
                    e
                );
                self.stats.increment_extraction_errors();
                return;
            }
        };

        for item in extraction.items {
            self.store(item).await;
        }

        if cancel.is_cancelled() {
            if !extraction.follow.is_empty() {
                tracing::debug!(
                    "Discarding {} links from {} after cancellation",
                    extraction.follow.len(),
                    ctx.url
                );
            }
            return;
        }

        self.follow(&response, ctx.depth, extraction.follow).await;
    }

    /// Routes one item through the pipeline and into the sink
    async fn store(&self, item: Item) {
        let Some(item) = self.processors.process(item).await else {
            self.stats.increment_items_dropped();
            return;
        };

        match self.sink.save(&item).await {
            Ok(()) => self.stats.increment_items_saved(),
            Err(e) => {
                tracing::error!("Failed to save item: {}", e);
                self.stats.increment_sink_errors();
            }
        }
    }

    /// Resolves, filters, deduplicates and enqueues discovered links
    ///
    /// Links resolve against the response's final URL, so relative links on
    /// a redirected page point where the browser would send them.
    async fn follow(&self, response: &Response, depth: u32, links: Vec<String>) {
        let next_depth = depth.saturating_add(1);
        let mut queued = 0;

        for raw in links {
            // Links marked followed now could never be enqueued
            if self.frontier.is_closed() {
                break;
            }

            let target = match NormalizedUrl::resolve_against(&response.final_url, &raw) {
                Ok(target) => target,
                Err(e) => {
                    tracing::debug!("Ignoring link on {}: {}", response.url, e);
                    self.stats.increment_invalid_urls();
                    continue;
                }
            };

            if let Some(max_depth) = self.config.crawler.max_depth {
                if next_depth > max_depth {
                    tracing::trace!("Depth limit reached for {}", target);
                    self.stats.increment_depth_limited();
                    continue;
                }
            }

            if !self.ledger.try_mark_followed(&target) {
                continue;
            }

            if !self.frontier.enqueue(target, next_depth).await {
                // Closed by cancellation
                break;
            }
            queued += 1;
        }

        if queued > 0 {
            tracing::debug!("Queued {} new links from {}", queued, response.url);
        }
    }

    fn log_progress(&self) {
        let requests = self.ledger.request_count();
        if requests % PROGRESS_INTERVAL == 0 {
            let elapsed = self.stats.elapsed();
            let rate = requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} requests, {} in frontier, {} in flight, {:.2} req/sec",
                requests,
                self.frontier.len(),
                self.frontier.in_flight(),
                rate
            );
        }
    }
}
