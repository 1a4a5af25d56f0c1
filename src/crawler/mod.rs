//! Crawler module for fetching and processing pages
//!
//! This module contains the core crawling logic, including:
//! - The fetch capability and its middleware chain
//! - Politeness delays and the bounded frontier
//! - Caller-supplied extraction
//! - Overall crawl coordination

mod coordinator;
mod extract;
mod fetcher;
mod frontier;
mod middleware;
mod politeness;
mod response;
mod stage;

pub use coordinator::{Crawler, CrawlerBuilder};
pub use extract::{extractor_fn, CrawlContext, Extraction, Extractor, FnExtractor, LinkExtractor};
pub use fetcher::{build_http_client, Fetch, HttpFetcher, SharedFetch};
pub use frontier::{Frontier, FrontierEntry};
pub use middleware::{
    middleware_fn, middleware_hooks, FnMiddleware, HookMiddleware, Middleware,
    MiddlewarePipeline, Next,
};
pub use politeness::{PolitenessGate, GLOBAL_KEY};
pub use response::Response;
pub use stage::{ConcurrencyModel, StageKind};

use crate::config::Config;
use crate::output::{open_sink, RunStatistics};
use crate::TrawlError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl with the built-in link extractor
///
/// This is the entry point used by the command-line tool. It will:
/// 1. Open the record sink named in the output configuration
/// 2. Build a crawler with the default HTTP fetcher
/// 3. Crawl same-host links from the seeds until exhaustion or cancellation
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Token that stops the crawl early
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Crawl completed
/// * `Err(TrawlError)` - Crawl could not start
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<RunStatistics, TrawlError> {
    let sink = open_sink(&config.output).await?;

    let crawler = Crawler::builder(config)
        .extractor(LinkExtractor::default())
        .sink(sink)
        .build()?;

    crawler.run_with_cancellation(cancel).await
}
