//! Caller-supplied extraction logic
//!
//! An extractor turns a fetched response into items to store and raw links
//! to follow. Its failures are recorded by the orchestrator and never end
//! the run.

use crate::crawler::{Response, StageKind};
use crate::output::encode_datetime;
use crate::state::VisitationLedger;
use crate::url::NormalizedUrl;
use crate::Item;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// What an extractor knows about the URL it is looking at
#[derive(Debug, Clone)]
pub struct CrawlContext {
    /// The requested URL
    pub url: NormalizedUrl,

    /// Link distance from the seeds
    pub depth: u32,

    /// Which fetch attempt of this URL produced the response (1-based)
    pub attempt: u32,

    /// The run's ledger, readable (and clearable) by extractors
    pub ledger: Arc<VisitationLedger>,
}

/// Output of one extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Records to route through the item pipeline
    pub items: Vec<Item>,

    /// Raw URLs to follow, resolved against the response's final URL
    pub follow: Vec<String>,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item
    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Adds a link to follow
    pub fn follow(mut self, url: impl Into<String>) -> Self {
        self.follow.push(url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.follow.is_empty()
    }
}

/// Turns responses into items and follow links
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name used in logs and stage-kind errors
    fn name(&self) -> &str {
        "extractor"
    }

    /// Whether `extract` suspends
    fn kind(&self) -> StageKind;

    async fn extract(&self, ctx: &CrawlContext, response: &Response) -> anyhow::Result<Extraction>;
}

/// Extractor built from a synchronous function
pub struct FnExtractor<F> {
    f: F,
}

/// Creates a blocking extractor from a plain function
///
/// # Example
///
/// ```
/// use trawl::crawler::{extractor_fn, Extraction};
///
/// let titles = extractor_fn(|_ctx, response| {
///     let mut item = trawl::Item::new();
///     item.insert("title".into(), serde_json::json!(response.title()));
///     Ok(Extraction::new().item(item))
/// });
/// ```
pub fn extractor_fn<F>(f: F) -> FnExtractor<F>
where
    F: Fn(&CrawlContext, &Response) -> anyhow::Result<Extraction> + Send + Sync + 'static,
{
    FnExtractor { f }
}

#[async_trait]
impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&CrawlContext, &Response) -> anyhow::Result<Extraction> + Send + Sync + 'static,
{
    fn kind(&self) -> StageKind {
        StageKind::Blocking
    }

    async fn extract(&self, ctx: &CrawlContext, response: &Response) -> anyhow::Result<Extraction> {
        (self.f)(ctx, response)
    }
}

/// Built-in extractor used by the command-line crawler
///
/// Emits one `{url, title, status, depth, fetched_at}` item per page and
/// follows the page's links, optionally only those on the same host.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    same_host_only: bool,
}

impl LinkExtractor {
    pub fn new(same_host_only: bool) -> Self {
        Self { same_host_only }
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Extractor for LinkExtractor {
    fn name(&self) -> &str {
        "link-extractor"
    }

    fn kind(&self) -> StageKind {
        StageKind::Blocking
    }

    async fn extract(&self, ctx: &CrawlContext, response: &Response) -> anyhow::Result<Extraction> {
        let mut extraction = Extraction::new();

        let item = json!({
            "url": ctx.url.as_str(),
            "title": response.title().map_or(Value::Null, Value::String),
            "status": response.status,
            "depth": ctx.depth,
            "fetched_at": encode_datetime(Utc::now()),
        });
        if let Value::Object(item) = item {
            extraction.items.push(item);
        }

        if !response.is_html() {
            return Ok(extraction);
        }

        let host = response.final_url.host_str();
        for link in response.links() {
            if self.same_host_only {
                let same_host = url::Url::parse(&link)
                    .map(|parsed| parsed.host_str() == host)
                    .unwrap_or(false);
                if !same_host {
                    continue;
                }
            }
            extraction.follow.push(link);
        }

        Ok(extraction)
    }
}
