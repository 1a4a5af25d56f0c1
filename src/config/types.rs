use crate::crawler::ConcurrencyModel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for trawl
///
/// Loaded once at run start and never re-read. Middlewares, item processors
/// and the extractor are code and are registered on the crawler builder.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Seed URLs the crawl starts from
    pub seeds: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub robots: RobotsConfig,

    pub output: OutputConfig,
}

impl Config {
    /// Creates a configuration with default settings for the given seeds
    pub fn with_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub worker_count: usize,

    /// Maximum number of pending entries held by the frontier
    pub frontier_bound: usize,

    /// Lower bound of the delay between two requests sharing a politeness key (milliseconds)
    pub min_request_delay: u64,

    /// Upper bound of that delay (milliseconds); the actual delay is drawn uniformly
    pub max_request_delay: u64,

    /// Whether delays apply per host or across the whole run
    pub politeness_scope: PolitenessScope,

    /// Per-request timeout enforced by the HTTP fetcher (milliseconds)
    pub fetch_timeout: u64,

    /// Links deeper than this are not followed; unlimited when absent
    pub max_depth: Option<u32>,

    /// Which stage kinds the run accepts
    pub concurrency_model: ConcurrencyModel,
}

impl CrawlerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_request_delay)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_request_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            frontier_bound: 1024,
            min_request_delay: 0,
            max_request_delay: 0,
            politeness_scope: PolitenessScope::Host,
            fetch_timeout: 5000,
            max_depth: None,
            concurrency_model: ConcurrencyModel::Async,
        }
    }
}

/// Granularity of the politeness delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolitenessScope {
    /// One delay clock per `host:port`
    #[default]
    Host,

    /// A single delay clock shared by every request of the run
    Global,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the product token matched against robots.txt groups
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_url: Option<String>,
}

impl UserAgentConfig {
    /// Builds the User-Agent header value
    ///
    /// Format: `name/version` or `name/version (+contact-url)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: env!("CARGO_PKG_NAME").to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

/// Robots exclusion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RobotsConfig {
    /// Consult robots.txt before fetching
    pub enabled: bool,

    /// Allow fetching when robots.txt itself cannot be retrieved
    pub fail_open: bool,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_open: true,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path of the record file written by the sink
    pub records_path: String,

    /// Encoding of the record file
    #[serde(default)]
    pub format: RecordFormat,

    /// Path to the markdown summary file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            records_path: "items.mpk".to_string(),
            format: RecordFormat::MessagePack,
            summary_path: None,
        }
    }
}

/// Durable record encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordFormat {
    /// Append-only file of MessagePack maps
    #[default]
    #[serde(rename = "msgpack")]
    MessagePack,

    /// SQLite database with one row per item
    Sqlite,
}
