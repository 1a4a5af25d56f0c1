//! Trawl: a polite, concurrent crawl engine
//!
//! This crate implements the core of a web crawler: a deduplicating frontier,
//! per-run or per-host politeness delays, robots.txt exclusion, a fetch
//! middleware chain, an item-processing pipeline and durable record sinks.
//! Extraction logic is supplied by the caller through the [`crawler::Extractor`]
//! trait.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for trawl operations
///
/// Only configuration problems and stage-kind mismatches are fatal to a run.
/// Per-URL failures are recorded in the ledger and statistics instead.
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Stage '{stage}' is {kind} but the run uses the {model} concurrency model")]
    IncompatibleStageKind {
        stage: String,
        kind: crawler::StageKind,
        model: crawler::ConcurrencyModel,
    },

    #[error("Invalid run state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunState,
        to: state::RunState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No valid seed URL remains ({0} rejected)")]
    NoValidSeeds(usize),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Failures reported by the fetch capability
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read {url}: {source}")]
    File {
        url: String,
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Failures while writing or replaying durable records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// A scraped record. The engine attaches no schema to it.
pub type Item = serde_json::Map<String, serde_json::Value>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    ConcurrencyModel, CrawlContext, Crawler, CrawlerBuilder, Extraction, Extractor, Fetch,
    Response, StageKind,
};
pub use output::{ItemPipeline, ItemProcessor, RecordSink, RunStatistics};
pub use state::{RunState, VisitationLedger};
pub use url::NormalizedUrl;
