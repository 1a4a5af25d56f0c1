//! Fetch capability and its default HTTP implementation
//!
//! This module handles all requests for the crawler, including:
//! - The object-safe `Fetch` trait the engine and middlewares are written against
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a per-request timeout
//! - Reading `file://` targets from the local filesystem
//! - Error classification (timeout vs. transport failure)

use crate::config::{Config, UserAgentConfig};
use crate::crawler::Response;
use crate::url::NormalizedUrl;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retrieves a single URL
///
/// Implementations enforce their own timeout and report it as
/// [`FetchError::Timeout`]. A response with an error status is still a
/// response; the orchestrator decides what counts as a failure.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError>;
}

/// Shared handle to a fetch capability
pub type SharedFetch = Arc<dyn Fetch>;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total time allowed for one request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use trawl::config::UserAgentConfig;
/// use trawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "trawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: Some("https://example.com/about".to_string()),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(5)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetch capability: reqwest for http(s), tokio::fs for local files
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the configured user agent and timeout
    pub fn new(user_agent: &UserAgentConfig, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
        })
    }

    /// Creates a fetcher from a run configuration
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(&config.user_agent, config.crawler.timeout())
    }

    async fn fetch_http(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(url, e))?;

        Ok(Response::new(
            url.clone(),
            final_url,
            status,
            headers,
            body.to_vec(),
            started.elapsed(),
        ))
    }

    async fn fetch_file(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        let started = Instant::now();

        let path = url.as_url().to_file_path().map_err(|_| FetchError::File {
            url: url.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "URL does not map to a local path",
            ),
        })?;

        let body = tokio::fs::read(&path).await.map_err(|source| FetchError::File {
            url: url.to_string(),
            source,
        })?;

        let mut headers = HashMap::new();
        if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("html") | Some("htm")
        ) {
            headers.insert("content-type".to_string(), "text/html".to_string());
        }

        Ok(Response::new(
            url.clone(),
            url.as_url().clone(),
            200,
            headers,
            body,
            started.elapsed(),
        ))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &NormalizedUrl) -> Result<Response, FetchError> {
        if url.is_file() {
            self.fetch_file(url).await
        } else {
            self.fetch_http(url).await
        }
    }
}

/// Maps a reqwest error onto the fetch error taxonomy
fn classify_error(url: &NormalizedUrl, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
