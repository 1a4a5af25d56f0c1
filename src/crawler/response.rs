//! Fetched responses and HTML selection helpers
//!
//! The engine never looks inside a response beyond its status; the helpers
//! here exist for extractors:
//! - CSS selection of element text and attributes
//! - Page title
//! - Links to follow (from <a> tags and canonical links)

use crate::url::NormalizedUrl;
use scraper::{Html, Selector};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A fetched document
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL that was requested
    pub url: NormalizedUrl,

    /// URL after redirects; relative links resolve against it
    pub final_url: Url,

    /// HTTP status code (200 for local files)
    pub status: u16,

    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,

    /// Raw body bytes
    pub body: Vec<u8>,

    /// Time spent fetching
    pub elapsed: Duration,

    serial: u64,
}

impl Response {
    /// Creates a response and assigns it a process-unique serial
    pub fn new(
        url: NormalizedUrl,
        final_url: Url,
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url,
            final_url,
            status,
            headers,
            body,
            elapsed,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identity of this response object
    ///
    /// Clones share the serial; two separately created responses never do.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Returns true for 2xx and 3xx statuses
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the Content-Type header, if any
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns true if the body looks like HTML
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(content_type) => content_type.contains("html"),
            None => self.final_url.path().ends_with(".html") || self.final_url.path().ends_with(".htm"),
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.text())
    }

    /// Text content of every element matching a CSS selector, trimmed
    ///
    /// # Arguments
    ///
    /// * `selector` - A CSS selector, e.g. `"h1.title"`
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Matched texts in document order
    /// * `Err` - The selector does not parse
    pub fn css(&self, selector: &str) -> anyhow::Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .document()
            .select(&selector)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .collect())
    }

    /// Values of `attr` on every element matching a CSS selector
    pub fn css_attr(&self, selector: &str, attr: &str) -> anyhow::Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .document()
            .select(&selector)
            .filter_map(|element| element.value().attr(attr))
            .map(str::to_string)
            .collect())
    }

    /// Extracts the page title from the <title> tag
    pub fn title(&self) -> Option<String> {
        let title_selector = Selector::parse("title").ok()?;

        self.document()
            .select(&title_selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Absolute URLs of the links on the page
    ///
    /// # Link Extraction Rules
    ///
    /// **Include:**
    /// - `<a href="...">` tags
    /// - `<link rel="canonical" href="...">`
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs and fragment-only links
    /// - Schemes other than http, https and file
    ///
    /// Links are resolved against the final URL, in document order.
    pub fn links(&self) -> Vec<String> {
        let document = self.document();
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                if let Some(link) = element
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(href, &self.final_url))
                {
                    links.push(link);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                if let Some(link) = element
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(href, &self.final_url))
                {
                    links.push(link);
                }
            }
        }

        links
    }
}

fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("Invalid CSS selector '{}': {:?}", selector, e))
}

/// Resolves a link href to an absolute URL, or `None` if it should be skipped
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" | "file" => Some(absolute_url.to_string()),
        _ => None,
    }
}
