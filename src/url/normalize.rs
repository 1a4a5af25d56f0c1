use crate::{UrlError, UrlResult};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Schemes the engine knows how to fetch
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Canonical, comparable form of a crawl target
///
/// Two URLs designate the same crawl target iff their normalized forms are
/// equal. Equality, ordering and hashing all operate on the normalized form.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than http, https and file
/// 3. Lowercase the host and drop the scheme's default port (done by the parser)
/// 4. Resolve dot segments (done by the parser)
/// 5. Remove the trailing slash of the path, except for the root `/`
/// 6. Remove the fragment
/// 7. Remove an empty query string (trailing `?`)
///
/// # Examples
///
/// ```
/// use trawl::url::NormalizedUrl;
///
/// let url = NormalizedUrl::normalize("HTTP://Example.COM:80/page/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Parses and normalizes a raw URL string
    pub fn normalize(raw: &str) -> UrlResult<Self> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed).map_err(|e| UrlError::Invalid {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    /// Resolves `relative` against `base` (RFC 3986 reference resolution)
    /// and normalizes the result
    pub fn resolve(base: &NormalizedUrl, relative: &str) -> UrlResult<Self> {
        Self::resolve_against(&base.0, relative)
    }

    /// Same as [`NormalizedUrl::resolve`] but against any parsed base, such
    /// as the final URL of a response after redirects
    pub fn resolve_against(base: &Url, relative: &str) -> UrlResult<Self> {
        let trimmed = relative.trim();
        let joined = base.join(trimmed).map_err(|e| UrlError::Invalid {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(joined)
    }

    /// Normalizes an already parsed URL
    pub fn from_url(mut url: Url) -> UrlResult<Self> {
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
        }

        let path = strip_trailing_slash(url.path());

        if url.scheme() == "file" {
            if path.len() <= 1 {
                return Err(UrlError::Invalid {
                    url: url.to_string(),
                    reason: "file URL must provide a path to a local file".to_string(),
                });
            }
        } else if url.host_str().map_or(true, str::is_empty) {
            return Err(UrlError::Invalid {
                url: url.to_string(),
                reason: "URL must provide a host".to_string(),
            });
        }

        url.set_path(&path);

        url.set_fragment(None);

        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(Self(url))
    }

    /// Returns the normalized URL as a string slice
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the URL scheme (`http`, `https` or `file`)
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Returns the lowercase host, if any
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Returns the URL path
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Returns true for local `file://` targets
    pub fn is_file(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Key identifying the origin server: `host:port` for network URLs,
    /// `file` for local files
    pub fn host_key(&self) -> String {
        match (self.0.host_str(), self.0.port_or_known_default()) {
            (Some(host), Some(port)) if !self.is_file() => format!("{}:{}", host, port),
            (Some(host), None) if !self.is_file() => host.to_string(),
            _ => "file".to_string(),
        }
    }

    /// Location of the robots.txt file governing this URL
    ///
    /// Returns `None` for local files, which are not subject to robots rules.
    pub fn robots_url(&self) -> Option<Url> {
        if self.is_file() {
            return None;
        }
        let mut robots = self.0.clone();
        robots.set_path("/robots.txt");
        robots.set_query(None);
        robots.set_fragment(None);
        Some(robots)
    }
}

/// Removes the trailing slash from a path, keeping the root `/`
fn strip_trailing_slash(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for NormalizedUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
