//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.
//! Allow/deny matching is delegated to the crate (longest match wins, malformed
//! content allows everything); the rate directives it does not expose are
//! parsed here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Rules {
    AllowAll,
    DenyAll,
    Content(String),
}

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's types, providing a simplified
/// interface for checking if URLs are allowed.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    rules: Rules,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// A ParsedRobots instance that can be used to check URL permissions
    pub fn from_content(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::allow_all();
        }
        Self {
            rules: Rules::Content(content.to_string()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when the host has no robots.txt or serves an error for it.
    pub fn allow_all() -> Self {
        Self {
            rules: Rules::AllowAll,
        }
    }

    /// Creates a ParsedRobots that denies everything
    ///
    /// Used when robots.txt access is forbidden (401/403), or when it could not
    /// be fetched and the run is configured to fail closed.
    pub fn deny_all() -> Self {
        Self {
            rules: Rules::DenyAll,
        }
    }

    /// Returns the raw robots.txt content, if any was parsed
    pub fn content(&self) -> Option<&str> {
        match &self.rules {
            Rules::Content(content) => Some(content),
            _ => None,
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL or path to check (e.g., "https://example.com/page.html" or "/page.html")
    /// * `user_agent` - The crawler's product token
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match &self.rules {
            Rules::AllowAll => true,
            Rules::DenyAll => false,
            Rules::Content(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.group_directive(user_agent, "crawl-delay", |value| {
            value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
        })
    }

    /// Gets the request rate for a specific user agent
    ///
    /// Format: `Request-rate: <requests>/<seconds>`, the seconds part optionally
    /// suffixed with `s`, `m` or `h`.
    ///
    /// # Returns
    ///
    /// * `Some((requests, seconds))` - The allowed number of requests per period
    /// * `None` - If no valid request rate is specified
    pub fn request_rate(&self, user_agent: &str) -> Option<(u32, f64)> {
        self.group_directive(user_agent, "request-rate", parse_request_rate)
    }

    /// Minimum delay between two requests demanded by this file
    ///
    /// `Crawl-delay` takes precedence; otherwise the delay is derived from
    /// `Request-rate` as seconds per request.
    pub fn delay(&self, user_agent: &str) -> Option<Duration> {
        let seconds = self.crawl_delay(user_agent).or_else(|| {
            self.request_rate(user_agent)
                .map(|(requests, seconds)| seconds / f64::from(requests))
        })?;
        Duration::try_from_secs_f64(seconds).ok()
    }

    /// Finds a directive's value within the group that applies to `user_agent`
    ///
    /// A group made of consecutive `User-agent` lines naming this agent wins
    /// over the `*` group.
    fn group_directive<T>(
        &self,
        user_agent: &str,
        directive: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let content = match &self.rules {
            Rules::Content(content) => content,
            _ => return None,
        };

        let normalized_agent = user_agent.to_lowercase();
        let mut current_user_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut for_wildcard: Option<T> = None;
        let mut for_agent: Option<T> = None;

        for line in content.lines() {
            // Strip trailing comments
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // A User-agent line after rules starts a new group
                if !in_agent_lines {
                    current_user_agents.clear();
                }
                in_agent_lines = true;
                current_user_agents.push(value.to_lowercase());
                continue;
            }
            in_agent_lines = false;

            if key != directive {
                continue;
            }
            let Some(parsed) = parse(value) else {
                continue;
            };

            if current_user_agents
                .iter()
                .any(|ua| ua != "*" && normalized_agent.contains(ua.as_str()))
            {
                for_agent.get_or_insert(parsed);
            } else if current_user_agents.iter().any(|ua| ua == "*") {
                for_wildcard.get_or_insert(parsed);
            }
        }

        // Prefer specific user-agent value over wildcard value
        for_agent.or(for_wildcard)
    }
}

fn parse_request_rate(value: &str) -> Option<(u32, f64)> {
    let (requests, period) = value.split_once('/')?;
    let requests: u32 = requests.trim().parse().ok().filter(|r| *r > 0)?;

    // Ignore an optional time-of-day window after the rate
    let period = period.split_whitespace().next()?.to_lowercase();
    let (number, multiplier) = match period.chars().last()? {
        's' => (&period[..period.len() - 1], 1.0),
        'm' => (&period[..period.len() - 1], 60.0),
        'h' => (&period[..period.len() - 1], 3600.0),
        _ => (period.as_str(), 1.0),
    };
    let seconds: f64 = number.parse().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some((requests, seconds * multiplier))
}
