//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! It respects robots.txt directives when crawling websites.
//!
//! # Components
//!
//! - `ParsedRobots`: Allow/deny rules plus `Crawl-delay` / `Request-rate`
//! - `RobotsPolicy`: A host's cached rules and whether fetching them failed
//! - `RobotsAuthority`: Lazily fetches one policy per host and answers queries

mod authority;
mod cache;
mod parser;

pub use authority::RobotsAuthority;
pub use cache::RobotsPolicy;
pub use parser::ParsedRobots;
