//! URL handling module for trawl
//!
//! This module provides the canonical [`NormalizedUrl`] type used everywhere a
//! crawl target is named: the frontier, the ledger, politeness keys and robots
//! lookups.

mod normalize;

pub use normalize::NormalizedUrl;
