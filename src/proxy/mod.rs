//! Proxy module for harvesting and checking proxies
//!
//! This module provides functionality for:
//! - Describing the catalog of proxy list sources and their response formats
//! - Parsing JSON, plain-text and HTML-table proxy lists into candidates
//! - Fetching all selected sources concurrently and deduplicating the result
//! - Checking candidates against test URLs with bounded concurrency
//! - Saving the working proxies

pub mod checker;
pub mod crawler;
pub mod models;
pub mod parser;
pub mod sink;
pub mod sources;
pub mod user_agent;

pub use checker::{CheckerConfig, HttpProbe, ProbeError, ProbeSession, ProbeTransport, ProxyChecker};
pub use crawler::{CrawlResult, CrawlerConfig, HttpSourceClient, ProxyCrawler, SourceClient};
pub use models::{
    ProxyCandidate, ProxyCheckResult, ProxyCheckStatus, ProxyType, VerificationOutcome,
    UNKNOWN_COUNTRY,
};
pub use parser::ProxyParser;
pub use sink::{MemorySink, ResultSink, TimestampedFileSink};
pub use sources::{FormatKind, ProxySource, SourceRegistry};
