//! Open Proxy Harvester - Proxy list harvester and checker
//!
//! Fetches free proxy lists from a catalog of public sources, normalizes and
//! deduplicates the entries, and keeps only the proxies that answer a test
//! request.

pub mod error;
pub mod logging;
pub mod pipeline;
pub mod proxy;
pub mod tui;

pub use error::PipelineError;
pub use pipeline::{Harvester, RunSummary};
pub use proxy::*;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration, optionally loaded from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Timeout for fetching a proxy list, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Maximum number of sources fetched at once
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Connect timeout for each verification attempt, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Read timeout for each verification attempt, in seconds
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Number of proxies verified at once
    #[serde(default = "default_check_concurrency")]
    pub check_concurrency: usize,
    /// URLs requested through each proxy, in order
    #[serde(default = "default_test_urls")]
    pub test_urls: Vec<String>,
    /// Directory the working proxy list is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_fetch_timeout_secs() -> u64 {
    proxy::crawler::DEFAULT_TIMEOUT_SECS
}

fn default_fetch_concurrency() -> usize {
    proxy::crawler::DEFAULT_CONCURRENCY
}

fn default_connect_timeout_secs() -> u64 {
    proxy::checker::DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout_secs() -> u64 {
    proxy::checker::DEFAULT_READ_TIMEOUT_SECS
}

fn default_check_concurrency() -> usize {
    proxy::checker::DEFAULT_CONCURRENCY
}

fn default_test_urls() -> Vec<String> {
    proxy::checker::DEFAULT_TEST_URLS
        .iter()
        .map(|url| url.to_string())
        .collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            check_concurrency: default_check_concurrency(),
            test_urls: default_test_urls(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.test_urls.is_empty() {
            anyhow::bail!("Configuration must list at least one test URL");
        }
        Ok(config)
    }

    /// Settings for the source fetch stage
    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig::new()
            .with_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_concurrency(self.fetch_concurrency)
    }

    /// Settings for the verification stage
    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.read_timeout_secs))
            .with_concurrency(self.check_concurrency)
            .with_test_urls(self.test_urls.clone())
    }
}
