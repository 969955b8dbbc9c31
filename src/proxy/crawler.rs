//! Proxy crawler module for fetching proxy lists from the known sources
//!
//! This module provides:
//! - The [`SourceClient`] seam for the single outbound read per source
//! - Per-source fetching that never fails the run ([`ProxyCrawler::crawl_source`])
//! - Concurrent aggregation with deduplication and shuffling ([`ProxyCrawler::harvest`])

use crate::proxy::models::ProxyCandidate;
use crate::proxy::parser::ProxyParser;
use crate::proxy::sources::ProxySource;
use crate::proxy::user_agent::random_user_agent;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for fetching a proxy list in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default maximum number of sources fetched at once
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Outbound read of one proxy list
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// GET `url` with the given User-Agent and return the body.
    /// Non-success statuses are errors.
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<String>;
}

/// [`SourceClient`] backed by reqwest
pub struct HttpSourceClient {
    client: Client,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Result of crawling a single source
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Key of the source that was crawled
    pub source_key: String,
    /// Name of the source that was crawled
    pub source: String,
    /// Proxies extracted from the source
    pub proxies: Vec<ProxyCandidate>,
    /// Error message if crawling failed
    pub error: Option<String>,
}

impl CrawlResult {
    /// Create a successful crawl result
    pub fn success(source: &ProxySource, proxies: Vec<ProxyCandidate>) -> Self {
        Self {
            source_key: source.key.clone(),
            source: source.name.clone(),
            proxies,
            error: None,
        }
    }

    /// Create a failed crawl result
    pub fn failure(source: &ProxySource, error: String) -> Self {
        Self {
            source_key: source.key.clone(),
            source: source.name.clone(),
            proxies: Vec::new(),
            error: Some(error),
        }
    }

    /// Check if the crawl was successful
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for proxy crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// Maximum number of sources fetched at once
    pub concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Proxy crawler for fetching proxies from the source catalog
#[derive(Clone)]
pub struct ProxyCrawler {
    config: CrawlerConfig,
    client: Arc<dyn SourceClient>,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(CrawlerConfig::default())
    }

    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = HttpSourceClient::new(config.timeout)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Create a proxy crawler over a custom [`SourceClient`]
    pub fn with_client(config: CrawlerConfig, client: Arc<dyn SourceClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Fetch and parse one source. Failures are logged and reported in the
    /// result, never returned as errors.
    pub async fn crawl_source(&self, source: &ProxySource) -> CrawlResult {
        info!("Fetching proxies from {} ({})", source.name, source.url);

        match self.client.fetch(&source.url, random_user_agent()).await {
            Ok(body) => {
                let proxies = ProxyParser::parse(source.format, &body);
                info!("Found {} proxies from {}", proxies.len(), source.name);
                CrawlResult::success(source, proxies)
            }
            Err(e) => {
                warn!("Could not fetch proxies from {}: {}", source.name, e);
                CrawlResult::failure(source, e.to_string())
            }
        }
    }

    /// Fetch all sources concurrently, at most `concurrency` at a time.
    /// Results arrive in completion order.
    pub async fn crawl_sources_with_results(&self, sources: &[ProxySource]) -> Vec<CrawlResult> {
        if sources.is_empty() {
            return Vec::new();
        }
        let concurrency = self.config.concurrency.min(sources.len()).max(1);

        stream::iter(sources.to_vec())
            .map(|source| {
                let crawler = self.clone();
                async move {
                    let task_source = source.clone();
                    let handle =
                        tokio::spawn(async move { crawler.crawl_source(&task_source).await });
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("Source {} generated an exception: {}", source.key, e);
                            CrawlResult::failure(&source, e.to_string())
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Fetch all sources, then merge, deduplicate and shuffle the candidates
    pub async fn harvest(&self, sources: &[ProxySource]) -> Vec<ProxyCandidate> {
        let results = self.crawl_sources_with_results(sources).await;
        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("{} of {} sources could not be fetched", failed, results.len());
        }

        let all: Vec<ProxyCandidate> = results.into_iter().flat_map(|r| r.proxies).collect();
        let proxies = dedupe_and_shuffle(all);
        info!("Found {} unique proxies", proxies.len());
        proxies
    }
}

/// Drop repeated candidates, keeping the first occurrence of each identity
pub fn dedupe(proxies: Vec<ProxyCandidate>) -> Vec<ProxyCandidate> {
    let mut seen = HashSet::new();
    proxies
        .into_iter()
        .filter(|proxy| seen.insert(proxy.clone()))
        .collect()
}

/// Deduplicate, then randomize the order so testing does not walk one source
/// block at a time
pub fn dedupe_and_shuffle(proxies: Vec<ProxyCandidate>) -> Vec<ProxyCandidate> {
    let mut proxies = dedupe(proxies);
    proxies.shuffle(&mut rand::thread_rng());
    proxies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;
    use crate::proxy::sources::{FormatKind, SourceRegistry};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned bodies keyed by URL; unknown URLs fail
    struct StaticClient {
        bodies: HashMap<String, String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl StaticClient {
        fn new(bodies: Vec<(&str, &str)>) -> Self {
            Self {
                bodies: bodies
                    .into_iter()
                    .map(|(url, body)| (url.to_string(), body.to_string()))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SourceClient for StaticClient {
        async fn fetch(&self, url: &str, user_agent: &str) -> Result<String> {
            assert!(user_agent.starts_with("Mozilla/5.0"));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("connection refused: {}", url))
        }
    }

    /// Panics while fetching one URL and serves the rest from `inner`
    struct PanickingClient {
        inner: StaticClient,
        panic_url: &'static str,
    }

    #[async_trait]
    impl SourceClient for PanickingClient {
        async fn fetch(&self, url: &str, user_agent: &str) -> Result<String> {
            if url == self.panic_url {
                panic!("parser state corrupted");
            }
            self.inner.fetch(url, user_agent).await
        }
    }

    fn text_source(key: &str, scheme: ProxyType) -> ProxySource {
        ProxySource::new(
            key,
            &format!("source {}", key),
            &format!("http://lists.test/{}", key),
            FormatKind::PlainText { scheme },
        )
    }

    fn crawler(client: StaticClient) -> ProxyCrawler {
        ProxyCrawler::with_client(CrawlerConfig::default(), Arc::new(client))
    }

    #[test]
    fn test_crawler_config_default() {
        let config = CrawlerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_crawler_config_builder() {
        let config = CrawlerConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_concurrency(0);

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_crawl_result_failure() {
        let source = text_source("1", ProxyType::Http);
        let result = CrawlResult::failure(&source, "Connection failed".to_string());
        assert!(!result.is_success());
        assert_eq!(result.source_key, "1");
        assert!(result.proxies.is_empty());
        assert_eq!(result.error, Some("Connection failed".to_string()));
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let a = ProxyCandidate::new("1.1.1.1".into(), 80, ProxyType::Http, None);
        let b = ProxyCandidate::new("2.2.2.2".into(), 80, ProxyType::Http, None);
        let a_socks = ProxyCandidate::new("1.1.1.1".into(), 80, ProxyType::Socks5, None);

        let deduped = dedupe(vec![a.clone(), b.clone(), a.clone(), a_socks.clone(), b.clone()]);
        assert_eq!(deduped, vec![a, b, a_socks]);
    }

    #[tokio::test]
    async fn test_crawl_source_failure_is_isolated() {
        let crawler = crawler(StaticClient::new(vec![]));
        let result = crawler.crawl_source(&text_source("1", ProxyType::Http)).await;
        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
    }

    #[tokio::test]
    async fn test_harvest_merges_and_dedupes_across_sources() {
        let client = StaticClient::new(vec![
            ("http://lists.test/1", "1.1.1.1:80\n2.2.2.2:8080"),
            ("http://lists.test/2", "2.2.2.2:8080\n3.3.3.3:3128"),
            ("http://lists.test/3", "2.2.2.2:8080"),
        ]);
        let sources = vec![
            text_source("1", ProxyType::Http),
            text_source("2", ProxyType::Http),
            text_source("3", ProxyType::Socks5),
            text_source("4", ProxyType::Http),
        ];

        let proxies = crawler(client).harvest(&sources).await;
        assert_eq!(proxies.len(), 4);

        let unique: HashSet<_> = proxies.iter().cloned().collect();
        assert_eq!(unique.len(), proxies.len());
        assert!(proxies
            .iter()
            .any(|p| p.host == "2.2.2.2" && p.proxy_type == ProxyType::Socks5));
    }

    #[tokio::test]
    async fn test_harvest_is_idempotent_as_a_set() {
        let bodies = vec![
            ("http://lists.test/1", "1.1.1.1:80\n2.2.2.2:8080\n1.1.1.1:80"),
            ("http://lists.test/2", "4.4.4.4:1080\n5.5.5.5:1080"),
        ];
        let sources = vec![text_source("1", ProxyType::Http), text_source("2", ProxyType::Socks4)];

        let first: HashSet<_> = crawler(StaticClient::new(bodies.clone()))
            .harvest(&sources)
            .await
            .into_iter()
            .collect();
        let second: HashSet<_> = crawler(StaticClient::new(bodies))
            .harvest(&sources)
            .await
            .into_iter()
            .collect();

        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_harvest_with_no_sources_or_all_failing_is_empty() {
        let crawler = crawler(StaticClient::new(vec![]));
        assert!(crawler.harvest(&[]).await.is_empty());

        let registry = SourceRegistry::builtin();
        assert!(crawler.harvest(registry.sources()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_concurrency_is_bounded() {
        let sources: Vec<ProxySource> = (0..15)
            .map(|i| text_source(&i.to_string(), ProxyType::Http))
            .collect();
        let client = Arc::new(StaticClient::new(vec![]).with_delay(Duration::from_millis(20)));
        let crawler = ProxyCrawler::with_client(CrawlerConfig::default(), client.clone());

        let results = crawler.crawl_sources_with_results(&sources).await;
        assert_eq!(results.len(), 15);
        let max = client.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= DEFAULT_CONCURRENCY, "max in flight was {}", max);
        assert!(max > 1);
    }

    #[tokio::test]
    async fn test_http_source_client_sends_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/list")
            .match_header("user-agent", mockito::Matcher::Regex("^Mozilla/5.0".to_string()))
            .with_status(200)
            .with_body("7.7.7.7:8080\n8.8.8.8:3128\n")
            .create_async()
            .await;

        let source = ProxySource::new(
            "t",
            "mock list",
            &format!("{}/list", server.url()),
            FormatKind::PlainText { scheme: ProxyType::Https },
        );
        let crawler = ProxyCrawler::new().unwrap();
        let result = crawler.crawl_source(&source).await;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.proxies.len(), 2);
        assert!(result.proxies.iter().all(|p| p.proxy_type == ProxyType::Https));
    }

    #[tokio::test]
    async fn test_http_source_client_bad_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/list")
            .with_status(503)
            .with_body("1.1.1.1:80")
            .create_async()
            .await;

        let source = ProxySource::new(
            "t",
            "mock list",
            &format!("{}/list", server.url()),
            FormatKind::PlainText { scheme: ProxyType::Http },
        );
        let result = ProxyCrawler::new().unwrap().crawl_source(&source).await;
        assert!(!result.is_success());
        assert!(result.proxies.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_source_is_reported_as_failed() {
        let client = PanickingClient {
            inner: StaticClient::new(vec![
                ("http://lists.test/1", "1.1.1.1:80"),
                ("http://lists.test/3", "3.3.3.3:3128"),
            ]),
            panic_url: "http://lists.test/2",
        };
        let crawler = ProxyCrawler::with_client(CrawlerConfig::default(), Arc::new(client));
        let sources = vec![
            text_source("1", ProxyType::Http),
            text_source("2", ProxyType::Http),
            text_source("3", ProxyType::Http),
        ];

        let results = crawler.crawl_sources_with_results(&sources).await;
        assert_eq!(results.len(), 3);

        let failed = results.iter().find(|r| r.source_key == "2").unwrap();
        assert!(!failed.is_success());
        assert!(failed.proxies.is_empty());
        assert!(failed.error.as_deref().unwrap_or_default().contains("panic"));

        let hosts: HashSet<String> = results
            .iter()
            .flat_map(|r| r.proxies.iter().map(|p| p.host.clone()))
            .collect();
        assert_eq!(hosts, HashSet::from(["1.1.1.1".to_string(), "3.3.3.3".to_string()]));
    }
}
