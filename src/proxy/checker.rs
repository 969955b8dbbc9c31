//! Proxy checker module for verifying that candidates actually relay traffic

use crate::proxy::models::{ProxyCandidate, ProxyCheckResult};
use crate::proxy::user_agent::random_user_agent;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default connect timeout for each verification attempt in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default read timeout for each verification attempt in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent checks
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default URLs to test proxies against, tried in order
pub const DEFAULT_TEST_URLS: &[&str] = &[
    "https://httpbin.org/ip",
    "https://www.google.com",
    "https://www.wikipedia.org",
];

/// Status a test target must answer with for the proxy to count as working
const SUCCESS_STATUS: u16 = 200;

/// Why a single verification attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,
    #[error("HTTP status: {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

/// Attempts routed through one candidate proxy, sharing a single client
#[async_trait]
pub trait ProbeSession: Send + Sync {
    /// Request `target` through the proxy and return the response status
    async fn probe(&self, target: &str) -> Result<u16, ProbeError>;
}

/// Opens a [`ProbeSession`] per candidate
pub trait ProbeTransport: Send + Sync {
    /// Prepare the client every attempt through `proxy` reuses. Fails
    /// without touching the network when the proxy cannot be used at all.
    fn open(&self, proxy: &ProxyCandidate, user_agent: &str) -> Result<Box<dyn ProbeSession>, ProbeError>;
}

/// [`ProbeTransport`] backed by reqwest, tunnelling both HTTP and HTTPS
/// targets through the candidate's own scheme (http, https, socks4, socks5)
pub struct HttpProbe {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpProbe {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    fn create_client(&self, proxy: &ProxyCandidate, user_agent: &str) -> Result<Client, ProbeError> {
        let reqwest_proxy = ReqwestProxy::all(proxy.url())?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .user_agent(user_agent)
            .connect_timeout(self.connect_timeout)
            .timeout(self.connect_timeout + self.read_timeout)
            .build()?;

        Ok(client)
    }
}

impl ProbeTransport for HttpProbe {
    fn open(&self, proxy: &ProxyCandidate, user_agent: &str) -> Result<Box<dyn ProbeSession>, ProbeError> {
        Ok(Box::new(HttpSession {
            client: self.create_client(proxy, user_agent)?,
            deadline: self.connect_timeout + self.read_timeout,
        }))
    }
}

struct HttpSession {
    client: Client,
    deadline: Duration,
}

#[async_trait]
impl ProbeSession for HttpSession {
    async fn probe(&self, target: &str) -> Result<u16, ProbeError> {
        match tokio::time::timeout(self.deadline, self.client.get(target).send()).await {
            Ok(Ok(response)) => Ok(response.status().as_u16()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Connect timeout for each attempt
    pub connect_timeout: Duration,
    /// Read timeout for each attempt
    pub read_timeout: Duration,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// URLs to test proxies against, in order
    pub test_urls: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_urls: DEFAULT_TEST_URLS.iter().map(|url| url.to_string()).collect(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_test_urls(mut self, urls: Vec<String>) -> Self {
        self.test_urls = urls;
        self
    }
}

/// Proxy checker for validating proxies
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    transport: Arc<dyn ProbeTransport>,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        let transport = HttpProbe::new(config.connect_timeout, config.read_timeout);
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a proxy checker over a custom [`ProbeTransport`]
    pub fn with_transport(config: CheckerConfig, transport: Arc<dyn ProbeTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check a single proxy.
    ///
    /// Test targets are tried in order and the first success confirms the
    /// proxy; the remaining targets are not requested.
    pub async fn check_proxy(&self, proxy: &ProxyCandidate) -> ProxyCheckResult {
        let start = Instant::now();
        let session = match self.transport.open(proxy, random_user_agent()) {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot test {}: {}", proxy, e);
                return ProxyCheckResult::failed(proxy.clone(), e.to_string(), 0);
            }
        };
        let mut attempts = 0;
        let mut last_error = None;

        for target in &self.config.test_urls {
            attempts += 1;
            match session.probe(target).await {
                Ok(SUCCESS_STATUS) => {
                    let elapsed = start.elapsed().as_millis() as u64;
                    debug!("{} works via {} ({}ms)", proxy, target, elapsed);
                    return ProxyCheckResult::working(proxy.clone(), target.clone(), attempts, elapsed);
                }
                Ok(status) => {
                    debug!("{} -> {}: HTTP status {}", proxy, target, status);
                    last_error = Some(ProbeError::Status(status));
                }
                Err(e) => {
                    debug!("{} -> {}: {}", proxy, target, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(ProbeError::Timeout) => ProxyCheckResult::timeout(proxy.clone(), attempts),
            Some(e) => ProxyCheckResult::failed(proxy.clone(), e.to_string(), attempts),
            None => ProxyCheckResult::failed(proxy.clone(), "no test URLs configured".to_string(), 0),
        }
    }

    /// Run one check on its own task so a panic only loses that proxy
    async fn spawn_check(&self, proxy: ProxyCandidate) -> ProxyCheckResult {
        let checker = self.clone();
        let task_proxy = proxy.clone();

        match tokio::spawn(async move { checker.check_proxy(&task_proxy).await }).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Check of {} aborted: {}", proxy, e);
                ProxyCheckResult::failed(proxy, e.to_string(), 0)
            }
        }
    }

    /// Check multiple proxies concurrently; results follow input order
    pub async fn check_proxies(&self, proxies: Vec<ProxyCandidate>) -> Vec<ProxyCheckResult> {
        let mut indexed: Vec<(usize, ProxyCheckResult)> = stream::iter(proxies.into_iter().enumerate())
            .map(|(index, proxy)| {
                let checker = self.clone();
                async move { (index, checker.spawn_check(proxy).await) }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Check proxies in the background, delivering results as they complete
    pub fn check_proxies_stream(&self, proxies: Vec<ProxyCandidate>) -> mpsc::Receiver<ProxyCheckResult> {
        let concurrency = self.config.concurrency.max(1);
        let (tx, rx) = mpsc::channel(concurrency * 2);
        let checker = self.clone();

        tokio::spawn(async move {
            let mut results = stream::iter(proxies)
                .map(|proxy| {
                    let checker = checker.clone();
                    async move { checker.spawn_check(proxy).await }
                })
                .buffer_unordered(concurrency);

            while let Some(result) = results.next().await {
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Check proxies and separate into good and bad results
    pub async fn check_and_separate(
        &self,
        proxies: Vec<ProxyCandidate>,
    ) -> (Vec<ProxyCheckResult>, Vec<ProxyCheckResult>) {
        let results = self.check_proxies(proxies).await;

        let (good, bad): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_working());

        (good, bad)
    }
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new()
    }
}
