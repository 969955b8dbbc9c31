//! End-to-end harvesting run: fetch, verify, save

use crate::error::PipelineError;
use crate::proxy::{
    ProxyCandidate, ProxyCheckResult, ProxyChecker, ProxyCrawler, ProxySource, ResultSink,
    SourceRegistry,
};
use crate::{Config, Result};
use std::future::Future;
use tracing::info;

/// Counts reported after a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Sources that were fetched
    pub sources: usize,
    /// Unique candidates found across all sources
    pub found: usize,
    /// Candidates that passed verification and were saved
    pub working: usize,
}

/// Runs the fetch stage and then the verification stage; the two never overlap
pub struct Harvester {
    registry: SourceRegistry,
    crawler: ProxyCrawler,
    checker: ProxyChecker,
}

impl Harvester {
    pub fn new(registry: SourceRegistry, crawler: ProxyCrawler, checker: ProxyChecker) -> Self {
        Self {
            registry,
            crawler,
            checker,
        }
    }

    /// Harvester over the built-in catalog and real HTTP clients
    pub fn from_config(config: &Config) -> Result<Self> {
        let crawler = ProxyCrawler::with_config(config.crawler_config())?;
        let checker = ProxyChecker::with_config(config.checker_config());
        Ok(Self::new(SourceRegistry::builtin(), crawler, checker))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn checker(&self) -> &ProxyChecker {
        &self.checker
    }

    async fn harvest_sources(&self, sources: &[ProxySource]) -> Result<Vec<ProxyCandidate>> {
        let proxies = self.crawler.harvest(sources).await;
        if proxies.is_empty() {
            return Err(PipelineError::NoProxiesFound.into());
        }
        Ok(proxies)
    }

    /// Full run: select, fetch, verify and hand the working proxies to `sink`.
    ///
    /// Nothing reaches the sink when no proxies are found or none work.
    pub async fn run<S: AsRef<str>>(&self, keys: &[S], sink: &mut dyn ResultSink) -> Result<RunSummary> {
        self.run_with(keys, sink, |proxies| async move {
            Ok(self.checker.check_proxies(proxies).await)
        })
        .await
    }

    /// Same as [`Harvester::run`], with `verify` driving the verification
    /// stage (the live dashboard, for instance). Working proxies are saved in
    /// the order `verify` reports them.
    pub async fn run_with<S, V, F>(
        &self,
        keys: &[S],
        sink: &mut dyn ResultSink,
        verify: V,
    ) -> Result<RunSummary>
    where
        S: AsRef<str>,
        V: FnOnce(Vec<ProxyCandidate>) -> F,
        F: Future<Output = Result<Vec<ProxyCheckResult>>>,
    {
        let sources = self.registry.select(keys)?;
        let proxies = self.harvest_sources(&sources).await?;
        let found = proxies.len();

        info!(
            "Testing {} proxies with {} workers...",
            found,
            self.checker.config().concurrency
        );
        let working = confirmed(verify(proxies).await?, found)?;
        sink.save(&working)?;

        info!("Proxy check completed: {} of {} proxies work", working.len(), found);
        Ok(RunSummary {
            sources: sources.len(),
            found,
            working: working.len(),
        })
    }
}

/// Working proxies out of a finished verification, or the terminal error
pub fn confirmed(results: Vec<ProxyCheckResult>, tested: usize) -> Result<Vec<ProxyCandidate>> {
    let working: Vec<ProxyCandidate> = results
        .into_iter()
        .filter_map(|result| result.into_outcome().confirmed())
        .collect();

    if working.is_empty() {
        return Err(PipelineError::NoWorkingProxies { tested }.into());
    }
    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{
        CheckerConfig, CrawlerConfig, FormatKind, MemorySink, ProbeError, ProbeSession, ProbeTransport,
        ProxyType, SourceClient,
    };
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    struct StaticClient(HashMap<String, String>);

    #[async_trait]
    impl SourceClient for StaticClient {
        async fn fetch(&self, url: &str, _user_agent: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {}", url))
        }
    }

    /// Proxies on port 8080 work, everything else is refused
    struct PortTransport;

    struct PortSession {
        open_port: bool,
    }

    impl ProbeTransport for PortTransport {
        fn open(&self, proxy: &ProxyCandidate, _ua: &str) -> std::result::Result<Box<dyn ProbeSession>, ProbeError> {
            Ok(Box::new(PortSession { open_port: proxy.port == 8080 }))
        }
    }

    #[async_trait]
    impl ProbeSession for PortSession {
        async fn probe(&self, _target: &str) -> std::result::Result<u16, ProbeError> {
            if self.open_port {
                Ok(200)
            } else {
                Err(ProbeError::Transport("connection refused".to_string()))
            }
        }
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::new(vec![
            ProxySource::new(
                "1",
                "text",
                "http://lists.test/text",
                FormatKind::PlainText { scheme: ProxyType::Socks5 },
            ),
            ProxySource::new("2", "json", "http://lists.test/json", FormatKind::JsonList),
            ProxySource::new("3", "down", "http://lists.test/down", FormatKind::HtmlTable),
        ])
    }

    fn harvester(bodies: Vec<(&str, &str)>) -> Harvester {
        let client = StaticClient(
            bodies
                .into_iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
        );
        Harvester::new(
            registry(),
            ProxyCrawler::with_client(CrawlerConfig::default(), Arc::new(client)),
            ProxyChecker::with_transport(CheckerConfig::default(), Arc::new(PortTransport)),
        )
    }

    fn pipeline_error(err: &anyhow::Error) -> Option<&PipelineError> {
        err.downcast_ref::<PipelineError>()
    }

    #[tokio::test]
    async fn test_run_saves_only_working_proxies() {
        let harvester = harvester(vec![
            ("http://lists.test/text", "1.1.1.1:8080\n2.2.2.2:3128\n1.1.1.1:8080"),
            (
                "http://lists.test/json",
                r#"{"data":[{"ip":"3.3.3.3","port":"8080","protocols":["http"],"country":"NL"}]}"#,
            ),
        ]);
        let mut sink = MemorySink::default();

        let summary = harvester.run(&["1", "2", "3"], &mut sink).await.unwrap();

        assert_eq!(summary, RunSummary { sources: 3, found: 3, working: 2 });
        assert_eq!(sink.saves, 1);
        let saved: HashSet<String> = sink.proxies.iter().map(|p| p.to_output_line()).collect();
        assert_eq!(
            saved,
            HashSet::from([
                "socks5://1.1.1.1:8080 ??".to_string(),
                "http://3.3.3.3:8080 NL".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_run_with_all_sources_failing_writes_nothing() {
        let harvester = harvester(vec![]);
        let mut sink = MemorySink::default();

        let err = harvester.run(&["1", "2", "3"], &mut sink).await.unwrap_err();

        assert_eq!(pipeline_error(&err), Some(&PipelineError::NoProxiesFound));
        assert_eq!(sink.saves, 0);
    }

    #[tokio::test]
    async fn test_run_with_no_working_proxies_writes_nothing() {
        let harvester = harvester(vec![("http://lists.test/text", "1.1.1.1:80\n2.2.2.2:3128")]);
        let mut sink = MemorySink::default();

        let err = harvester.run(&["1"], &mut sink).await.unwrap_err();

        assert_eq!(
            pipeline_error(&err),
            Some(&PipelineError::NoWorkingProxies { tested: 2 })
        );
        assert_eq!(sink.saves, 0);
    }

    #[tokio::test]
    async fn test_run_with_invalid_selection() {
        let harvester = harvester(vec![]);
        let mut sink = MemorySink::default();
        let empty: [&str; 0] = [];

        let err = harvester.run(&empty, &mut sink).await.unwrap_err();
        assert!(matches!(pipeline_error(&err), Some(PipelineError::InvalidSelection(_))));

        let err = harvester.run(&["7"], &mut sink).await.unwrap_err();
        assert!(matches!(pipeline_error(&err), Some(PipelineError::InvalidSelection(_))));
        assert_eq!(sink.saves, 0);
    }

    #[test]
    fn test_confirmed_keeps_order() {
        let a = ProxyCandidate::new("a".into(), 1, ProxyType::Http, None);
        let b = ProxyCandidate::new("b".into(), 2, ProxyType::Http, None);
        let c = ProxyCandidate::new("c".into(), 3, ProxyType::Http, None);
        let results = vec![
            ProxyCheckResult::working(c.clone(), "t".into(), 1, 10),
            ProxyCheckResult::failed(b, "refused".into(), 3),
            ProxyCheckResult::working(a.clone(), "t".into(), 2, 10),
        ];
        assert_eq!(confirmed(results, 3).unwrap(), vec![c, a]);
    }

    #[tokio::test]
    async fn test_run_with_custom_verification_saves_in_reported_order() {
        let harvester = harvester(vec![("http://lists.test/text", "1.1.1.1:80\n2.2.2.2:3128\n3.3.3.3:8080")]);
        let mut sink = MemorySink::default();

        let summary = harvester
            .run_with(&["1"], &mut sink, |mut proxies| async move {
                proxies.sort_by(|a, b| b.host.cmp(&a.host));
                Ok(proxies
                    .into_iter()
                    .map(|proxy| ProxyCheckResult::working(proxy, "t".into(), 1, 5))
                    .collect())
            })
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { sources: 1, found: 3, working: 3 });
        let hosts: Vec<&str> = sink.proxies.iter().map(|p| p.host.as_str()).collect();
        assert_eq!(hosts, vec!["3.3.3.3", "2.2.2.2", "1.1.1.1"]);
    }

    #[tokio::test]
    async fn test_run_with_custom_verification_confirming_nothing() {
        let harvester = harvester(vec![("http://lists.test/text", "1.1.1.1:80\n2.2.2.2:3128")]);
        let mut sink = MemorySink::default();

        let err = harvester
            .run_with(&["1"], &mut sink, |proxies| async move {
                Ok(proxies
                    .into_iter()
                    .map(|proxy| ProxyCheckResult::timeout(proxy, 3))
                    .collect())
            })
            .await
            .unwrap_err();

        assert_eq!(
            pipeline_error(&err),
            Some(&PipelineError::NoWorkingProxies { tested: 2 })
        );
        assert_eq!(sink.saves, 0);
    }
}
