//! Catalog of public proxy list sources

use crate::error::PipelineError;
use crate::proxy::models::ProxyType;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Response shape of a proxy source, selecting the parser that applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// JSON envelope with a `data` list of entries
    JsonList,
    /// Newline separated `host:port` pairs, all of the given scheme
    PlainText { scheme: ProxyType },
    /// HTML page whose first table lists one proxy per row
    HtmlTable,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::JsonList => write!(f, "json"),
            FormatKind::PlainText { scheme } => write!(f, "text ({})", scheme),
            FormatKind::HtmlTable => write!(f, "html"),
        }
    }
}

/// Proxy source representing a website that provides proxy lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    /// Short key used to select the source
    pub key: String,
    /// Name of the proxy source
    pub name: String,
    /// URL to fetch proxies from
    pub url: String,
    pub format: FormatKind,
}

impl ProxySource {
    pub fn new(key: &str, name: &str, url: &str, format: FormatKind) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            format,
        }
    }
}

/// Immutable catalog of proxy sources, in key order
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<ProxySource>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<ProxySource>) -> Self {
        Self { sources }
    }

    /// The built-in catalog of free proxy list sources
    pub fn builtin() -> Self {
        let text = |scheme| FormatKind::PlainText { scheme };

        Self::new(vec![
            ProxySource::new(
                "1",
                "Free Proxy List",
                "https://free-proxy-list.net/",
                FormatKind::HtmlTable,
            ),
            ProxySource::new(
                "2",
                "SSL Proxies",
                "https://www.sslproxies.org/",
                FormatKind::HtmlTable,
            ),
            ProxySource::new(
                "3",
                "Proxy List Download (HTTP)",
                "https://www.proxy-list.download/api/v1/get?type=http",
                text(ProxyType::Http),
            ),
            ProxySource::new(
                "4",
                "Proxy List Download (HTTPS)",
                "https://www.proxy-list.download/api/v1/get?type=https",
                text(ProxyType::Https),
            ),
            ProxySource::new(
                "5",
                "Proxy List Download (SOCKS4)",
                "https://www.proxy-list.download/api/v1/get?type=socks4",
                text(ProxyType::Socks4),
            ),
            ProxySource::new(
                "6",
                "Proxy List Download (SOCKS5)",
                "https://www.proxy-list.download/api/v1/get?type=socks5",
                text(ProxyType::Socks5),
            ),
            ProxySource::new(
                "7",
                "Proxyscrape (HTTP)",
                "https://api.proxyscrape.com/?request=getproxies&proxytype=http",
                text(ProxyType::Http),
            ),
            ProxySource::new(
                "8",
                "Proxyscrape (SOCKS4)",
                "https://api.proxyscrape.com/?request=getproxies&proxytype=socks4",
                text(ProxyType::Socks4),
            ),
            ProxySource::new(
                "9",
                "Proxyscrape (SOCKS5)",
                "https://api.proxyscrape.com/?request=getproxies&proxytype=socks5",
                text(ProxyType::Socks5),
            ),
            ProxySource::new(
                "10",
                "Geonode Proxies",
                "https://proxylist.geonode.com/api/proxy-list?limit=500&page=1&sort_by=lastChecked&sort_type=desc",
                FormatKind::JsonList,
            ),
        ])
    }

    pub fn sources(&self) -> &[ProxySource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Look up a source by key
    pub fn get(&self, key: &str) -> Option<&ProxySource> {
        self.sources.iter().find(|source| source.key == key)
    }

    /// Every source in the catalog
    pub fn all(&self) -> Vec<ProxySource> {
        self.sources.clone()
    }

    /// Resolve operator-chosen keys to sources.
    ///
    /// Unknown keys are skipped with a warning and repeated keys count once.
    /// Fails when nothing valid remains.
    pub fn select<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<ProxySource>, PipelineError> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() || !seen.insert(key.to_string()) {
                continue;
            }
            match self.get(key) {
                Some(source) => selected.push(source.clone()),
                None => warn!("Unknown source key '{}', skipping", key),
            }
        }

        if selected.is_empty() {
            let requested: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
            return Err(PipelineError::InvalidSelection(format!(
                "no known source among [{}]",
                requested.join(", ")
            )));
        }

        Ok(selected)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
