//! Proxy data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Country marker used when a source does not report one
pub const UNKNOWN_COUNTRY: &str = "??";

/// Proxy type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            other => Err(anyhow::anyhow!(
                "Invalid proxy type: {}. Use: http, https, socks4, socks5",
                other
            )),
        }
    }
}

/// A proxy endpoint extracted from a source, not yet verified.
///
/// Two candidates are the same only if host, port, scheme and country all
/// match, so the same address reported with a different scheme or country is
/// kept as a separate candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub country: String,
}

impl ProxyCandidate {
    /// Create a candidate; an empty country becomes [`UNKNOWN_COUNTRY`]
    pub fn new(host: String, port: u16, proxy_type: ProxyType, country: Option<String>) -> Self {
        let country = country
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

        Self {
            host,
            port,
            proxy_type,
            country,
        }
    }

    /// Get the proxy URL string
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type, self.host, self.port)
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Line written to the working proxy list: `scheme://host:port country`
    pub fn to_output_line(&self) -> String {
        format!("{} {}", self.url(), self.country)
    }

    /// Whether the source reported a country for this proxy
    pub fn has_country(&self) -> bool {
        self.country != UNKNOWN_COUNTRY
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Result of proxy check operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyCheckStatus {
    /// A test target answered with success through the proxy
    Working { target: String },
    /// Every test target failed; holds the last error seen
    Failed(String),
    /// Every test target failed and the last attempt timed out
    Timeout,
}

/// Detailed result of a proxy check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCheckResult {
    pub proxy: ProxyCandidate,
    pub status: ProxyCheckStatus,
    /// Number of test targets requested
    pub attempts: usize,
    pub response_time_ms: Option<u64>,
}

impl ProxyCheckResult {
    pub fn working(proxy: ProxyCandidate, target: String, attempts: usize, response_time_ms: u64) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Working { target },
            attempts,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn failed(proxy: ProxyCandidate, error: String, attempts: usize) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Failed(error),
            attempts,
            response_time_ms: None,
        }
    }

    pub fn timeout(proxy: ProxyCandidate, attempts: usize) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Timeout,
            attempts,
            response_time_ms: None,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self.status, ProxyCheckStatus::Working { .. })
    }

    pub fn into_outcome(self) -> VerificationOutcome {
        if self.is_working() {
            VerificationOutcome::Confirmed(self.proxy)
        } else {
            VerificationOutcome::Rejected
        }
    }
}

/// Per-candidate verdict handed from the verifier to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Confirmed(ProxyCandidate),
    Rejected,
}

impl VerificationOutcome {
    pub fn confirmed(self) -> Option<ProxyCandidate> {
        match self {
            VerificationOutcome::Confirmed(proxy) => Some(proxy),
            VerificationOutcome::Rejected => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(proxy_type: ProxyType, country: Option<&str>) -> ProxyCandidate {
        ProxyCandidate::new(
            "127.0.0.1".to_string(),
            8080,
            proxy_type,
            country.map(String::from),
        )
    }

    #[test]
    fn test_candidate_creation() {
        let proxy = candidate(ProxyType::Http, Some("US"));
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, 8080);
        assert_eq!(proxy.proxy_type, ProxyType::Http);
        assert_eq!(proxy.country, "US");
        assert!(proxy.has_country());
    }

    #[test]
    fn test_candidate_unknown_country() {
        assert_eq!(candidate(ProxyType::Http, None).country, UNKNOWN_COUNTRY);
        assert_eq!(candidate(ProxyType::Http, Some("  ")).country, UNKNOWN_COUNTRY);
        assert!(!candidate(ProxyType::Http, None).has_country());
    }

    #[test]
    fn test_candidate_url_and_output_line() {
        let proxy = candidate(ProxyType::Socks5, Some("DE"));
        assert_eq!(proxy.url(), "socks5://127.0.0.1:8080");
        assert_eq!(proxy.to_simple_string(), "127.0.0.1:8080");
        assert_eq!(proxy.to_output_line(), "socks5://127.0.0.1:8080 DE");
        assert_eq!(
            candidate(ProxyType::Http, None).to_output_line(),
            "http://127.0.0.1:8080 ??"
        );
    }

    #[test]
    fn test_identity_includes_scheme_and_country() {
        assert_ne!(
            candidate(ProxyType::Http, Some("US")),
            candidate(ProxyType::Https, Some("US"))
        );
        assert_ne!(
            candidate(ProxyType::Http, Some("US")),
            candidate(ProxyType::Http, Some("FR"))
        );
        assert_eq!(
            candidate(ProxyType::Http, Some("US")),
            candidate(ProxyType::Http, Some("US"))
        );
    }

    #[test]
    fn test_proxy_type_from_str() {
        assert_eq!("SOCKS5".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert_eq!(" https ".parse::<ProxyType>().unwrap(), ProxyType::Https);
        assert!("socks4a".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_proxy_check_result() {
        let proxy = candidate(ProxyType::Http, None);

        let result = ProxyCheckResult::working(proxy.clone(), "https://httpbin.org/ip".to_string(), 1, 100);
        assert!(result.is_working());
        assert_eq!(result.response_time_ms, Some(100));
        assert_eq!(result.into_outcome(), VerificationOutcome::Confirmed(proxy.clone()));

        let result = ProxyCheckResult::failed(proxy.clone(), "Connection refused".to_string(), 3);
        assert!(!result.is_working());
        assert_eq!(result.into_outcome(), VerificationOutcome::Rejected);

        let result = ProxyCheckResult::timeout(proxy, 3);
        assert!(!result.is_working());
        assert!(result.into_outcome().confirmed().is_none());
    }
}
