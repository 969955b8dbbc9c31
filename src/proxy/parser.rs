//! Proxy parser module for turning source responses into candidates
//!
//! One routine per [`FormatKind`]. Parsers never fail: entries that are
//! malformed or incomplete are skipped, so a bad response simply yields fewer
//! (or zero) candidates.

use crate::proxy::models::{ProxyCandidate, ProxyType};
use crate::proxy::sources::FormatKind;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// A plain-text line: exactly `host:port`
static HOST_PORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\s:]+):(\d{1,5})$").expect("Invalid host:port regex"));

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Invalid table selector"));
static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Invalid row selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Invalid cell selector"));

/// Column holding the "Https" yes/no flag in proxy list tables
const HTTPS_COLUMN: usize = 6;

/// JSON envelope returned by list APIs such as Geonode
#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<Value>,
    #[serde(default)]
    protocols: Option<Vec<String>>,
    #[serde(default)]
    country: Option<String>,
}

/// Proxy parser for the response formats of the known sources
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a response body with the parser matching `kind`
    pub fn parse(kind: FormatKind, body: &str) -> Vec<ProxyCandidate> {
        match kind {
            FormatKind::JsonList => Self::parse_json_list(body),
            FormatKind::PlainText { scheme } => Self::parse_plain_text(body, scheme),
            FormatKind::HtmlTable => Self::parse_html_table(body),
        }
    }

    /// Parse a JSON document of the form `{"data": [{ip, port, protocols, country}, ...]}`
    pub fn parse_json_list(body: &str) -> Vec<ProxyCandidate> {
        let envelope: JsonEnvelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Response is not a JSON proxy list: {}", e);
                return Vec::new();
            }
        };

        let Some(entries) = envelope.data else {
            warn!("JSON response has no 'data' field");
            return Vec::new();
        };

        entries
            .into_iter()
            .filter_map(|value| {
                let entry: JsonEntry = serde_json::from_value(value).ok()?;
                Self::candidate_from_json(entry)
            })
            .collect()
    }

    fn candidate_from_json(entry: JsonEntry) -> Option<ProxyCandidate> {
        let host = entry.ip.map(|ip| ip.trim().to_string()).filter(|ip| !ip.is_empty())?;
        let port = match entry.port? {
            Value::String(s) => parse_port(&s)?,
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()).filter(|p| *p != 0)?,
            _ => return None,
        };

        let proxy_type = match entry.protocols.as_deref().and_then(|p| p.first()) {
            Some(protocol) => match protocol.parse::<ProxyType>() {
                Ok(proxy_type) => proxy_type,
                Err(_) => {
                    debug!("Skipping {}:{} with unsupported protocol '{}'", host, port, protocol);
                    return None;
                }
            },
            None => ProxyType::Http,
        };

        Some(ProxyCandidate::new(host, port, proxy_type, entry.country))
    }

    /// Parse newline separated `host:port` pairs, all of the given scheme
    pub fn parse_plain_text(body: &str, scheme: ProxyType) -> Vec<ProxyCandidate> {
        body.lines()
            .filter_map(|line| Self::parse_line(line, scheme))
            .collect()
    }

    /// Parse a single `host:port` line
    pub fn parse_line(line: &str, scheme: ProxyType) -> Option<ProxyCandidate> {
        let caps = HOST_PORT_REGEX.captures(line.trim())?;
        let port = parse_port(&caps[2])?;
        Some(ProxyCandidate::new(caps[1].to_string(), port, scheme, None))
    }

    /// Parse the first table of an HTML proxy list page.
    ///
    /// The first row is the header. Column 0 is the host, 1 the port, 2 the
    /// country code and 6 the "Https" flag.
    pub fn parse_html_table(body: &str) -> Vec<ProxyCandidate> {
        let document = Html::parse_document(body);
        let Some(table) = document.select(&TABLE_SELECTOR).next() else {
            warn!("HTML response contains no table");
            return Vec::new();
        };

        let proxies: Vec<ProxyCandidate> = table
            .select(&ROW_SELECTOR)
            .skip(1)
            .filter_map(|row| {
                let cells: Vec<String> = row
                    .select(&CELL_SELECTOR)
                    .map(|cell| cell.text().collect::<String>().trim().to_string())
                    .collect();
                Self::candidate_from_cells(&cells)
            })
            .collect();
        proxies
    }

    fn candidate_from_cells(cells: &[String]) -> Option<ProxyCandidate> {
        if cells.len() < 2 || cells[0].is_empty() {
            return None;
        }
        let port = parse_port(&cells[1])?;
        let country = cells.get(2).cloned();
        let proxy_type = match cells.get(HTTPS_COLUMN) {
            Some(flag) if flag.eq_ignore_ascii_case("yes") => ProxyType::Https,
            _ => ProxyType::Http,
        };

        Some(ProxyCandidate::new(cells[0].clone(), port, proxy_type, country))
    }

    /// Parse a saved source response from a file
    pub fn parse_file<P: AsRef<Path>>(path: P, kind: FormatKind) -> Result<Vec<ProxyCandidate>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(kind, &content))
    }
}

/// Ports are kept as numbers, so "080" and "80" name the same candidate.
/// Zero and anything outside `u16` are dropped as malformed.
fn parse_port(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok().filter(|port| *port != 0)
}
