//! Terminal failures of a harvesting run

/// Conditions that end a run without writing any output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// None of the requested source keys exist in the catalog
    #[error("Invalid source selection: {0}")]
    InvalidSelection(String),
    /// Every selected source failed or returned nothing
    #[error("No proxies found")]
    NoProxiesFound,
    /// Proxies were found but none passed verification
    #[error("No working proxies found (tested {tested})")]
    NoWorkingProxies { tested: usize },
}
