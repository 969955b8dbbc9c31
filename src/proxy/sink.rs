//! Persistence of confirmed proxies

use crate::proxy::models::ProxyCandidate;
use crate::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the final list of confirmed proxies.
///
/// Callers only hand over proxies that passed verification in the current
/// run, without duplicates.
pub trait ResultSink {
    fn save(&mut self, proxies: &[ProxyCandidate]) -> Result<()>;
}

/// File name for a run finished at `time`: `WorkingProxys_<YYYY-MM-DD_HH-MM-SS>.txt`
pub fn output_file_name(time: &DateTime<Local>) -> String {
    format!("WorkingProxys_{}.txt", time.format("%Y-%m-%d_%H-%M-%S"))
}

/// Render proxies as the output file body, one `scheme://host:port country` per line
pub fn render(proxies: &[ProxyCandidate]) -> String {
    proxies
        .iter()
        .map(|proxy| format!("{}\n", proxy.to_output_line()))
        .collect()
}

/// Writes each saved list to a new timestamped file in a directory
#[derive(Debug, Clone)]
pub struct TimestampedFileSink {
    dir: PathBuf,
    last_path: Option<PathBuf>,
}

impl TimestampedFileSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            last_path: None,
        }
    }

    /// Path of the most recently written file
    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }
}

impl ResultSink for TimestampedFileSink {
    fn save(&mut self, proxies: &[ProxyCandidate]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(output_file_name(&Local::now()));
        fs::write(&path, render(proxies))?;

        info!("{} working proxies saved in {}", proxies.len(), path.display());
        self.last_path = Some(path);
        Ok(())
    }
}

/// Keeps saved proxies in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub proxies: Vec<ProxyCandidate>,
    pub saves: usize,
}

impl ResultSink for MemorySink {
    fn save(&mut self, proxies: &[ProxyCandidate]) -> Result<()> {
        self.proxies.extend_from_slice(proxies);
        self.saves += 1;
        Ok(())
    }
}
