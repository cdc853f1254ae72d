use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MetricsError, Result};

/// Running total of transfer latencies, one float in a text file.
///
/// Each run adds its own latency to whatever the file already holds. The
/// read-modify-write is not atomic; one writer per run is assumed.
#[derive(Debug, Clone)]
pub struct LatencyLog {
    path: PathBuf,
}

impl LatencyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total recorded so far. A missing or unparseable file counts as zero.
    pub fn read_total(&self) -> f64 {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0.0,
            Err(e) => {
                warn!(path = %self.path.display(), "Cannot read latency log: {}", e);
                return 0.0;
            }
        };

        match text.split_whitespace().next().map(str::parse::<f64>) {
            Some(Ok(total)) if total.is_finite() => total,
            _ => {
                warn!(path = %self.path.display(), "Latency log is not a number, starting from 0");
                0.0
            }
        }
    }

    /// Add `latency_secs` to the stored total and return the new total.
    pub fn accumulate(&self, latency_secs: f64) -> Result<f64> {
        let total = self.read_total() + latency_secs;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MetricsError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, format!("{}\n", total)).map_err(|source| MetricsError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(latency_secs, total, "Cumulative latency updated");
        Ok(total)
    }
}
