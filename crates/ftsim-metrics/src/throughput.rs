use std::fmt;
use std::fs;
use std::path::Path;

use ftsim_types::FlowStats;
use serde::Serialize;
use tracing::warn;

use crate::error::{MetricsError, Result};

/// Throughput of one flow in Mbps.
///
/// `None` when the flow has no usable time window (missing timestamps or
/// `last_rx <= first_tx`), so callers never see NaN or infinity.
pub fn throughput_mbps(flow: &FlowStats) -> Option<f64> {
    let duration = flow.active_secs()?;
    if duration <= 0.0 {
        return None;
    }
    let mbps = flow.rx_bytes as f64 * 8.0 / duration / 1e6;
    mbps.is_finite().then_some(mbps)
}

/// One line of the throughput report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowThroughput {
    pub flow_id: u32,
    pub source: String,
    pub destination: String,
    pub rx_bytes: u64,
    /// `None` if the flow had no measurable duration.
    pub mbps: Option<f64>,
}

/// `FlowID: <id>, Throughput: <mbps> Mbps`. Degenerate flows print `0`.
impl fmt::Display for FlowThroughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowID: {}, Throughput: {} Mbps",
            self.flow_id,
            self.mbps.unwrap_or(0.0)
        )
    }
}

/// Per-flow throughput computed once at the end of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThroughputReport {
    pub flows: Vec<FlowThroughput>,
}

impl ThroughputReport {
    pub fn from_flows<'a>(flows: impl IntoIterator<Item = &'a FlowStats>) -> Self {
        let flows = flows
            .into_iter()
            .map(|flow| {
                let mbps = throughput_mbps(flow);
                if mbps.is_none() {
                    warn!(
                        flow_id = flow.flow_id,
                        rx_bytes = flow.rx_bytes,
                        "Flow has no measurable duration, reporting 0 Mbps"
                    );
                }
                FlowThroughput {
                    flow_id: flow.flow_id,
                    source: flow.source.to_string(),
                    destination: flow.destination.to_string(),
                    rx_bytes: flow.rx_bytes,
                    mbps,
                }
            })
            .collect();
        Self { flows }
    }

    /// Overwrite `path` with one line per flow.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for flow in &self.flows {
            out.push_str(&flow.to_string());
            out.push('\n');
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MetricsError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, out).map_err(|source| MetricsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
