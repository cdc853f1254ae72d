//! Run telemetry sinks.
//!
//! - [`latency`]: cumulative transfer latency, accumulated across runs
//! - [`throughput`]: per-flow throughput report written at run end
//! - [`channel`]: append-only RSSI/SNR sample log fed by link events
//!
//! Every sink is best-effort: a failure to open or write a log is reported
//! to the caller (or logged) and never aborts the transfer.

pub mod channel;
pub mod error;
pub mod latency;
pub mod throughput;

pub use channel::{ChannelLog, parse_sample_line, read_last_sample};
pub use error::MetricsError;
pub use latency::LatencyLog;
pub use throughput::{FlowThroughput, ThroughputReport, throughput_mbps};

/// Default location of the cumulative latency record.
pub const DEFAULT_LATENCY_LOG: &str = "files/latency_transfer.log";

/// Default location of the channel sample log.
pub const DEFAULT_CHANNEL_LOG: &str = "files/channel_metrics.log";

/// Default location of the throughput report.
pub const DEFAULT_THROUGHPUT_LOG: &str = "files/throughput.log";
