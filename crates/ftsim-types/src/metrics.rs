use std::fmt;
use std::net::SocketAddrV4;

use serde::{Deserialize, Serialize};

use crate::models::SimTime;

/// One link-layer receive observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    /// Seconds of virtual time.
    pub time: f64,
    pub rssi_dbm: f64,
    pub snr_db: f64,
}

impl ChannelSample {
    /// Build a sample from raw signal and noise levels (both dBm).
    pub fn from_signal_noise(time: SimTime, signal_dbm: f64, noise_dbm: f64) -> Self {
        Self {
            time: time.as_secs_f64(),
            rssi_dbm: signal_dbm,
            snr_db: signal_dbm - noise_dbm,
        }
    }
}

/// Formats as one channel-log line, without the trailing newline.
impl fmt::Display for ChannelSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},RSSI={},SNR={}", self.time, self.rssi_dbm, self.snr_db)
    }
}

/// Counters for one direction of traffic between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub flow_id: u32,
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
    pub first_tx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
}

impl FlowStats {
    pub fn new(flow_id: u32, source: SocketAddrV4, destination: SocketAddrV4) -> Self {
        Self {
            flow_id,
            source,
            destination,
            first_tx: None,
            last_rx: None,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_packets: 0,
            rx_packets: 0,
        }
    }

    /// Signed seconds between first transmit and last receive, if both exist.
    pub fn active_secs(&self) -> Option<f64> {
        let first = self.first_tx?;
        let last = self.last_rx?;
        Some(last.as_secs_f64() - first.as_secs_f64())
    }
}
