//! Per-direction traffic counters, one flow per (source, destination) pair
//! of socket addresses.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use ftsim_types::{FlowStats, SimTime};

#[derive(Default)]
pub struct FlowMonitor {
    index: HashMap<(SocketAddrV4, SocketAddrV4), usize>,
    flows: Vec<FlowStats>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A packet of `bytes` left `source` for `destination`. Returns the flow id.
    pub fn record_tx(
        &mut self,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        at: SimTime,
        bytes: usize,
    ) -> u32 {
        let flow = self.flow_mut(source, destination);
        flow.first_tx.get_or_insert(at);
        flow.tx_bytes += bytes as u64;
        flow.tx_packets += 1;
        flow.flow_id
    }

    pub fn record_rx(
        &mut self,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        at: SimTime,
        bytes: usize,
    ) {
        let flow = self.flow_mut(source, destination);
        flow.last_rx = Some(at);
        flow.rx_bytes += bytes as u64;
        flow.rx_packets += 1;
    }

    /// Flows in id order.
    pub fn flows(&self) -> &[FlowStats] {
        &self.flows
    }

    fn flow_mut(&mut self, source: SocketAddrV4, destination: SocketAddrV4) -> &mut FlowStats {
        let next_id = self.flows.len();
        let idx = *self.index.entry((source, destination)).or_insert(next_id);
        if idx == self.flows.len() {
            self.flows
                .push(FlowStats::new(idx as u32 + 1, source, destination));
        }
        &mut self.flows[idx]
    }
}
