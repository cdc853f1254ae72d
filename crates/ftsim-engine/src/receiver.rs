//! Receiver state machine.
//!
//! ```text
//! Idle ─start─▶ Listening ─accept─▶ Accepted ─data─▶ Receiving
//!                                                       │
//!             size reached / peer closed / stop ────────┤
//!                                                       ▼
//!                                           Completed | Corrupted
//! ```
//!
//! Finalizing (latency, output file, verdict) happens exactly once; every
//! notification that arrives afterwards is ignored.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::BytesMut;
use ftsim_metrics::LatencyLog;
use ftsim_types::{ExpectedSize, TransferStart};
use serde::Serialize;

use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::protocol::DEFAULT_PORT;
use crate::transport::{ConnId, Host};

const COMPONENT: &str = "receiver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverState {
    Idle,
    Listening,
    Accepted,
    Receiving,
    Completed,
    Corrupted,
}

impl ReceiverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Corrupted)
    }
}

pub struct ReceiverConfig {
    pub port: u16,
    pub output_path: PathBuf,
    /// Where to accumulate the transfer latency. `None` skips it.
    pub latency_log: Option<LatencyLog>,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl ReceiverConfig {
    pub fn new(port: u16, output_path: impl Into<PathBuf>) -> Self {
        Self {
            port,
            output_path: output_path.into(),
            latency_log: None,
            logger: None,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, "received.bin")
    }
}

/// What the receiver ended up with.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverOutcome {
    pub state: ReceiverState,
    pub bytes_received: usize,
    pub expected: ExpectedSize,
    pub latency_secs: Option<f64>,
    pub output_written: bool,
}

pub struct Receiver {
    config: ReceiverConfig,
    transfer_start: TransferStart,
    expected: ExpectedSize,
    state: ReceiverState,
    listener: Option<ConnId>,
    active: Option<ConnId>,
    buffer: BytesMut,
    latency_secs: Option<f64>,
    output_written: bool,
}

impl Receiver {
    pub fn new(config: ReceiverConfig, transfer_start: TransferStart) -> Self {
        Self {
            config,
            transfer_start,
            expected: ExpectedSize::Unknown,
            state: ReceiverState::Idle,
            listener: None,
            active: None,
            buffer: BytesMut::new(),
            latency_secs: None,
            output_written: false,
        }
    }

    /// Record how many bytes complete the transfer. Call before any data
    /// arrives.
    pub fn set_expected_size(&mut self, expected: ExpectedSize) {
        self.expected = expected;
    }

    pub fn expected_size(&self) -> ExpectedSize {
        self.expected
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn received(&self) -> &[u8] {
        &self.buffer
    }

    pub fn active_connection(&self) -> Option<ConnId> {
        self.active
    }

    pub fn outcome(&self) -> ReceiverOutcome {
        ReceiverOutcome {
            state: self.state,
            bytes_received: self.buffer.len(),
            expected: self.expected,
            latency_secs: self.latency_secs,
            output_written: self.output_written,
        }
    }

    pub fn start(&mut self, host: &mut dyn Host) {
        if self.state != ReceiverState::Idle {
            return;
        }

        let port = self.config.port;
        let conn = host.create_connection();
        match host.listen(conn, port) {
            Ok(()) => {
                self.listener = Some(conn);
                self.state = ReceiverState::Listening;
                self.log(host, TransferEvent::Listening { port });
            }
            Err(e) => {
                host.close(conn);
                self.log(
                    host,
                    TransferEvent::ListenFailed {
                        port,
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    pub fn on_accepted(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.state.is_terminal() || self.active.is_some() {
            host.close(conn);
            self.log(host, TransferEvent::AcceptRefused { conn });
            return;
        }

        self.active = Some(conn);
        self.state = ReceiverState::Accepted;
        self.log(host, TransferEvent::Accepted { conn });
    }

    pub fn on_data_ready(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.state.is_terminal() || self.active != Some(conn) {
            return;
        }

        self.drain(host, conn);
        if self.expected.is_reached(self.buffer.len()) {
            self.finalize(host);
            host.stop();
        }
    }

    /// The sender closed its side; everything it sent has been delivered.
    pub fn on_peer_closed(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.state.is_terminal() || self.active != Some(conn) {
            return;
        }

        self.drain(host, conn);
        self.finalize(host);
        host.stop();
    }

    /// Manual or end-of-run teardown. Finalizes if that has not happened yet.
    pub fn stop(&mut self, host: &mut dyn Host) {
        if !self.state.is_terminal() {
            self.finalize(host);
        }
        self.close_connections(host);
    }

    fn drain(&mut self, host: &mut dyn Host, conn: ConnId) {
        let before = self.buffer.len();
        while let Some(chunk) = host.recv(conn) {
            self.buffer.extend_from_slice(&chunk);
        }

        if self.buffer.len() > before {
            self.state = ReceiverState::Receiving;
            let total = self.buffer.len();
            self.log(host, TransferEvent::BytesReceived { total });
        }
    }

    fn finalize(&mut self, host: &mut dyn Host) {
        let received = self.buffer.len();

        self.record_latency(host);
        self.write_output(host);

        if self.expected.matches(received) {
            self.state = ReceiverState::Completed;
            self.log(host, TransferEvent::ReceiveComplete { bytes: received });
        } else {
            self.state = ReceiverState::Corrupted;
            let expected = self.expected.bytes().unwrap_or_default();
            self.log(host, TransferEvent::Corrupted { received, expected });
        }

        self.close_connections(host);
    }

    fn record_latency(&mut self, host: &mut dyn Host) {
        let Some(started) = self.transfer_start.get() else {
            self.log(host, TransferEvent::LatencyUnavailable);
            return;
        };

        let elapsed_secs = host.now().saturating_since(started).as_secs_f64();
        self.latency_secs = Some(elapsed_secs);

        let total_secs = match &self.config.latency_log {
            Some(log) => match log.accumulate(elapsed_secs) {
                Ok(total) => Some(total),
                Err(e) => {
                    tracing::warn!("Latency not persisted: {}", e);
                    None
                }
            },
            None => None,
        };
        self.log(
            host,
            TransferEvent::LatencyRecorded {
                elapsed_secs,
                total_secs,
            },
        );
    }

    fn write_output(&mut self, host: &mut dyn Host) {
        let path = &self.config.output_path;
        match std::fs::write(path, &self.buffer) {
            Ok(()) => {
                self.output_written = true;
                let bytes = self.buffer.len();
                self.log(host, TransferEvent::OutputWritten { bytes });
            }
            Err(e) => {
                let message = format!("{}: {}", path.display(), e);
                self.log(host, TransferEvent::OutputFailed { message });
            }
        }
    }

    fn close_connections(&mut self, host: &mut dyn Host) {
        if let Some(conn) = self.active.take() {
            host.close(conn);
        }
        if let Some(conn) = self.listener.take() {
            host.close(conn);
        }
    }

    fn log(&self, host: &dyn Host, event: TransferEvent) {
        if let Some(ref logger) = self.config.logger {
            logger.log(TransferLog {
                component: COMPONENT,
                time: host.now(),
                event,
            });
        }
    }
}
