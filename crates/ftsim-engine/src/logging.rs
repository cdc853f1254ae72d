//! Structured transfer logging.
//!
//! The sender and receiver report lifecycle events through a
//! [`TransferLogger`]; the binary plugs in [`TracingLogger`], tests can
//! capture events or discard them with [`NullLogger`].

use std::fmt;

use ftsim_types::SimTime;

use crate::transport::ConnId;

/// Structured log entry for one transfer event.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub time: SimTime,
    pub event: TransferEvent,
}

/// Events the state machines emit.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Receiver: bound and listening
    Listening { port: u16 },
    /// Receiver: could not bind
    ListenFailed { port: u16, message: String },
    /// Receiver: inbound connection adopted
    Accepted { conn: ConnId },
    /// Receiver: extra inbound connection closed
    AcceptRefused { conn: ConnId },
    /// Receiver: buffer grew
    BytesReceived { total: usize },
    /// Receiver: buffer written to the output file
    OutputWritten { bytes: usize },
    /// Receiver: output file could not be written
    OutputFailed { message: String },
    /// Receiver: latency added to the cumulative record
    LatencyRecorded { elapsed_secs: f64, total_secs: Option<f64> },
    /// Receiver: transfer start was never stamped
    LatencyUnavailable,
    /// Receiver: finished with the expected byte count
    ReceiveComplete { bytes: usize },
    /// Receiver: finished with the wrong byte count
    Corrupted { received: usize, expected: u64 },
    /// Sender: input loaded into memory
    FileLoaded { bytes: usize },
    /// Sender: connect attempt started
    Connecting { attempt: u32 },
    /// Sender: connection established
    Connected { attempt: u32 },
    /// Sender: connect attempt failed
    ConnectFailed { attempt: u32 },
    /// Sender: retry timer armed
    RetryScheduled { retry: u32, delay_secs: f64 },
    /// Sender: retry policy exhausted
    GaveUp { attempts: u32 },
    /// Sender: chunk accepted by the transport
    ChunkSent { offset: usize, size: usize },
    /// Sender: transport refused more data
    Backpressure { offset: usize },
    /// Sender: every byte handed to the transport
    SendComplete { bytes: usize },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening { port } => write!(f, "listening port={}", port),
            Self::ListenFailed { port, message } => {
                write!(f, "listen_failed port={} error={}", port, message)
            }
            Self::Accepted { conn } => write!(f, "accepted conn={}", conn),
            Self::AcceptRefused { conn } => write!(f, "accept_refused conn={}", conn),
            Self::BytesReceived { total } => write!(f, "bytes_received total={}", total),
            Self::OutputWritten { bytes } => write!(f, "output_written bytes={}", bytes),
            Self::OutputFailed { message } => write!(f, "output_failed error={}", message),
            Self::LatencyRecorded { elapsed_secs, total_secs } => match total_secs {
                Some(total) => write!(
                    f,
                    "latency_recorded elapsed={:.6}s total={:.6}s",
                    elapsed_secs, total
                ),
                None => write!(f, "latency_measured elapsed={:.6}s (not persisted)", elapsed_secs),
            },
            Self::LatencyUnavailable => write!(f, "latency_unavailable (transfer never started)"),
            Self::ReceiveComplete { bytes } => write!(f, "receive_complete bytes={}", bytes),
            Self::Corrupted { received, expected } => write!(
                f,
                "corrupted received={} expected={} (data damaged)",
                received, expected
            ),
            Self::FileLoaded { bytes } => write!(f, "file_loaded bytes={}", bytes),
            Self::Connecting { attempt } => write!(f, "connecting attempt={}", attempt),
            Self::Connected { attempt } => write!(f, "connected attempt={}", attempt),
            Self::ConnectFailed { attempt } => write!(f, "connect_failed attempt={}", attempt),
            Self::RetryScheduled { retry, delay_secs } => {
                write!(f, "retry_scheduled retry={} delay={}s", retry, delay_secs)
            }
            Self::GaveUp { attempts } => write!(f, "gave_up attempts={}", attempts),
            Self::ChunkSent { offset, size } => {
                write!(f, "chunk_sent offset={} size={}", offset, size)
            }
            Self::Backpressure { offset } => write!(f, "backpressure offset={}", offset),
            Self::SendComplete { bytes } => write!(f, "send_complete bytes={}", bytes),
        }
    }
}

/// Sink for [`TransferLog`] entries.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let t = entry.time.as_secs_f64();
        match &entry.event {
            // Per-chunk spam
            TransferEvent::BytesReceived { .. }
            | TransferEvent::ChunkSent { .. }
            | TransferEvent::Backpressure { .. } => {
                tracing::debug!(component = entry.component, t, "{}", entry.event);
            }
            TransferEvent::ListenFailed { .. }
            | TransferEvent::AcceptRefused { .. }
            | TransferEvent::OutputFailed { .. }
            | TransferEvent::LatencyUnavailable
            | TransferEvent::Corrupted { .. }
            | TransferEvent::ConnectFailed { .. }
            | TransferEvent::GaveUp { .. } => {
                tracing::warn!(component = entry.component, t, "{}", entry.event);
            }
            _ => {
                tracing::info!(component = entry.component, t, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
