//! Sender state machine.
//!
//! ```text
//! Idle ─start─▶ Connecting ─connected─▶ Sending ─drained─▶ Completed
//!                  ▲    │
//!            timer │    │ connect failed
//!                  │    ▼
//!              RetryScheduled ──policy exhausted──▶ Failed
//! ```
//!
//! The whole file is held in memory. Chunks go out strictly in file order
//! over a single connection; when the transport pushes back, the sender
//! waits for the next send-ready notification instead of polling.

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use ftsim_types::{ExpectedSize, TransferStart};
use serde::Serialize;

use crate::error::EngineError;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::protocol::MAX_CHUNK_SIZE;
use crate::retry::RetryPolicy;
use crate::transport::{ConnId, Host, TimerToken};

const COMPONENT: &str = "sender";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderState {
    Idle,
    Connecting,
    RetryScheduled,
    Sending,
    Completed,
    Failed,
}

pub struct SenderConfig {
    pub peer: SocketAddrV4,
    pub input_path: PathBuf,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl SenderConfig {
    pub fn new(peer: SocketAddrV4, input_path: impl Into<PathBuf>) -> Self {
        Self {
            peer,
            input_path: input_path.into(),
            chunk_size: MAX_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            logger: None,
        }
    }
}

/// What the sender ended up with.
#[derive(Debug, Clone, Serialize)]
pub struct SenderOutcome {
    pub state: SenderState,
    pub bytes_sent: usize,
    pub bytes_total: usize,
    pub attempts: u32,
    pub retries: u32,
}

pub struct Sender {
    config: SenderConfig,
    transfer_start: TransferStart,
    data: Bytes,
    cursor: usize,
    state: SenderState,
    conn: Option<ConnId>,
    pending_retry: Option<TimerToken>,
    next_token: u64,
    attempts: u32,
    retries: u32,
}

impl Sender {
    /// Read the input file into memory.
    pub fn load(config: SenderConfig, transfer_start: TransferStart) -> Result<Self, EngineError> {
        let data = std::fs::read(&config.input_path).map_err(|source| {
            EngineError::InputUnreadable {
                path: config.input_path.clone(),
                source,
            }
        })?;
        Self::from_bytes(config, Bytes::from(data), transfer_start)
    }

    /// Build a sender around data that is already in memory.
    pub fn from_bytes(
        config: SenderConfig,
        data: Bytes,
        transfer_start: TransferStart,
    ) -> Result<Self, EngineError> {
        if config.chunk_size == 0 || config.chunk_size > MAX_CHUNK_SIZE {
            return Err(EngineError::InvalidChunkSize(config.chunk_size));
        }

        if let Some(ref logger) = config.logger {
            logger.log(TransferLog {
                component: COMPONENT,
                time: Default::default(),
                event: TransferEvent::FileLoaded { bytes: data.len() },
            });
        }

        Ok(Self {
            config,
            transfer_start,
            data,
            cursor: 0,
            state: SenderState::Idle,
            conn: None,
            pending_retry: None,
            next_token: 0,
            attempts: 0,
            retries: 0,
        })
    }

    /// The exact size the receiver must be told before anything is sent.
    pub fn expected_size(&self) -> ExpectedSize {
        ExpectedSize::Exact(self.data.len() as u64)
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active_connection(&self) -> Option<ConnId> {
        self.conn
    }

    pub fn outcome(&self) -> SenderOutcome {
        SenderOutcome {
            state: self.state,
            bytes_sent: self.cursor,
            bytes_total: self.data.len(),
            attempts: self.attempts,
            retries: self.retries,
        }
    }

    pub fn start(&mut self, host: &mut dyn Host) {
        if self.state != SenderState::Idle {
            return;
        }
        self.connect(host);
    }

    pub fn on_connected(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.state != SenderState::Connecting || self.conn != Some(conn) {
            return;
        }

        self.transfer_start.mark(host.now());
        self.cursor = 0;
        self.state = SenderState::Sending;
        let attempt = self.attempts;
        self.log(host, TransferEvent::Connected { attempt });

        self.try_send(host);
    }

    pub fn on_connect_failed(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.state != SenderState::Connecting || self.conn != Some(conn) {
            return;
        }

        host.close(conn);
        self.conn = None;
        let attempt = self.attempts;
        self.log(host, TransferEvent::ConnectFailed { attempt });

        if !self.config.retry.allows(self.retries) {
            self.state = SenderState::Failed;
            self.log(host, TransferEvent::GaveUp { attempts: attempt });
            return;
        }

        self.retries += 1;
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let delay = self.config.retry.delay;
        host.schedule_after(delay, token);
        self.pending_retry = Some(token);
        self.state = SenderState::RetryScheduled;
        self.log(
            host,
            TransferEvent::RetryScheduled {
                retry: self.retries,
                delay_secs: delay.as_secs_f64(),
            },
        );
    }

    pub fn on_timer(&mut self, host: &mut dyn Host, token: TimerToken) {
        if self.state != SenderState::RetryScheduled || self.pending_retry != Some(token) {
            return;
        }
        self.pending_retry = None;
        self.connect(host);
    }

    pub fn on_send_ready(&mut self, host: &mut dyn Host, conn: ConnId) {
        if self.conn != Some(conn) {
            return;
        }
        self.try_send(host);
    }

    /// Push chunks until the file is drained or the transport pushes back.
    pub fn try_send(&mut self, host: &mut dyn Host) {
        if self.state != SenderState::Sending {
            return;
        }
        let Some(conn) = self.conn else {
            return;
        };

        while self.cursor < self.data.len() {
            let end = (self.cursor + self.config.chunk_size).min(self.data.len());
            let chunk = &self.data[self.cursor..end];
            match host.send(conn, chunk) {
                Ok(0) => {
                    let offset = self.cursor;
                    self.log(host, TransferEvent::Backpressure { offset });
                    return;
                }
                Ok(accepted) => {
                    let size = accepted.min(chunk.len());
                    let offset = self.cursor;
                    self.cursor += size;
                    self.log(host, TransferEvent::ChunkSent { offset, size });
                }
                Err(e) => {
                    tracing::debug!(conn = %conn, "Send refused, waiting for readiness: {}", e);
                    return;
                }
            }
        }

        self.state = SenderState::Completed;
        let bytes = self.cursor;
        self.log(host, TransferEvent::SendComplete { bytes });

        // Closing after the last chunk lets the receiver see end-of-stream.
        host.close(conn);
        self.conn = None;
    }

    /// Close the active connection, if any. Safe to call repeatedly.
    pub fn stop(&mut self, host: &mut dyn Host) {
        self.pending_retry = None;
        if let Some(conn) = self.conn.take() {
            host.close(conn);
        }
    }

    fn connect(&mut self, host: &mut dyn Host) {
        let conn = host.create_connection();
        self.conn = Some(conn);
        self.attempts += 1;
        self.state = SenderState::Connecting;
        let attempt = self.attempts;
        self.log(host, TransferEvent::Connecting { attempt });

        if let Err(e) = host.connect(conn, self.config.peer) {
            tracing::debug!(conn = %conn, "Connect rejected immediately: {}", e);
            self.on_connect_failed(host, conn);
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
