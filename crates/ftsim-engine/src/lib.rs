//! File-transfer protocol engine.
//!
//! ```text
//!   Sender                                   Receiver
//!   load file ── set_expected_size ────────▶ (knows total)
//!   connect ──┐                              listen
//!     fail ───┴─ retry after delay           │
//!   connected ── stamp TransferStart         accepted
//!   try_send: ≤1024-byte chunks ───────────▶ data_ready: append
//!     backpressure ─ wait for send_ready     size reached / peer closed
//!   drained ── close                         finalize: latency, write, verdict
//! ```
//!
//! The engine owns no sockets and no clock. Both state machines are driven
//! by a host implementing [`Transport`] and [`Clock`], which calls their
//! `on_*` handlers when notifications arrive.

pub mod error;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod transport;

pub use error::{EngineError, TransportError};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use protocol::{DEFAULT_PORT, DEFAULT_RETRY_DELAY, MAX_CHUNK_SIZE};
pub use receiver::{Receiver, ReceiverConfig, ReceiverOutcome, ReceiverState};
pub use retry::RetryPolicy;
pub use sender::{Sender, SenderConfig, SenderOutcome, SenderState};
pub use transport::{Clock, ConnId, Host, TimerToken, Transport};
