//! What the engine needs from its environment.
//!
//! A host implements [`Transport`] (a reliable, ordered byte stream) and
//! [`Clock`] (virtual time plus one-shot timers). Notifications flow the
//! other way: the host calls the state machines' `on_*` methods, passing
//! itself as `&mut dyn Host` so handlers can act immediately.

use std::fmt;
use std::net::SocketAddrV4;
use std::time::Duration;

use ftsim_types::SimTime;
use serde::Serialize;

use crate::error::TransportError;

/// Opaque connection handle issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a timer armed with [`Clock::schedule_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

pub trait Transport {
    /// Allocate a fresh, unbound connection.
    fn create_connection(&mut self) -> ConnId;

    /// Bind `conn` to `port` and accept inbound connections on it.
    fn listen(&mut self, conn: ConnId, port: u16) -> Result<(), TransportError>;

    /// Start connecting; the outcome arrives later as a connected or
    /// connect-failed notification.
    fn connect(&mut self, conn: ConnId, peer: SocketAddrV4) -> Result<(), TransportError>;

    /// Queue bytes for delivery. Returns how many were accepted; `Ok(0)`
    /// means the send buffer is full and a send-ready notification follows
    /// once space frees up.
    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<usize, TransportError>;

    /// Next run of received bytes, `None` when nothing is buffered.
    fn recv(&mut self, conn: ConnId) -> Option<bytes::Bytes>;

    /// Close `conn`. Bytes already accepted by `send` are still delivered
    /// before the peer sees the close. Closing twice is harmless.
    fn close(&mut self, conn: ConnId);
}

pub trait Clock {
    fn now(&self) -> SimTime;

    /// Fire a timer notification carrying `token` after `delay`.
    fn schedule_after(&mut self, delay: Duration, token: TimerToken);

    /// Ask the host to end the run. Already-queued notifications may still
    /// be delivered.
    fn stop(&mut self);
}

/// Everything a state machine handler can call back into.
pub trait Host: Transport + Clock {}

impl<T: Transport + Clock + ?Sized> Host for T {}
