//! Scripted host for driving the state machines by hand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use ftsim_engine::{
    Clock, ConnId, TimerToken, TransferEvent, TransferLog, TransferLogger, Transport,
    TransportError,
};
use ftsim_types::SimTime;

pub fn peer() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9000)
}

/// Bytes with a recognisable pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct FakeHost {
    pub now: SimTime,
    next_conn: u64,
    pub created: Vec<ConnId>,
    pub listening: Vec<(ConnId, u16)>,
    pub connects: Vec<(ConnId, SocketAddrV4)>,
    pub closed: Vec<ConnId>,
    closed_set: HashSet<ConnId>,
    /// Sizes accepted by successful `send` calls, in order.
    pub chunks: Vec<usize>,
    pub sent: Vec<u8>,
    /// Bytes the transport will still accept; `None` means unlimited.
    pub send_budget: Option<usize>,
    pub inbound: HashMap<ConnId, VecDeque<Bytes>>,
    pub timers: Vec<(SimTime, Duration, TimerToken)>,
    pub stop_requests: usize,
    pub listen_error: Option<TransportError>,
    pub connect_error: Option<TransportError>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(secs: u64) -> Self {
        Self {
            now: SimTime::from_secs(secs),
            ..Self::default()
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now = self.now + by;
    }

    pub fn push_inbound(&mut self, conn: ConnId, data: &[u8]) {
        self.inbound
            .entry(conn)
            .or_default()
            .push_back(Bytes::copy_from_slice(data));
    }

    pub fn is_closed(&self, conn: ConnId) -> bool {
        self.closed_set.contains(&conn)
    }

    pub fn last_timer(&self) -> TimerToken {
        self.timers.last().expect("no timer armed").2
    }

    /// Connection id the next `create_connection` call will return.
    pub fn peek_next_conn(&self) -> ConnId {
        ConnId(self.next_conn + 1)
    }
}

impl Transport for FakeHost {
    fn create_connection(&mut self) -> ConnId {
        self.next_conn += 1;
        let conn = ConnId(self.next_conn);
        self.created.push(conn);
        conn
    }

    fn listen(&mut self, conn: ConnId, port: u16) -> Result<(), TransportError> {
        if let Some(e) = self.listen_error.clone() {
            return Err(e);
        }
        self.listening.push((conn, port));
        Ok(())
    }

    fn connect(&mut self, conn: ConnId, peer: SocketAddrV4) -> Result<(), TransportError> {
        self.connects.push((conn, peer));
        match self.connect_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed(conn) {
            return Err(TransportError::Closed(conn));
        }
        let accepted = match self.send_budget {
            Some(budget) => {
                let n = budget.min(data.len());
                self.send_budget = Some(budget - n);
                n
            }
            None => data.len(),
        };
        if accepted > 0 {
            self.chunks.push(accepted);
            self.sent.extend_from_slice(&data[..accepted]);
        }
        Ok(accepted)
    }

    fn recv(&mut self, conn: ConnId) -> Option<Bytes> {
        self.inbound.get_mut(&conn)?.pop_front()
    }

    fn close(&mut self, conn: ConnId) {
        if self.closed_set.insert(conn) {
            self.closed.push(conn);
        }
    }
}

impl Clock for FakeHost {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, token: TimerToken) {
        self.timers.push((self.now, delay, token));
    }

    fn stop(&mut self) {
        self.stop_requests += 1;
    }
}

/// Logger that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<TransferEvent>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TransferLogger for RecordingLogger {
    fn log(&self, entry: TransferLog) {
        self.events.lock().unwrap().push(entry.event);
    }
}
