//! Two-node wireless network carrying a reliable byte-stream transport.
//!
//! Every frame occupies the shared medium for its airtime, then arrives
//! after the propagation delay. The radio model decides whether it was
//! decoded; undecoded frames are sent again after [`LINK_RETRY_DELAY`], so
//! the transport above never loses data. Because a retransmitted frame can
//! land after frames queued behind it, data segments carry a sequence
//! number and the receiving side reorders them.
//!
//! Notifications for the applications are queued on the scheduler at the
//! current instant rather than delivered inline, so an application is never
//! re-entered while it is calling into the transport.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use bytes::Bytes;
use ftsim_engine::{Clock, ConnId, TimerToken, Transport, TransportError};
use ftsim_types::{FlowStats, SimTime};
use serde::Serialize;
use tracing::{debug, trace};

use crate::flow::FlowMonitor;
use crate::radio::RadioModel;
use crate::scheduler::Scheduler;

pub const SENDER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);
pub const RECEIVER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 2);

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
pub const DEFAULT_SEND_BUFFER: usize = 128 * 1024;
pub const LINK_RETRY_DELAY: Duration = Duration::from_millis(2);
/// IPv4 + TCP headers, counted by the flow monitor.
pub const IP_TCP_HEADER_BYTES: usize = 40;
/// 802.11 MAC header, LLC/SNAP and FCS.
pub const MAC_OVERHEAD_BYTES: usize = 36;
pub const PHY_PREAMBLE: Duration = Duration::from_micros(20);

const FIRST_EPHEMERAL_PORT: u16 = 49153;

/// The two applications, one per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppId {
    Sender,
    Receiver,
}

impl AppId {
    pub fn address(self) -> Ipv4Addr {
        match self {
            Self::Sender => SENDER_ADDR,
            Self::Receiver => RECEIVER_ADDR,
        }
    }

    fn at(ip: Ipv4Addr) -> Option<Self> {
        match ip {
            SENDER_ADDR => Some(Self::Sender),
            RECEIVER_ADDR => Some(Self::Receiver),
            _ => None,
        }
    }
}

/// Readiness notifications the host forwards to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Accepted(ConnId),
    Connected(ConnId),
    ConnectFailed(ConnId),
    SendReady(ConnId),
    DataReady(ConnId),
    PeerClosed(ConnId),
}

#[derive(Debug, Clone)]
pub enum Segment {
    Syn { initiator: ConnId },
    SynAck { acceptor: ConnId },
    Rst,
    Data { seq: u64, payload: Bytes },
    Ack { len: usize },
    Fin { seq: u64 },
}

impl Segment {
    fn payload_len(&self) -> usize {
        match self {
            Self::Data { payload, .. } => payload.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    /// Connection the frame is addressed to; `None` for a SYN, which is
    /// dispatched by port.
    pub to: Option<ConnId>,
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
    pub segment: Segment,
}

impl Frame {
    /// Size at the IP layer.
    pub fn ip_bytes(&self) -> usize {
        IP_TCP_HEADER_BYTES + self.segment.payload_len()
    }
}

#[derive(Debug)]
pub enum SimEvent {
    Start(AppId),
    Timer { app: AppId, token: TimerToken },
    Arrival(Frame),
    Retransmit(Frame),
    Notify { app: AppId, notice: Notice },
}

/// A frame decoded by a node's radio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhyRxEvent {
    pub time: SimTime,
    pub receiver: Ipv4Addr,
    pub signal_dbm: f64,
    pub noise_dbm: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_lost: u64,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub distance: f64,
    pub rate_bps: f64,
    pub packet_size: usize,
    pub send_buffer: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            distance: 30.0,
            rate_bps: 54.0e6,
            packet_size: 512,
            send_buffer: DEFAULT_SEND_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Fresh,
    Listening,
    SynSent,
    Established,
    Closed,
}

struct Conn {
    owner: AppId,
    state: ConnState,
    /// The application closed its handle; nothing more is reported to it.
    app_closed: bool,
    local: Option<SocketAddrV4>,
    remote: Option<SocketAddrV4>,
    peer: Option<ConnId>,

    next_seq: u64,
    in_flight: usize,
    want_send_ready: bool,
    fin_sent: bool,

    expected_seq: u64,
    reorder: BTreeMap<u64, Bytes>,
    peer_fin: Option<u64>,
    peer_closed: bool,
    inbox: VecDeque<Bytes>,
}

impl Conn {
    fn new(owner: AppId) -> Self {
        Self {
            owner,
            state: ConnState::Fresh,
            app_closed: false,
            local: None,
            remote: None,
            peer: None,
            next_seq: 0,
            in_flight: 0,
            want_send_ready: false,
            fin_sent: false,
            expected_seq: 0,
            reorder: BTreeMap::new(),
            peer_fin: None,
            peer_closed: false,
            inbox: VecDeque::new(),
        }
    }

    fn endpoints(&self) -> Option<(SocketAddrV4, SocketAddrV4)> {
        Some((self.local?, self.remote?))
    }
}

pub struct Network {
    config: NetworkConfig,
    radio: RadioModel,
    propagation: Duration,
    busy_until: SimTime,
    conns: HashMap<ConnId, Conn>,
    listeners: HashMap<SocketAddrV4, ConnId>,
    next_conn: u64,
    next_port: u16,
    flows: FlowMonitor,
    sniffers: Vec<Box<dyn FnMut(&PhyRxEvent)>>,
    stats: LinkStats,
}

impl Network {
    pub fn new(config: NetworkConfig, radio: RadioModel) -> Self {
        let propagation =
            Duration::try_from_secs_f64(config.distance / SPEED_OF_LIGHT).unwrap_or_default();
        Self {
            config,
            radio,
            propagation,
            busy_until: SimTime::ZERO,
            conns: HashMap::new(),
            listeners: HashMap::new(),
            next_conn: 0,
            next_port: FIRST_EPHEMERAL_PORT,
            flows: FlowMonitor::new(),
            sniffers: Vec::new(),
            stats: LinkStats::default(),
        }
    }

    /// Register a callback for every decoded frame on either node.
    pub fn add_sniffer(&mut self, sniffer: impl FnMut(&PhyRxEvent) + 'static) {
        self.sniffers.push(Box::new(sniffer));
    }

    pub fn flows(&self) -> &[FlowStats] {
        self.flows.flows()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn propagation_delay(&self) -> Duration {
        self.propagation
    }

    /// Handle a network-internal event. Application events are left to the
    /// caller.
    pub fn handle(&mut self, sched: &mut Scheduler<SimEvent>, event: SimEvent) -> Option<SimEvent> {
        match event {
            SimEvent::Arrival(frame) => {
                self.on_arrival(sched, frame);
                None
            }
            SimEvent::Retransmit(frame) => {
                self.transmit(sched, frame, false);
                None
            }
            other => Some(other),
        }
    }

    /// Time on air for a frame carrying `ip_bytes`.
    pub fn airtime(&self, ip_bytes: usize) -> Duration {
        let bits = ((ip_bytes + MAC_OVERHEAD_BYTES) * 8) as f64;
        let nanos = (bits / self.config.rate_bps * 1e9).round() as u64;
        PHY_PREAMBLE + Duration::from_nanos(nanos)
    }

    fn transmit(&mut self, sched: &mut Scheduler<SimEvent>, frame: Frame, first: bool) {
        let now = sched.now();
        if first {
            self.flows
                .record_tx(frame.source, frame.destination, now, frame.ip_bytes());
        }
        self.stats.frames_sent += 1;

        let start = self.busy_until.max(now);
        self.busy_until = start + self.airtime(frame.ip_bytes());
        let arrival = self.busy_until + self.propagation;
        trace!(segment = ?frame.segment, t = %now, arrives = %arrival, "Frame queued");
        sched.schedule_at(arrival, SimEvent::Arrival(frame));
    }

    fn on_arrival(&mut self, sched: &mut Scheduler<SimEvent>, frame: Frame) {
        let rx = self.radio.sample();
        if !rx.decoded {
            self.stats.frames_lost += 1;
            trace!(
                signal = rx.signal_dbm,
                snr = rx.snr_db(),
                "Frame lost, link will retransmit"
            );
            sched.schedule_after(LINK_RETRY_DELAY, SimEvent::Retransmit(frame));
            return;
        }

        self.stats.frames_delivered += 1;
        let now = sched.now();
        let event = PhyRxEvent {
            time: now,
            receiver: *frame.destination.ip(),
            signal_dbm: rx.signal_dbm,
            noise_dbm: rx.noise_dbm,
        };
        for sniffer in &mut self.sniffers {
            sniffer(&event);
        }
        self.flows
            .record_rx(frame.source, frame.destination, now, frame.ip_bytes());

        self.deliver(sched, frame);
    }

    fn deliver(&mut self, sched: &mut Scheduler<SimEvent>, frame: Frame) {
        let Frame {
            to,
            source,
            destination,
            segment,
        } = frame;

        match (segment, to) {
            (Segment::Syn { initiator }, _) => self.on_syn(sched, initiator, source, destination),
            (_, None) => {}
            (Segment::SynAck { acceptor }, Some(conn)) => self.on_syn_ack(sched, conn, acceptor),
            (Segment::Rst, Some(conn)) => self.on_rst(sched, conn),
            (Segment::Data { seq, payload }, Some(conn)) => {
                self.on_data(sched, conn, seq, payload, destination, source)
            }
            (Segment::Ack { len }, Some(conn)) => self.on_ack(sched, conn, len),
            (Segment::Fin { seq }, Some(conn)) => {
                if let Some(c) = self.conns.get_mut(&conn) {
                    c.peer_fin = Some(seq);
                }
                self.check_peer_closed(sched, conn);
            }
        }
    }

    fn on_syn(
        &mut self,
        sched: &mut Scheduler<SimEvent>,
        initiator: ConnId,
        source: SocketAddrV4,
        destination: SocketAddrV4,
    ) {
        let listener = self
            .listeners
            .get(&destination)
            .and_then(|id| self.conns.get(id))
            .map(|l| l.owner);

        let Some(owner) = listener else {
            debug!(%destination, "No listener, refusing connection");
            self.reply(sched, Some(initiator), destination, source, Segment::Rst);
            return;
        };

        let child = self.alloc_conn(owner);
        if let Some(conn) = self.conns.get_mut(&child) {
            conn.state = ConnState::Established;
            conn.local = Some(destination);
            conn.remote = Some(source);
            conn.peer = Some(initiator);
        }
        debug!(conn = %child, peer = %source, "Connection accepted");
        notify(sched, owner, Notice::Accepted(child));
        self.reply(
            sched,
            Some(initiator),
            destination,
            source,
            Segment::SynAck { acceptor: child },
        );
    }

    fn on_syn_ack(&mut self, sched: &mut Scheduler<SimEvent>, conn_id: ConnId, acceptor: ConnId) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if conn.state != ConnState::SynSent {
            return;
        }
        conn.state = ConnState::Established;
        conn.peer = Some(acceptor);
        debug!(conn = %conn_id, "Connection established");
        let owner = conn.owner;
        notify(sched, owner, Notice::Connected(conn_id));
    }

    fn on_rst(&mut self, sched: &mut Scheduler<SimEvent>, conn_id: ConnId) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        let owner = conn.owner;
        match conn.state {
            ConnState::SynSent => {
                conn.state = ConnState::Closed;
                if !conn.app_closed {
                    notify(sched, owner, Notice::ConnectFailed(conn_id));
                }
            }
            ConnState::Established if !conn.peer_closed => {
                conn.peer_closed = true;
                if !conn.app_closed {
                    notify(sched, owner, Notice::PeerClosed(conn_id));
                }
            }
            _ => {}
        }
    }

    fn on_data(
        &mut self,
        sched: &mut Scheduler<SimEvent>,
        conn_id: ConnId,
        seq: u64,
        payload: Bytes,
        local: SocketAddrV4,
        remote: SocketAddrV4,
    ) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        let peer = conn.peer;
        let len = payload.len();

        let mut delivered = false;
        if !conn.app_closed && seq >= conn.expected_seq {
            conn.reorder.insert(seq, payload);
            while let Some(next) = conn.reorder.remove(&conn.expected_seq) {
                conn.expected_seq += next.len() as u64;
                conn.inbox.push_back(next);
                delivered = true;
            }
        }
        let owner = conn.owner;

        // Acknowledge even if the application has gone, so the peer's
        // buffer drains.
        self.reply(sched, peer, local, remote, Segment::Ack { len });

        if delivered {
            notify(sched, owner, Notice::DataReady(conn_id));
        }
        self.check_peer_closed(sched, conn_id);
    }

    fn on_ack(&mut self, sched: &mut Scheduler<SimEvent>, conn_id: ConnId, len: usize) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        conn.in_flight = conn.in_flight.saturating_sub(len);
        if conn.want_send_ready && !conn.app_closed && conn.state == ConnState::Established {
            conn.want_send_ready = false;
            let owner = conn.owner;
            notify(sched, owner, Notice::SendReady(conn_id));
        }
    }

    /// End of stream is reported once every byte before the FIN is in the
    /// inbox.
    fn check_peer_closed(&mut self, sched: &mut Scheduler<SimEvent>, conn_id: ConnId) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        if conn.peer_closed || conn.peer_fin != Some(conn.expected_seq) {
            return;
        }
        conn.peer_closed = true;
        if !conn.app_closed {
            let owner = conn.owner;
            notify(sched, owner, Notice::PeerClosed(conn_id));
        }
    }

    fn reply(
        &mut self,
        sched: &mut Scheduler<SimEvent>,
        to: Option<ConnId>,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        segment: Segment,
    ) {
        let frame = Frame {
            to,
            source,
            destination,
            segment,
        };
        self.transmit(sched, frame, true);
    }

    fn alloc_conn(&mut self, owner: AppId) -> ConnId {
        self.next_conn += 1;
        let id = ConnId(self.next_conn);
        self.conns.insert(id, Conn::new(owner));
        id
    }

    fn owned(&mut self, app: AppId, id: ConnId) -> Result<&mut Conn, TransportError> {
        self.conns
            .get_mut(&id)
            .filter(|c| c.owner == app)
            .ok_or(TransportError::UnknownConnection(id))
    }

    fn listen(&mut self, app: AppId, id: ConnId, port: u16) -> Result<(), TransportError> {
        let addr = SocketAddrV4::new(app.address(), port);
        if self.listeners.contains_key(&addr) {
            return Err(TransportError::AddressInUse(port));
        }
        let conn = self.owned(app, id)?;
        if conn.state != ConnState::Fresh {
            return Err(TransportError::InvalidState(id));
        }
        conn.state = ConnState::Listening;
        conn.local = Some(addr);
        self.listeners.insert(addr, id);
        debug!(conn = %id, %addr, "Listening");
        Ok(())
    }

    fn connect(
        &mut self,
        sched: &mut Scheduler<SimEvent>,
        app: AppId,
        id: ConnId,
        peer: SocketAddrV4,
    ) -> Result<(), TransportError> {
        if AppId::at(*peer.ip()).is_none() {
            return Err(TransportError::InvalidState(id));
        }
        let port = self.next_port;
        let conn = self.owned(app, id)?;
        if conn.state != ConnState::Fresh {
            return Err(TransportError::InvalidState(id));
        }
        let local = SocketAddrV4::new(app.address(), port);
        conn.state = ConnState::SynSent;
        conn.local = Some(local);
        conn.remote = Some(peer);
        self.next_port = self.next_port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);

        debug!(conn = %id, %local, %peer, "Connecting");
        self.reply(sched, None, local, peer, Segment::Syn { initiator: id });
        Ok(())
    }

    fn send(
        &mut self,
        sched: &mut Scheduler<SimEvent>,
        app: AppId,
        id: ConnId,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        let packet_size = self.config.packet_size.max(1);
        let capacity = self.config.send_buffer;
        let conn = self.owned(app, id)?;
        match conn.state {
            ConnState::Established if !conn.app_closed && !conn.fin_sent => {}
            ConnState::Closed => return Err(TransportError::Closed(id)),
            _ if conn.app_closed || conn.fin_sent => return Err(TransportError::Closed(id)),
            _ => return Err(TransportError::NotConnected(id)),
        }

        let space = capacity.saturating_sub(conn.in_flight);
        let accepted = space.min(data.len());
        if accepted < data.len() {
            conn.want_send_ready = true;
        }
        if accepted == 0 {
            return Ok(0);
        }

        let Some((local, remote)) = conn.endpoints() else {
            return Err(TransportError::NotConnected(id));
        };
        let peer = conn.peer;
        let mut segments = Vec::with_capacity(accepted.div_ceil(packet_size));
        for piece in data[..accepted].chunks(packet_size) {
            segments.push(Segment::Data {
                seq: conn.next_seq,
                payload: Bytes::copy_from_slice(piece),
            });
            conn.next_seq += piece.len() as u64;
        }
        conn.in_flight += accepted;

        for segment in segments {
            self.reply(sched, peer, local, remote, segment);
        }
        Ok(accepted)
    }

    fn recv(&mut self, app: AppId, id: ConnId) -> Option<Bytes> {
        self.owned(app, id).ok()?.inbox.pop_front()
    }

    fn close(&mut self, sched: &mut Scheduler<SimEvent>, app: AppId, id: ConnId) {
        let Ok(conn) = self.owned(app, id) else {
            return;
        };
        if conn.app_closed {
            return;
        }
        conn.app_closed = true;

        match conn.state {
            ConnState::Listening => {
                conn.state = ConnState::Closed;
                if let Some(addr) = conn.local {
                    self.listeners.remove(&addr);
                }
            }
            ConnState::Established if !conn.fin_sent => {
                conn.fin_sent = true;
                let seq = conn.next_seq;
                let peer = conn.peer;
                if let Some((local, remote)) = conn.endpoints() {
                    self.reply(sched, peer, local, remote, Segment::Fin { seq });
                }
            }
            ConnState::Fresh | ConnState::SynSent => conn.state = ConnState::Closed,
            _ => {}
        }
        debug!(conn = %id, "Closed by application");
    }
}

fn notify(sched: &mut Scheduler<SimEvent>, app: AppId, notice: Notice) {
    sched.schedule_after(Duration::ZERO, SimEvent::Notify { app, notice });
}

/// One application's view of the network and the clock.
pub struct AppHost<'a> {
    pub app: AppId,
    pub net: &'a mut Network,
    pub sched: &'a mut Scheduler<SimEvent>,
}

impl<'a> AppHost<'a> {
    pub fn new(app: AppId, net: &'a mut Network, sched: &'a mut Scheduler<SimEvent>) -> Self {
        Self { app, net, sched }
    }
}

impl Transport for AppHost<'_> {
    fn create_connection(&mut self) -> ConnId {
        self.net.alloc_conn(self.app)
    }

    fn listen(&mut self, conn: ConnId, port: u16) -> Result<(), TransportError> {
        self.net.listen(self.app, conn, port)
    }

    fn connect(&mut self, conn: ConnId, peer: SocketAddrV4) -> Result<(), TransportError> {
        self.net.connect(self.sched, self.app, conn, peer)
    }

    fn send(&mut self, conn: ConnId, data: &[u8]) -> Result<usize, TransportError> {
        self.net.send(self.sched, self.app, conn, data)
    }

    fn recv(&mut self, conn: ConnId) -> Option<Bytes> {
        self.net.recv(self.app, conn)
    }

    fn close(&mut self, conn: ConnId) {
        self.net.close(self.sched, self.app, conn);
    }
}

impl Clock for AppHost<'_> {
    fn now(&self) -> SimTime {
        self.sched.now()
    }

    fn schedule_after(&mut self, delay: Duration, token: TimerToken) {
        let app = self.app;
        self.sched.schedule_after(delay, SimEvent::Timer { app, token });
    }

    fn stop(&mut self) {
        self.sched.stop();
    }
}
