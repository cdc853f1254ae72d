//! One complete simulated transfer: build the network and both state
//! machines, run the scheduler, then tear down and collect metrics.

use std::cell::RefCell;
use std::fs;
use std::net::SocketAddrV4;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use ftsim_engine::{
    Receiver, ReceiverConfig, ReceiverOutcome, ReceiverState, Sender, SenderConfig,
    SenderOutcome, TracingLogger, TransferLogger,
};
use ftsim_metrics::{ChannelLog, LatencyLog, ThroughputReport};
use ftsim_types::{ChannelSample, FlowStats, SimTime, TransferStart};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Config;
use crate::network::{
    AppHost, AppId, DEFAULT_SEND_BUFFER, LinkStats, Network, NetworkConfig, Notice,
    RECEIVER_ADDR, SimEvent,
};
use crate::radio::{FadingShape, RadioModel};
use crate::scheduler::{RunEnd, Scheduler};

/// Everything a run produced, for the JSON report and for tests.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: Config,
    pub end: RunEnd,
    pub finished_at_secs: f64,
    pub sender: SenderOutcome,
    pub receiver: ReceiverOutcome,
    pub link: LinkStats,
    pub flows: Vec<FlowStats>,
    pub throughput: ThroughputReport,
    pub channel_samples: u64,
    pub input_sha256: String,
    pub output_sha256: Option<String>,
    /// The receiver completed and the output matches the input byte for byte.
    pub intact: bool,
}

impl RunReport {
    pub fn stopped_by_receiver(&self) -> bool {
        self.end == RunEnd::Stopped
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

struct Apps {
    sender: Sender,
    receiver: Receiver,
}

impl Apps {
    fn on_event(&mut self, net: &mut Network, sched: &mut Scheduler<SimEvent>, event: SimEvent) {
        match event {
            SimEvent::Start(app) => {
                let mut host = AppHost::new(app, net, sched);
                match app {
                    AppId::Sender => self.sender.start(&mut host),
                    AppId::Receiver => self.receiver.start(&mut host),
                }
            }
            SimEvent::Timer { app, token } => {
                if app == AppId::Sender {
                    let mut host = AppHost::new(app, net, sched);
                    self.sender.on_timer(&mut host, token);
                }
            }
            SimEvent::Notify { app, notice } => {
                let mut host = AppHost::new(app, net, sched);
                match (app, notice) {
                    (AppId::Sender, Notice::Connected(c)) => self.sender.on_connected(&mut host, c),
                    (AppId::Sender, Notice::ConnectFailed(c)) => {
                        self.sender.on_connect_failed(&mut host, c)
                    }
                    (AppId::Sender, Notice::SendReady(c)) => {
                        self.sender.on_send_ready(&mut host, c)
                    }
                    (AppId::Receiver, Notice::Accepted(c)) => {
                        self.receiver.on_accepted(&mut host, c)
                    }
                    (AppId::Receiver, Notice::DataReady(c)) => {
                        self.receiver.on_data_ready(&mut host, c)
                    }
                    (AppId::Receiver, Notice::PeerClosed(c)) => {
                        self.receiver.on_peer_closed(&mut host, c)
                    }
                    _ => {}
                }
            }
            SimEvent::Arrival(_) | SimEvent::Retransmit(_) => {}
        }
    }
}

/// Run one transfer as described by `config`.
pub fn run(config: &Config) -> anyhow::Result<RunReport> {
    config.validate()?;
    // Metric sinks create their own directories and degrade to warnings.
    ensure_parent(&config.output_file)?;

    let logger: Arc<dyn TransferLogger> = Arc::new(TracingLogger);
    let transfer_start = TransferStart::new();

    let peer = SocketAddrV4::new(RECEIVER_ADDR, config.port);
    let mut sender_config = SenderConfig::new(peer, &config.input_file);
    sender_config.chunk_size = config.chunk_size;
    sender_config.retry = config.retry_policy();
    sender_config.logger = Some(logger.clone());
    let sender = Sender::load(sender_config, transfer_start.clone())?;

    let mut receiver_config = ReceiverConfig::new(config.port, &config.output_file);
    receiver_config.latency_log = Some(LatencyLog::new(&config.latency_log));
    receiver_config.logger = Some(logger);
    let mut receiver = Receiver::new(receiver_config, transfer_start);
    receiver.set_expected_size(sender.expected_size());

    let shape = FadingShape {
        m0: config.m0,
        m1: config.m1,
        m2: config.m2,
    };
    let radio = RadioModel::new(config.distance, shape, config.seed)?;
    let mut net = Network::new(
        NetworkConfig {
            distance: config.distance,
            rate_bps: config.phy_standard.rate_bps(),
            packet_size: config.packet_size,
            send_buffer: DEFAULT_SEND_BUFFER,
        },
        radio,
    );

    let channel_log = Rc::new(RefCell::new(ChannelLog::new(&config.channel_log)));
    let sink = Rc::clone(&channel_log);
    net.add_sniffer(move |rx| {
        let sample = ChannelSample::from_signal_noise(rx.time, rx.signal_dbm, rx.noise_dbm);
        sink.borrow_mut().record(&sample);
    });

    info!(
        distance = config.distance,
        phy = ?config.phy_standard,
        expected = %receiver.expected_size(),
        mean_rx_dbm = crate::radio::mean_rx_power_dbm(config.distance),
        propagation_ns = net.propagation_delay().as_nanos() as u64,
        "Starting transfer simulation"
    );

    let mut sched = Scheduler::new();
    sched.schedule_at(
        SimTime::from_secs_f64(config.receiver_start),
        SimEvent::Start(AppId::Receiver),
    );
    sched.schedule_at(
        SimTime::from_secs_f64(config.sender_start),
        SimEvent::Start(AppId::Sender),
    );

    let mut apps = Apps { sender, receiver };
    let limit = SimTime::from_secs_f64(config.max_time);
    let end = sched.run_until(limit, |sched, event| {
        if let Some(event) = net.handle(sched, event) {
            apps.on_event(&mut net, sched, event);
        }
    });
    let finished_at = sched.now();
    match end {
        RunEnd::Stopped => info!(t = %finished_at, "Receiver ended the run"),
        RunEnd::Drained => warn!(t = %finished_at, "Nothing left to simulate"),
        RunEnd::TimeLimit => warn!(t = %finished_at, "Simulation time limit reached"),
    }

    // Teardown. The receiver finalizes here if it has not already.
    apps.receiver
        .stop(&mut AppHost::new(AppId::Receiver, &mut net, &mut sched));
    apps.sender
        .stop(&mut AppHost::new(AppId::Sender, &mut net, &mut sched));

    let channel_samples = {
        let mut log = channel_log.borrow_mut();
        log.close();
        log.written()
    };

    let flows = net.flows().to_vec();
    let throughput = ThroughputReport::from_flows(&flows);
    if let Err(e) = throughput.write(&config.throughput_log) {
        warn!("Throughput log not written: {}", e);
    }
    for flow in &throughput.flows {
        info!("{}", flow);
    }

    let input_sha256 = sha256_file(&config.input_file)
        .with_context(|| format!("hashing {}", config.input_file.display()))?;
    let output_sha256 = sha256_file(&config.output_file).ok();

    let receiver = apps.receiver.outcome();
    let intact = receiver.state == ReceiverState::Completed
        && output_sha256.as_deref() == Some(input_sha256.as_str());
    if intact {
        info!(bytes = receiver.bytes_received, "Output matches input");
    } else {
        warn!(
            state = ?receiver.state,
            bytes = receiver.bytes_received,
            expected = %receiver.expected,
            "Output does not match input"
        );
    }

    Ok(RunReport {
        config: config.clone(),
        end,
        finished_at_secs: finished_at.as_secs_f64(),
        sender: apps.sender.outcome(),
        receiver,
        link: net.stats(),
        flows,
        throughput,
        channel_samples,
        input_sha256,
        output_sha256,
        intact,
    })
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let data = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}
