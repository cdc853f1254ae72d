//! File-level behaviour of the metrics sinks across simulated runs.

use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};

use ftsim_metrics::{ChannelLog, LatencyLog, ThroughputReport, read_last_sample};
use ftsim_types::{ChannelSample, FlowStats, SimTime};

#[test]
fn latency_accumulates_over_two_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("files/latency_transfer.log");

    // Each run builds its own handle, as separate processes would.
    let first = LatencyLog::new(&path).accumulate(1.25).unwrap();
    assert_eq!(first, 1.25);
    assert_eq!(fs::read_to_string(&path).unwrap(), "1.25\n");

    let second = LatencyLog::new(&path).accumulate(0.5).unwrap();
    assert_eq!(second, 1.75);
    assert_eq!(fs::read_to_string(&path).unwrap(), "1.75\n");
}

#[test]
fn channel_log_appends_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channel_metrics.log");

    {
        let mut log = ChannelLog::new(&path);
        log.record(&ChannelSample::from_signal_noise(SimTime::from_secs(1), -60.0, -94.0));
        log.record(&ChannelSample::from_signal_noise(SimTime::from_secs(2), -62.0, -94.0));
        log.close();
    }
    {
        let mut log = ChannelLog::new(&path);
        log.record(&ChannelSample::from_signal_noise(SimTime::from_secs(3), -65.5, -94.0));
    }

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "1,RSSI=-60,SNR=34\n2,RSSI=-62,SNR=32\n3,RSSI=-65.5,SNR=28.5\n"
    );

    let last = read_last_sample(&path).unwrap().unwrap();
    assert_eq!(last.time, 3.0);
    assert_eq!(last.rssi_dbm, -65.5);
    assert_eq!(last.snr_db, 28.5);
}

#[test]
fn channel_log_open_failure_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    // The parent "directory" is a regular file, so the open must fail.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();

    let mut log = ChannelLog::new(blocker.join("channel.log"));
    log.record(&ChannelSample::from_signal_noise(SimTime::ZERO, -60.0, -94.0));
    log.record(&ChannelSample::from_signal_noise(SimTime::ZERO, -60.0, -94.0));

    assert!(log.is_disabled());
    assert_eq!(log.written(), 0);
}

#[test]
fn last_sample_of_missing_log_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_last_sample(&dir.path().join("nope.log")).unwrap().is_none());
}

#[test]
fn throughput_report_overwrites_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("throughput.log");
    fs::write(&path, "stale line\nanother\n").unwrap();

    let a = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153);
    let b = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9000);

    let mut data = FlowStats::new(1, a, b);
    data.first_tx = Some(SimTime::from_secs(2));
    data.last_rx = Some(SimTime::from_secs(3));
    data.rx_bytes = 250_000;

    // Reverse direction never received anything.
    let acks = FlowStats::new(2, b, a);

    ThroughputReport::from_flows([&data, &acks]).write(&path).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "FlowID: 1, Throughput: 2 Mbps\nFlowID: 2, Throughput: 0 Mbps\n"
    );
}
