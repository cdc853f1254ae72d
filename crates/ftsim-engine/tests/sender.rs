mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{FakeHost, RecordingLogger, pattern, peer};
use ftsim_engine::{
    EngineError, NullLogger, RetryPolicy, Sender, SenderConfig, SenderState, TimerToken,
    TransferEvent, TransportError,
};
use ftsim_types::{ExpectedSize, SimTime, TransferStart};

fn sender_with(len: usize, retry: RetryPolicy) -> (Sender, TransferStart) {
    let start = TransferStart::new();
    let mut config = SenderConfig::new(peer(), "unused.bin");
    config.retry = retry;
    let sender = Sender::from_bytes(config, Bytes::from(pattern(len)), start.clone()).unwrap();
    (sender, start)
}

#[test]
fn sends_2500_bytes_as_three_chunks() {
    let (mut sender, start) = sender_with(2500, RetryPolicy::default());
    assert_eq!(sender.expected_size(), ExpectedSize::Exact(2500));

    let mut host = FakeHost::at(2);
    sender.start(&mut host);
    assert_eq!(sender.state(), SenderState::Connecting);
    assert_eq!(host.connects.len(), 1);
    assert_eq!(host.connects[0].1, peer());
    assert!(host.chunks.is_empty());

    let conn = host.connects[0].0;
    host.advance(Duration::from_millis(3));
    sender.on_connected(&mut host, conn);

    assert_eq!(host.chunks, vec![1024, 1024, 452]);
    assert_eq!(host.sent, pattern(2500));
    assert_eq!(sender.state(), SenderState::Completed);
    assert_eq!(sender.cursor(), 2500);
    assert_eq!(start.get(), Some(SimTime::from_millis(2003)));
    // End of stream is signalled by closing.
    assert!(host.is_closed(conn));
    assert_eq!(sender.active_connection(), None);
}

#[test]
fn backpressure_waits_for_send_ready() {
    let (mut sender, _) = sender_with(2500, RetryPolicy::default());
    let mut host = FakeHost::new();
    host.send_budget = Some(1500);

    sender.start(&mut host);
    let conn = host.connects[0].0;
    sender.on_connected(&mut host, conn);

    // 1024 fits, then a partial 476, then the transport is full.
    assert_eq!(host.chunks, vec![1024, 476]);
    assert_eq!(sender.cursor(), 1500);
    assert_eq!(sender.state(), SenderState::Sending);

    // A spurious readiness callback with no space changes nothing.
    sender.on_send_ready(&mut host, conn);
    assert_eq!(sender.cursor(), 1500);

    host.send_budget = None;
    sender.on_send_ready(&mut host, conn);
    assert_eq!(host.chunks, vec![1024, 476, 1000]);
    assert_eq!(host.sent, pattern(2500));
    assert_eq!(sender.state(), SenderState::Completed);
}

#[test]
fn retries_after_each_failure_then_sends() {
    let (mut sender, start) = sender_with(3000, RetryPolicy::default());
    let mut host = FakeHost::new();
    sender.start(&mut host);

    for n in 1..=3 {
        let failed = host.connects.last().unwrap().0;
        sender.on_connect_failed(&mut host, failed);
        assert_eq!(sender.state(), SenderState::RetryScheduled);
        assert!(host.is_closed(failed));
        assert_eq!(host.timers.len(), n);
        assert_eq!(host.timers[n - 1].1, Duration::from_secs(1));
        assert!(host.chunks.is_empty(), "nothing may be sent before a connect succeeds");
        assert_eq!(start.get(), None);

        host.advance(Duration::from_secs(1));
        let token = host.last_timer();
        sender.on_timer(&mut host, token);
        assert_eq!(sender.state(), SenderState::Connecting);
    }

    // Every attempt used a fresh connection.
    assert_eq!(host.connects.len(), 4);
    let fresh = host.connects[3].0;
    assert!(host.connects[..3].iter().all(|(c, _)| *c != fresh));

    sender.on_connected(&mut host, fresh);
    assert_eq!(sender.state(), SenderState::Completed);
    assert_eq!(host.timers.len(), 3);

    let outcome = sender.outcome();
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.retries, 3);
    assert_eq!(outcome.bytes_sent, 3000);
}

#[test]
fn bounded_policy_ends_in_failed() {
    let logger = Arc::new(RecordingLogger::default());
    let start = TransferStart::new();
    let mut config = SenderConfig::new(peer(), "unused.bin");
    config.retry = RetryPolicy::bounded(Duration::from_millis(500), 2);
    config.logger = Some(logger.clone());
    let mut sender = Sender::from_bytes(config, Bytes::from(pattern(10)), start).unwrap();

    let mut host = FakeHost::new();
    sender.start(&mut host);
    for _ in 0..2 {
        let conn = host.connects.last().unwrap().0;
        sender.on_connect_failed(&mut host, conn);
        let token = host.last_timer();
        sender.on_timer(&mut host, token);
    }
    let conn = host.connects.last().unwrap().0;
    sender.on_connect_failed(&mut host, conn);

    assert_eq!(sender.state(), SenderState::Failed);
    assert_eq!(host.timers.len(), 2);
    assert!(host.timers.iter().all(|t| t.1 == Duration::from_millis(500)));
    assert!(logger.events().contains(&TransferEvent::GaveUp { attempts: 3 }));
}

#[test]
fn immediate_connect_error_is_retried() {
    let (mut sender, _) = sender_with(10, RetryPolicy::default());
    let mut host = FakeHost::new();
    host.connect_error = Some(TransportError::InvalidState(host.peek_next_conn()));

    sender.start(&mut host);
    assert_eq!(sender.state(), SenderState::RetryScheduled);
    assert_eq!(host.timers.len(), 1);

    host.connect_error = None;
    let token = host.last_timer();
    sender.on_timer(&mut host, token);
    let conn = host.connects.last().unwrap().0;
    sender.on_connected(&mut host, conn);
    assert_eq!(sender.state(), SenderState::Completed);
}

#[test]
fn stale_notifications_are_ignored() {
    let (mut sender, start) = sender_with(2048, RetryPolicy::default());
    let mut host = FakeHost::new();
    sender.start(&mut host);
    let first = host.connects[0].0;
    sender.on_connect_failed(&mut host, first);

    // Late success for the discarded connection.
    sender.on_connected(&mut host, first);
    assert_eq!(sender.state(), SenderState::RetryScheduled);
    assert_eq!(start.get(), None);

    // Unknown timer.
    sender.on_timer(&mut host, TimerToken(999));
    assert_eq!(host.connects.len(), 1);

    // After stop, even the real timer is ignored.
    let token = host.last_timer();
    sender.stop(&mut host);
    sender.on_timer(&mut host, token);
    assert_eq!(host.connects.len(), 1);
    assert!(host.chunks.is_empty());
}

#[test]
fn stop_is_idempotent() {
    let (mut sender, _) = sender_with(5000, RetryPolicy::default());
    let mut host = FakeHost::new();
    host.send_budget = Some(2048);
    sender.start(&mut host);
    let conn = host.connects[0].0;
    sender.on_connected(&mut host, conn);

    sender.stop(&mut host);
    sender.stop(&mut host);
    assert_eq!(host.closed, vec![conn]);

    // Readiness after stop is a no-op.
    host.send_budget = None;
    sender.on_send_ready(&mut host, conn);
    assert_eq!(sender.cursor(), 2048);
}

#[test]
fn empty_file_completes_on_connect() {
    let (mut sender, _) = sender_with(0, RetryPolicy::default());
    assert_eq!(sender.expected_size(), ExpectedSize::Exact(0));

    let mut host = FakeHost::new();
    sender.start(&mut host);
    let conn = host.connects[0].0;
    sender.on_connected(&mut host, conn);

    assert!(host.chunks.is_empty());
    assert_eq!(sender.state(), SenderState::Completed);
    assert!(host.is_closed(conn));
}

#[test]
fn smaller_chunk_size_is_honoured() {
    let start = TransferStart::new();
    let mut config = SenderConfig::new(peer(), "unused.bin");
    config.chunk_size = 300;
    config.logger = Some(Arc::new(NullLogger));
    let mut sender = Sender::from_bytes(config, Bytes::from(pattern(1000)), start).unwrap();

    let mut host = FakeHost::new();
    sender.start(&mut host);
    let conn = host.connects[0].0;
    sender.on_connected(&mut host, conn);
    assert_eq!(host.chunks, vec![300, 300, 300, 100]);
}

#[test]
fn rejects_bad_configuration() {
    let mut config = SenderConfig::new(peer(), "unused.bin");
    config.chunk_size = 1025;
    let err = Sender::from_bytes(config, Bytes::new(), TransferStart::new()).err();
    assert!(matches!(err, Some(EngineError::InvalidChunkSize(1025))));

    let dir = tempfile::tempdir().unwrap();
    let config = SenderConfig::new(peer(), dir.path().join("missing.bin"));
    let err = Sender::load(config, TransferStart::new()).err();
    assert!(matches!(err, Some(EngineError::InputUnreadable { .. })));
}

#[test]
fn load_reads_the_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.bin");
    std::fs::write(&path, pattern(4097)).unwrap();

    let sender = Sender::load(SenderConfig::new(peer(), &path), TransferStart::new()).unwrap();
    assert_eq!(sender.expected_size(), ExpectedSize::Exact(4097));
    assert_eq!(sender.outcome().bytes_total, 4097);
}
