//! The record hand-off engine.
//!
//! One run delivers the finished record file to the first bonded peer that
//! accepts it in full:
//!
//! ```text
//! check record ─▶ check radio ─▶ enumerate peers
//!                                      │
//!        ┌─────────────────────────────┘
//!        ▼
//!   for each peer: cancel discovery, settle
//!        │ open channel (secure ▶ insecure ▶ raw)   ── none ─▶ next peer
//!        │ connect, up to N attempts with backoff   ── exhausted ─▶ close, next peer
//!        │ stream file in chunks, flush             ── I/O error ─▶ close, settle, next peer
//!        ▼
//!      close, done
//! ```
//!
//! Delivery is at most once per run and nothing is checkpointed: a run
//! interrupted by process death starts over from the first peer next time.
//! The record file is never deleted.

use crate::transfer::backoff::{Backoff, Sleeper, ThreadSleeper};
use crate::transfer::transport::{
    ChannelStrategy, PeerChannel, Radio, TransferCandidate, CHANNEL_STRATEGIES,
    SERIAL_PORT_SERVICE,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Retry and streaming parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPolicy {
    /// Connection attempts per peer
    pub connect_attempts: u32,
    /// Delay after the first failed attempt; doubles after each failure
    #[serde(with = "crate::config::duration_millis")]
    pub initial_backoff: Duration,
    /// Pause after cancelling discovery and after a failed send
    #[serde(with = "crate::config::duration_millis")]
    pub settle_delay: Duration,
    /// Bytes per write to the channel
    pub chunk_size: usize,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            settle_delay: Duration::from_millis(300),
            chunk_size: 4096,
        }
    }
}

/// A successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub peer: TransferCandidate,
    pub bytes_sent: u64,
    /// Connection attempts used on the delivering peer
    pub connect_attempts: u32,
    /// Peers tried, including the delivering one
    pub peers_tried: usize,
}

/// Why a single peer was abandoned.
#[derive(Debug, Error)]
pub enum PeerFailureReason {
    #[error("no channel strategy produced a channel")]
    NoChannel,

    #[error("connection failed after {attempts} attempt(s)")]
    ConnectExhausted { attempts: u32 },

    #[error("send failed after connecting: {0}")]
    SendFailed(#[source] io::Error),
}

#[derive(Debug)]
pub struct PeerFailure {
    pub peer: TransferCandidate,
    pub reason: PeerFailureReason,
}

/// Errors that end a transfer run.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Record file missing: {0:?}")]
    RecordMissing(PathBuf),

    #[error("Record file is empty: {0:?}")]
    RecordEmpty(PathBuf),

    #[error("Radio is disabled")]
    RadioDisabled,

    #[error("No bonded peers")]
    NoBondedPeers,

    #[error("Unable to deliver record to any of {} bonded peer(s)", .failures.len())]
    AllPeersExhausted { failures: Vec<PeerFailure> },
}

/// Drives one delivery run against a [`Radio`].
pub struct TransferEngine<'a> {
    radio: &'a dyn Radio,
    sleeper: &'a dyn Sleeper,
    policy: TransferPolicy,
    service: Uuid,
}

impl<'a> TransferEngine<'a> {
    pub fn new(radio: &'a dyn Radio, policy: TransferPolicy) -> Self {
        Self {
            radio,
            sleeper: &ThreadSleeper,
            policy,
            service: SERIAL_PORT_SERVICE,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Deliver `record` to the first peer that takes all of it.
    pub fn run(&self, record: &Path) -> Result<TransferReport, TransferError> {
        let size = check_record(record)?;

        if !self.radio.is_enabled() {
            tracing::error!("Transfer: radio disabled");
            return Err(TransferError::RadioDisabled);
        }

        let peers = self.radio.bonded_peers();
        for peer in &peers {
            tracing::debug!("Bonded peer {peer}");
        }
        if peers.is_empty() {
            tracing::error!("Transfer: no bonded peers");
            return Err(TransferError::NoBondedPeers);
        }

        tracing::info!(bytes = size, peers = peers.len(), "Starting record transfer");

        let mut failures = Vec::new();
        for (index, peer) in peers.iter().enumerate() {
            match self.deliver_to(peer, record) {
                Ok((bytes_sent, connect_attempts)) => {
                    tracing::info!("Transfer: sent {bytes_sent} bytes to {peer}");
                    return Ok(TransferReport {
                        peer: peer.clone(),
                        bytes_sent,
                        connect_attempts,
                        peers_tried: index + 1,
                    });
                }
                Err(reason) => {
                    tracing::warn!("Transfer: giving up on {peer}: {reason}");
                    failures.push(PeerFailure {
                        peer: peer.clone(),
                        reason,
                    });
                }
            }
        }

        tracing::error!("Transfer: unable to send record to any peer");
        Err(TransferError::AllPeersExhausted { failures })
    }

    /// Returns the bytes sent and the connection attempts used.
    fn deliver_to(
        &self,
        peer: &TransferCandidate,
        record: &Path,
    ) -> Result<(u64, u32), PeerFailureReason> {
        tracing::info!("Transfer: attempting {peer}");

        // Discovery slows connection establishment down considerably.
        self.radio.cancel_discovery();
        self.sleeper.sleep(self.policy.settle_delay);

        let mut channel = self.open_channel(peer).ok_or(PeerFailureReason::NoChannel)?;

        let attempts = match self.connect_with_retry(channel.as_mut(), peer) {
            Some(attempts) => attempts,
            None => {
                close_quietly(channel.as_mut(), peer);
                return Err(PeerFailureReason::ConnectExhausted {
                    attempts: self.policy.connect_attempts,
                });
            }
        };

        let sent = stream_file(channel.as_mut(), record, self.policy.chunk_size);
        close_quietly(channel.as_mut(), peer);

        match sent {
            Ok(bytes) => Ok((bytes, attempts)),
            Err(e) => {
                tracing::error!("Transfer: send to {peer} failed: {e}");
                self.sleeper.sleep(self.policy.settle_delay);
                Err(PeerFailureReason::SendFailed(e))
            }
        }
    }

    fn open_channel(&self, peer: &TransferCandidate) -> Option<Box<dyn PeerChannel>> {
        for strategy in CHANNEL_STRATEGIES {
            match self.radio.open_channel(peer, self.service, strategy) {
                Ok(channel) => {
                    tracing::debug!("Transfer: opened {strategy} channel to {peer}");
                    return Some(channel);
                }
                Err(e) => log_open_failure(strategy, peer, &e),
            }
        }
        None
    }

    /// Returns the attempt number that connected, or `None` once exhausted.
    fn connect_with_retry(
        &self,
        channel: &mut dyn PeerChannel,
        peer: &TransferCandidate,
    ) -> Option<u32> {
        let mut backoff = Backoff::new(self.policy.initial_backoff);
        for attempt in 1..=self.policy.connect_attempts {
            match channel.connect() {
                Ok(()) => {
                    tracing::info!(attempt, "Transfer: connected to {peer}");
                    return Some(attempt);
                }
                Err(e) => {
                    tracing::warn!(attempt, "Transfer: connect to {peer} failed: {e}");
                    self.sleeper.sleep(backoff.next_delay());
                }
            }
        }
        None
    }
}

fn log_open_failure(strategy: ChannelStrategy, peer: &TransferCandidate, e: &io::Error) {
    match strategy {
        ChannelStrategy::RawChannel(_) => {
            tracing::error!("Transfer: {strategy} channel to {peer} failed: {e}")
        }
        _ => tracing::warn!("Transfer: {strategy} channel to {peer} failed: {e}"),
    }
}

fn close_quietly(channel: &mut dyn PeerChannel, peer: &TransferCandidate) {
    if let Err(e) = channel.close() {
        tracing::debug!("Transfer: closing channel to {peer}: {e}");
    }
}

/// The record must exist and be non-empty. Returns its size.
fn check_record(record: &Path) -> Result<u64, TransferError> {
    let size = match std::fs::metadata(record) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            tracing::error!(path = ?record, "Transfer: record missing");
            return Err(TransferError::RecordMissing(record.to_path_buf()));
        }
    };
    if size == 0 {
        tracing::error!(path = ?record, "Transfer: record empty");
        return Err(TransferError::RecordEmpty(record.to_path_buf()));
    }
    Ok(size)
}

/// Copy the file to the channel in `chunk_size` writes, then flush.
fn stream_file<W: Write + ?Sized>(
    output: &mut W,
    record: &Path,
    chunk_size: usize,
) -> io::Result<u64> {
    let mut input = File::open(record)?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buffer[..read])?;
        total += read as u64;
    }
    output.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        CancelDiscovery,
        Sleep(u64),
        Open(String, ChannelStrategy),
        Connect(String, bool),
        Write(String, usize),
        Close(String),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    #[derive(Clone, Default)]
    struct Script {
        /// Strategies whose channel creation fails
        failing_strategies: Vec<ChannelStrategy>,
        /// Connect calls that fail before one succeeds
        failed_connects: u32,
        /// Fail writes once this many bytes were accepted
        fail_after_bytes: Option<usize>,
    }

    impl Script {
        fn reachable() -> Self {
            Self::default()
        }

        fn unreachable() -> Self {
            Self {
                failed_connects: u32::MAX,
                ..Self::default()
            }
        }
    }

    struct FakeRadio {
        enabled: bool,
        peers: Vec<TransferCandidate>,
        scripts: HashMap<String, Script>,
        received: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        log: Log,
    }

    impl FakeRadio {
        fn new(peers: &[(&str, Script)], log: Log) -> Self {
            Self {
                enabled: true,
                peers: peers
                    .iter()
                    .map(|(name, _)| TransferCandidate::new(*name, *name))
                    .collect(),
                scripts: peers
                    .iter()
                    .map(|(name, script)| (name.to_string(), script.clone()))
                    .collect(),
                received: Arc::new(Mutex::new(HashMap::new())),
                log,
            }
        }

        fn received(&self, peer: &str) -> Vec<u8> {
            self.received
                .lock()
                .unwrap()
                .get(peer)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Radio for FakeRadio {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn bonded_peers(&self) -> Vec<TransferCandidate> {
            self.peers.clone()
        }

        fn cancel_discovery(&self) {
            self.log.lock().unwrap().push(Event::CancelDiscovery);
        }

        fn open_channel(
            &self,
            peer: &TransferCandidate,
            _service: Uuid,
            strategy: ChannelStrategy,
        ) -> io::Result<Box<dyn PeerChannel>> {
            self.log
                .lock()
                .unwrap()
                .push(Event::Open(peer.address.clone(), strategy));
            let script = self.scripts[&peer.address].clone();
            if script.failing_strategies.contains(&strategy) {
                return Err(io::Error::new(ErrorKind::Unsupported, "strategy refused"));
            }
            Ok(Box::new(FakeChannel {
                peer: peer.address.clone(),
                script,
                connects: 0,
                connected: false,
                accepted: 0,
                received: self.received.clone(),
                log: self.log.clone(),
            }))
        }
    }

    struct FakeChannel {
        peer: String,
        script: Script,
        connects: u32,
        connected: bool,
        accepted: usize,
        received: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        log: Log,
    }

    impl Write for FakeChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.connected {
                return Err(io::Error::from(ErrorKind::NotConnected));
            }
            if let Some(limit) = self.script.fail_after_bytes {
                if self.accepted + buf.len() > limit {
                    return Err(io::Error::new(ErrorKind::BrokenPipe, "link lost"));
                }
            }
            self.accepted += buf.len();
            self.log
                .lock()
                .unwrap()
                .push(Event::Write(self.peer.clone(), buf.len()));
            self.received
                .lock()
                .unwrap()
                .entry(self.peer.clone())
                .or_default()
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl PeerChannel for FakeChannel {
        fn connect(&mut self) -> io::Result<()> {
            self.connects += 1;
            let ok = self.connects > self.script.failed_connects;
            self.log
                .lock()
                .unwrap()
                .push(Event::Connect(self.peer.clone(), ok));
            if ok {
                self.connected = true;
                Ok(())
            } else {
                Err(io::Error::new(ErrorKind::TimedOut, "no answer"))
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.connected = false;
            self.log.lock().unwrap().push(Event::Close(self.peer.clone()));
            Ok(())
        }
    }

    struct RecordingSleeper {
        log: Log,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.log
                .lock()
                .unwrap()
                .push(Event::Sleep(duration.as_millis() as u64));
        }
    }

    fn record_with(bytes: usize) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");
        let content: Vec<u8> = (0..bytes).map(|i| b'a' + (i % 26) as u8).collect();
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn sleeps(log: &Log) -> Vec<u64> {
        log.lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Sleep(ms) => Some(*ms),
                _ => None,
            })
            .collect()
    }

    fn events_for(log: &Log, peer: &str) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .filter(|e| match e {
                Event::Open(p, _) | Event::Connect(p, _) | Event::Write(p, _) | Event::Close(p) => {
                    p == peer
                }
                _ => false,
            })
            .count()
    }

    #[test]
    fn test_unreachable_peer_backoff_sequence() {
        let log = Log::default();
        let radio = FakeRadio::new(&[("A", Script::unreachable())], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(100);

        let err = TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap_err();

        assert_eq!(sleeps(&log), vec![300, 500, 1000, 2000, 4000, 8000]);
        let connects = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Connect(_, false)))
            .count();
        assert_eq!(connects, 5);
        assert_eq!(log.lock().unwrap().last(), Some(&Event::Close("A".into())));

        match err {
            TransferError::AllPeersExhausted { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(matches!(
                    failures[0].reason,
                    PeerFailureReason::ConnectExhausted { attempts: 5 }
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_falls_through_to_reachable_peer_and_stops() {
        let log = Log::default();
        let radio = FakeRadio::new(
            &[
                ("A", Script::unreachable()),
                ("B", Script::reachable()),
                ("C", Script::reachable()),
            ],
            log.clone(),
        );
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(1_000);

        let report = TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        assert_eq!(report.peer.name, "B");
        assert_eq!(report.bytes_sent, 1_000);
        assert_eq!(report.connect_attempts, 1);
        assert_eq!(report.peers_tried, 2);
        assert_eq!(radio.received("B"), std::fs::read(&record).unwrap());
        assert_eq!(events_for(&log, "C"), 0);
        assert_eq!(sleeps(&log), vec![300, 500, 1000, 2000, 4000, 8000, 300]);
    }

    #[test]
    fn test_connects_after_retries() {
        let log = Log::default();
        let script = Script {
            failed_connects: 2,
            ..Script::default()
        };
        let radio = FakeRadio::new(&[("A", script)], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(10);

        let report = TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        assert_eq!(report.connect_attempts, 3);
        assert_eq!(sleeps(&log), vec![300, 500, 1000]);
    }

    #[test]
    fn test_streams_in_chunks() {
        let log = Log::default();
        let radio = FakeRadio::new(&[("A", Script::reachable())], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(10_000);

        TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        let writes: Vec<usize> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Write(_, n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![4096, 4096, 1808]);
    }

    #[test]
    fn test_mid_stream_failure_moves_to_next_peer() {
        let log = Log::default();
        let flaky = Script {
            fail_after_bytes: Some(5_000),
            ..Script::default()
        };
        let radio = FakeRadio::new(&[("A", flaky), ("B", Script::reachable())], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(10_000);

        let report = TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        assert_eq!(report.peer.name, "B");
        assert_eq!(report.bytes_sent, 10_000);
        // settle for A, settle after A's failed send, settle for B
        assert_eq!(sleeps(&log), vec![300, 300, 300]);
        // A connected once and was not retried on the same connection
        let a_connects = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Connect(p, _) if p == "A"))
            .count();
        assert_eq!(a_connects, 1);
        assert!(log.lock().unwrap().contains(&Event::Close("A".into())));
    }

    #[test]
    fn test_channel_strategy_fallback() {
        let log = Log::default();
        let script = Script {
            failing_strategies: vec![ChannelStrategy::Secure],
            ..Script::default()
        };
        let radio = FakeRadio::new(&[("A", script)], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(10);

        TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        let opens: Vec<Event> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Open(..)))
            .cloned()
            .collect();
        assert_eq!(
            opens,
            vec![
                Event::Open("A".into(), ChannelStrategy::Secure),
                Event::Open("A".into(), ChannelStrategy::Insecure),
            ]
        );
    }

    #[test]
    fn test_peer_without_channel_is_skipped() {
        let log = Log::default();
        let no_channel = Script {
            failing_strategies: CHANNEL_STRATEGIES.to_vec(),
            ..Script::default()
        };
        let radio = FakeRadio::new(&[("A", no_channel), ("B", Script::reachable())], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let (_dir, record) = record_with(10);

        let report = TransferEngine::new(&radio, TransferPolicy::default())
            .with_sleeper(&sleeper)
            .run(&record)
            .unwrap();

        assert_eq!(report.peer.name, "B");
        assert_eq!(sleeps(&log), vec![300, 300]);
        assert!(!log
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Connect(p, _) if p == "A")));
    }

    #[test]
    fn test_missing_or_empty_record_fails_before_any_peer() {
        let log = Log::default();
        let radio = FakeRadio::new(&[("A", Script::reachable())], log.clone());
        let sleeper = RecordingSleeper { log: log.clone() };
        let engine = TransferEngine::new(&radio, TransferPolicy::default()).with_sleeper(&sleeper);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            engine.run(&missing),
            Err(TransferError::RecordMissing(_))
        ));

        let (_dir, empty) = record_with(0);
        assert!(matches!(engine.run(&empty), Err(TransferError::RecordEmpty(_))));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_radio_and_no_peers() {
        let log = Log::default();
        let (_dir, record) = record_with(10);

        let mut radio = FakeRadio::new(&[("A", Script::reachable())], log.clone());
        radio.enabled = false;
        assert!(matches!(
            TransferEngine::new(&radio, TransferPolicy::default()).run(&record),
            Err(TransferError::RadioDisabled)
        ));

        let radio = FakeRadio::new(&[], log.clone());
        assert!(matches!(
            TransferEngine::new(&radio, TransferPolicy::default()).run(&record),
            Err(TransferError::NoBondedPeers)
        ));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_policy_serializes_millis() {
        let json = serde_json::to_value(TransferPolicy::default()).unwrap();
        assert_eq!(json["initial_backoff"], 500);
        assert_eq!(json["settle_delay"], 300);
        assert_eq!(json["chunk_size"], 4096);
    }
}
