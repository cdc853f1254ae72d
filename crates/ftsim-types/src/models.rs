use std::cell::Cell;
use std::fmt;
use std::ops::{Add, Sub};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point in virtual time, nanosecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Negative and non-finite inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1e9).round() as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        let nanos = u64::try_from(rhs.as_nanos()).unwrap_or(u64::MAX);
        SimTime(self.0.saturating_add(nanos))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.saturating_since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// How many bytes the receiver should wait for.
///
/// `Unknown` never completes on size alone; the transfer ends when the peer
/// closes or the run is stopped. `Exact(0)` is a real, empty file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bytes", rename_all = "snake_case")]
pub enum ExpectedSize {
    #[default]
    Unknown,
    Exact(u64),
}

impl ExpectedSize {
    /// True once `received` bytes are enough to end the transfer.
    pub fn is_reached(self, received: usize) -> bool {
        match self {
            Self::Unknown => false,
            Self::Exact(n) => received as u64 >= n,
        }
    }

    /// True if a transfer that ended with `received` bytes is intact.
    pub fn matches(self, received: usize) -> bool {
        match self {
            Self::Unknown => true,
            Self::Exact(n) => received as u64 == n,
        }
    }

    pub fn bytes(self) -> Option<u64> {
        match self {
            Self::Unknown => None,
            Self::Exact(n) => Some(n),
        }
    }
}

impl fmt::Display for ExpectedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Exact(n) => write!(f, "{}", n),
        }
    }
}

/// Virtual time at which the sender's connection came up.
///
/// The sender stamps it, the receiver reads it to compute transfer latency.
/// Clones share the same cell; the value lives for one run.
#[derive(Debug, Clone, Default)]
pub struct TransferStart(Rc<Cell<Option<SimTime>>>);

impl TransferStart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, at: SimTime) {
        self.0.set(Some(at));
    }

    pub fn get(&self) -> Option<SimTime> {
        self.0.get()
    }
}
