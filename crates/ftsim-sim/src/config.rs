use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use ftsim_engine::{MAX_CHUNK_SIZE, RetryPolicy};
use serde::Serialize;
use thiserror::Error;

/// Simulate one file transfer over a fading wireless link.
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "ftsim", version, about, long_about = None)]
pub struct Config {
    /// File to send
    #[arg(long, env = "FTSIM_INPUT_FILE")]
    pub input_file: PathBuf,

    /// Where the receiver writes what it got
    #[arg(long, env = "FTSIM_OUTPUT_FILE")]
    pub output_file: PathBuf,

    /// Distance between the two nodes, in metres
    #[arg(long, env = "FTSIM_DISTANCE", default_value_t = 30.0)]
    pub distance: f64,

    #[arg(long, env = "FTSIM_PHY_STANDARD", value_enum, default_value_t = PhyStandard::Dot11g)]
    pub phy_standard: PhyStandard,

    /// Link-layer segment size in bytes
    #[arg(long, env = "FTSIM_PACKET_SIZE", default_value_t = 512)]
    pub packet_size: usize,

    /// Nominal inter-packet interval in seconds (recorded, not used for pacing)
    #[arg(long, env = "FTSIM_INTERVAL", default_value_t = 0.1)]
    pub interval: f64,

    /// Nakagami shape below 80 m
    #[arg(long, env = "FTSIM_M0", default_value_t = 1.0)]
    pub m0: f64,

    /// Nakagami shape from 80 m to 250 m
    #[arg(long, env = "FTSIM_M1", default_value_t = 1.0)]
    pub m1: f64,

    /// Nakagami shape beyond 250 m
    #[arg(long, env = "FTSIM_M2", default_value_t = 1.0)]
    pub m2: f64,

    #[arg(long, env = "FTSIM_PORT", default_value_t = ftsim_engine::DEFAULT_PORT)]
    pub port: u16,

    /// Bytes per application write (1..=1024)
    #[arg(long, env = "FTSIM_CHUNK_SIZE", default_value_t = MAX_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Seconds between connection attempts
    #[arg(long, env = "FTSIM_RETRY_DELAY", default_value_t = 1.0)]
    pub retry_delay: f64,

    /// Give up after this many retries (unlimited if unset)
    #[arg(long, env = "FTSIM_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Hard stop for the simulation, in seconds of virtual time
    #[arg(long, env = "FTSIM_MAX_TIME", default_value_t = 3600.0)]
    pub max_time: f64,

    /// Seed for the fading generator
    #[arg(long, env = "FTSIM_SEED", default_value_t = 1)]
    pub seed: u64,

    /// When the receiver starts listening, in seconds
    #[arg(long, env = "FTSIM_RECEIVER_START", default_value_t = 1.0)]
    pub receiver_start: f64,

    /// When the sender makes its first connection attempt, in seconds
    #[arg(long, env = "FTSIM_SENDER_START", default_value_t = 2.0)]
    pub sender_start: f64,

    #[arg(
        long,
        env = "FTSIM_LATENCY_LOG",
        default_value = ftsim_metrics::DEFAULT_LATENCY_LOG
    )]
    pub latency_log: PathBuf,

    #[arg(
        long,
        env = "FTSIM_CHANNEL_LOG",
        default_value = ftsim_metrics::DEFAULT_CHANNEL_LOG
    )]
    pub channel_log: PathBuf,

    #[arg(
        long,
        env = "FTSIM_THROUGHPUT_LOG",
        default_value = ftsim_metrics::DEFAULT_THROUGHPUT_LOG
    )]
    pub throughput_log: PathBuf,

    /// Write a JSON run report here
    #[arg(long, env = "FTSIM_REPORT")]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum PhyStandard {
    #[value(name = "802.11g")]
    #[serde(rename = "802.11g")]
    Dot11g,
    #[value(name = "802.11n")]
    #[serde(rename = "802.11n")]
    Dot11n,
}

impl PhyStandard {
    /// Data rate of the link in bits per second.
    pub fn rate_bps(self) -> f64 {
        match self {
            Self::Dot11g => 54.0e6,
            Self::Dot11n => 72.2e6,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),

    #[error("{name} must be a positive number, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} must be zero or more, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("packet size must be at least 1 byte")]
    ZeroPacketSize,

    #[error("chunk size {0} outside 1..={max}", max = MAX_CHUNK_SIZE)]
    ChunkSize(usize),
}

impl Config {
    /// Defaults for everything except the two required paths.
    pub fn new(input_file: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: output_file.into(),
            distance: 30.0,
            phy_standard: PhyStandard::Dot11g,
            packet_size: 512,
            interval: 0.1,
            m0: 1.0,
            m1: 1.0,
            m2: 1.0,
            port: ftsim_engine::DEFAULT_PORT,
            chunk_size: MAX_CHUNK_SIZE,
            retry_delay: 1.0,
            max_retries: None,
            max_time: 3600.0,
            seed: 1,
            receiver_start: 1.0,
            sender_start: 2.0,
            latency_log: ftsim_metrics::DEFAULT_LATENCY_LOG.into(),
            channel_log: ftsim_metrics::DEFAULT_CHANNEL_LOG.into(),
            throughput_log: ftsim_metrics::DEFAULT_THROUGHPUT_LOG.into(),
            report: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("input file", &self.input_file),
            ("output file", &self.output_file),
            ("latency log", &self.latency_log),
            ("channel log", &self.channel_log),
            ("throughput log", &self.throughput_log),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath(name));
            }
        }

        for (name, value) in [
            ("distance", self.distance),
            ("m0", self.m0),
            ("m1", self.m1),
            ("m2", self.m2),
            ("max time", self.max_time),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        for (name, value) in [
            ("interval", self.interval),
            ("retry delay", self.retry_delay),
            ("receiver start", self.receiver_start),
            ("sender start", self.sender_start),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Negative { name, value });
            }
        }

        if self.packet_size == 0 {
            return Err(ConfigError::ZeroPacketSize);
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::try_from_secs_f64(self.retry_delay)
                .unwrap_or(ftsim_engine::DEFAULT_RETRY_DELAY),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        let mut argv = vec!["ftsim", "--input-file", "in.bin", "--output-file", "out.bin"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv)
    }

    #[test]
    fn defaults_match_constructor() {
        let parsed = parse(&[]).unwrap();
        let built = Config::new("in.bin", "out.bin");

        assert_eq!(parsed.distance, built.distance);
        assert_eq!(parsed.packet_size, 512);
        assert_eq!(parsed.chunk_size, 1024);
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.phy_standard, PhyStandard::Dot11g);
        assert_eq!(parsed.max_retries, None);
        assert_eq!(parsed.latency_log, built.latency_log);
        assert_eq!(parsed.channel_log, built.channel_log);
        assert_eq!(parsed.throughput_log, built.throughput_log);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn paths_are_required() {
        assert!(Config::try_parse_from(["ftsim", "--input-file", "in.bin"]).is_err());
    }

    #[test]
    fn phy_standard_names() {
        let cfg = parse(&["--phy-standard", "802.11n"]).unwrap();
        assert_eq!(cfg.phy_standard, PhyStandard::Dot11n);
        assert_eq!(cfg.phy_standard.rate_bps(), 72.2e6);
        assert!(parse(&["--phy-standard", "802.11b"]).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::new("in.bin", "out.bin");
        cfg.chunk_size = 2048;
        assert_eq!(cfg.validate(), Err(ConfigError::ChunkSize(2048)));

        let mut cfg = Config::new("in.bin", "out.bin");
        cfg.distance = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotPositive { name: "distance", .. })
        ));

        let mut cfg = Config::new("in.bin", "out.bin");
        cfg.m1 = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::new("", "out.bin");
        cfg.packet_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyPath("input file")));

        let mut cfg = Config::new("in.bin", "out.bin");
        cfg.retry_delay = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Negative { .. })));
    }

    #[test]
    fn retry_policy_follows_options() {
        let mut cfg = parse(&["--retry-delay", "0.25", "--max-retries", "3"]).unwrap();
        let policy = cfg.retry_policy();
        assert_eq!(policy.delay, Duration::from_millis(250));
        assert_eq!(policy.max_retries, Some(3));

        cfg.max_retries = None;
        assert_eq!(cfg.retry_policy().max_retries, None);
    }
}
