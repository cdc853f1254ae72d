//! Discrete-event host for the file-transfer engine.
//!
//! Provides a deterministic scheduler, a two-node wireless link with a
//! reliable stream transport on top, and [`run`], which wires the sender
//! and receiver state machines to them and collects the metrics.

pub mod config;
pub mod flow;
pub mod network;
pub mod radio;
pub mod run;
pub mod scheduler;

pub use config::{Config, ConfigError, PhyStandard};
pub use run::{RunReport, run};
pub use scheduler::{RunEnd, Scheduler};
