//! Value types shared by the transfer engine, the metrics sinks and the
//! simulation host.

pub mod metrics;
pub mod models;

pub use metrics::{ChannelSample, FlowStats};
pub use models::{ExpectedSize, SimTime, TransferStart};
