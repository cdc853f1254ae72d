//! Protocol constants.

use std::time::Duration;

/// Largest chunk the sender hands to the transport in one call.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Fixed delay between a failed connect and the next attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Port the receiver listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 9000;
