use std::time::Duration;

use crate::protocol::DEFAULT_RETRY_DELAY;

/// When and how often the sender retries a failed connect.
///
/// The default retries forever at a fixed delay; only an external stop ends
/// it. Setting `max_retries` turns exhaustion into the sender's `Failed`
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    pub fn unlimited(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    pub fn bounded(delay: Duration, max_retries: u32) -> Self {
        Self {
            delay,
            max_retries: Some(max_retries),
        }
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn allows(&self, retries_done: u32) -> bool {
        self.max_retries.is_none_or(|max| retries_done < max)
    }
}
