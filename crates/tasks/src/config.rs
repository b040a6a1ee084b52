use std::time::Duration;

/// Default delay between two status polls of a job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default time a job may stay in flight before it is failed.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(240);

/// Polling parameters of a [`TaskRegistry`](crate::TaskRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub poll_interval: Duration,
    /// Measured on the monotonic clock from the moment polling starts.
    pub poll_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}
