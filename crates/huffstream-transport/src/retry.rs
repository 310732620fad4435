//! Fixed-delay connection retry.

use crate::channel::{BoxedChannel, ChannelResult};
use crate::tcp::Connector;
use std::time::Duration;

/// How many times to dial and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts (0 is treated as 1)
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: Duration::from_secs(5),
        }
    }
}

/// Dial `host:port`, retrying transient failures per `policy`
///
/// # Errors
/// Returns the last error once attempts are exhausted, or the first
/// non-transient error immediately.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    host: &str,
    port: u16,
    policy: RetryPolicy,
) -> ChannelResult<BoxedChannel> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match connector.connect(host, port).await {
            Ok(channel) => return Ok(channel),
            Err(err) if err.is_transient() && attempt < attempts => {
                tracing::warn!(
                    host,
                    port,
                    attempt,
                    attempts,
                    error = %err,
                    "connection attempt failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
