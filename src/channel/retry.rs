use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Channel;
use crate::error::ChannelError;
use crate::types::Envelope;

/// Reconnect-and-retry policy for publishing over a flaky transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(base.min(self.max_delay_ms as f64) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Publishes, retrying transient failures with exponential backoff.
pub async fn publish_with_retry(
    channel: &dyn Channel,
    envelope: Envelope,
    policy: &RetryPolicy,
) -> Result<(), ChannelError> {
    let mut attempt = 0;
    loop {
        match channel.publish(envelope.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                log::warn!(
                    "Publish on {} failed ({}), retrying in {:?}",
                    envelope.topic.as_str(),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
