//! At-least-once transport between the poller (or publish endpoint) and the
//! fan-out consumers.

mod journal;
mod local;

pub use journal::EventJournal;
pub use local::{DeadLetter, LocalEventChannel};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::ConsumerConfig;
use crate::market_data::PriceEvent;
use crate::models::Id;
use crate::shutdown::ShutdownSignal;

/// Consumer side of the channel. Returning `Err` asks for redelivery.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &PriceEvent) -> Result<()>;
}

#[async_trait::async_trait]
pub trait EventChannel: Send + Sync {
    /// Returns once the event has been accepted by the transport.
    async fn publish(&self, event: PriceEvent) -> Result<()>;

    /// Start one more competing consumer on the shared subscription.
    fn subscribe(&self, handler: Arc<dyn EventHandler>, shutdown: ShutdownSignal) -> JoinHandle<()>;
}

/// An event plus its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Id,
    pub event: PriceEvent,
    /// 1 on first delivery.
    pub attempt: u32,
}

impl Envelope {
    pub fn new(id: Id, event: PriceEvent) -> Self {
        Self {
            id,
            event,
            attempt: 1,
        }
    }
}

/// Exponential redelivery backoff, capped, with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Delay before redelivering an envelope whose `attempt` just failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Envelopes handled successfully.
    pub delivered: u64,
    /// Failed deliveries scheduled for another attempt.
    pub redelivered: u64,
    pub dead_lettered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }
}
