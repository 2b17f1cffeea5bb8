//! Fire-and-forget push of committed prices to real-time subscribers.

use tokio::sync::broadcast;
use tracing::trace;

use crate::market_data::PriceNotification;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub. Late joiners get nothing from before they subscribed and
/// slow receivers skip ahead when they lag.
#[derive(Debug, Clone)]
pub struct PriceNotifier {
    tx: broadcast::Sender<PriceNotification>,
}

impl Default for PriceNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PriceNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the notification.
    pub fn notify(&self, notification: PriceNotification) -> usize {
        // Having no subscribers is normal.
        let receivers = self.tx.send(notification).unwrap_or(0);
        trace!(receivers, "price notification sent");
        receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceNotification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
