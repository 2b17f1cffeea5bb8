//! Cooperative shutdown for background loops (poller, consumer workers, report job).

use tokio::sync::watch;

/// Create a linked trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even when every signal has been dropped.
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered (or the trigger was dropped).
    pub async fn cancelled(&mut self) {
        // wait_for errors only when the sender is gone, which also means "stop".
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_resolves_after_trigger() {
        let (trigger, mut signal) = channel();
        assert!(!signal.is_shutdown());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            signal.is_shutdown()
        });
        trigger.trigger();

        let stopped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("signal should resolve")
            .expect("task should not panic");
        assert!(stopped);
    }

    #[tokio::test]
    async fn late_subscribers_see_shutdown() {
        let (trigger, _signal) = channel();
        trigger.trigger();
        let mut late = trigger.signal();
        assert!(late.is_shutdown());
        late.cancelled().await;
    }
}
