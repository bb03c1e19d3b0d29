//! Process-wide cancellation shared by every worker.

use std::time::Duration;

use tokio::sync::watch;

/// Fires the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the shutdown signal at worker suspension points.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger/observer pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is triggered (or the trigger is dropped).
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless shutdown comes first.
    ///
    /// Returns `true` if the full duration elapsed, `false` on shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.triggered() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_completes_without_trigger() {
        let (_trigger, mut shutdown) = channel();
        assert!(shutdown.sleep(Duration::from_millis(5)).await);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn trigger_interrupts_sleep() {
        let (trigger, mut shutdown) = channel();
        let sleeper = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        trigger.trigger();
        assert!(!sleeper.await.expect("sleeper task"));
    }

    #[tokio::test]
    async fn clones_observe_the_same_signal() {
        let (trigger, shutdown) = channel();
        let mut other = shutdown.clone();
        trigger.trigger();
        other.triggered().await;
        assert!(shutdown.is_triggered());
    }
}
