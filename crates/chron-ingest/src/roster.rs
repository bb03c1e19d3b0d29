//! Latest known team documents, shared between the stream and pollers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::shutdown::Shutdown;

/// Readiness gate and roster cache.
///
/// Empty until the first team collection is published; the five-minute
/// poller waits on that before its first tick.
#[derive(Debug, Clone)]
pub struct RosterState {
    tx: Arc<watch::Sender<Option<Arc<Vec<Value>>>>>,
}

impl Default for RosterState {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the cached teams. An empty collection is ignored.
    pub fn publish(&self, teams: Vec<Value>) {
        if teams.is_empty() {
            return;
        }
        tracing::debug!(teams = teams.len(), "roster updated");
        self.tx.send_replace(Some(Arc::new(teams)));
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<Vec<Value>>> {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Poll at `interval` until a roster is present.
    ///
    /// Returns `false` if shutdown arrived first.
    pub async fn wait_ready(&self, interval: Duration, shutdown: &mut Shutdown) -> bool {
        loop {
            if self.is_ready() {
                return true;
            }
            if !shutdown.sleep(interval).await {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use serde_json::json;

    #[test]
    fn empty_publish_keeps_gate_closed() {
        let roster = RosterState::new();
        roster.publish(Vec::new());
        assert!(!roster.is_ready());
        assert!(roster.current().is_none());
    }

    #[tokio::test]
    async fn wait_returns_once_published() {
        let roster = RosterState::new();
        let (_trigger, mut stop) = shutdown::channel();

        let publisher = roster.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(vec![json!({"id": "t1", "lineup": ["p1"]})]);
        });

        assert!(roster.wait_ready(Duration::from_millis(5), &mut stop).await);
        assert_eq!(roster.current().expect("roster").len(), 1);
    }

    #[tokio::test]
    async fn wait_gives_up_on_shutdown() {
        let roster = RosterState::new();
        let (trigger, mut stop) = shutdown::channel();
        trigger.trigger();
        assert!(!roster.wait_ready(Duration::from_secs(60), &mut stop).await);
    }
}
