use dashmap::DashMap;
use health_checks::{HealthAggregator, HubFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Registry of connected viewers with aggregate-then-notify triggers.
///
/// A trigger runs exactly one aggregation regardless of how many viewers are
/// connected, then fans a lightweight frame out to every viewer, the
/// triggering one included. Connecting or disconnecting never runs probes.
pub struct BroadcastHub {
    aggregator: Arc<HealthAggregator>,
    viewers: DashMap<u64, mpsc::UnboundedSender<HubFrame>>,
    next_viewer_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new(aggregator: Arc<HealthAggregator>) -> Self {
        Self {
            aggregator,
            viewers: DashMap::new(),
            next_viewer_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<HubFrame>) {
        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.viewers.insert(viewer_id, tx);
        debug!(viewer = viewer_id, viewers = self.viewers.len(), "viewer connected");
        (viewer_id, rx)
    }

    pub fn unregister(&self, viewer_id: u64) {
        self.viewers.remove(&viewer_id);
        debug!(viewer = viewer_id, viewers = self.viewers.len(), "viewer disconnected");
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Server-initiated trigger: aggregate once, then notify all viewers.
    pub async fn server_update(&self, reason: &str) {
        self.trigger(HubFrame::update(reason)).await;
    }

    /// Client-initiated trigger: aggregate once, then notify all viewers.
    pub async fn client_update(&self, reason: &str) {
        self.trigger(HubFrame::client_update(reason)).await;
    }

    async fn trigger(&self, frame: HubFrame) {
        let report = self.aggregator.run().await;
        info!(
            event = %frame.event,
            reason = %frame.reason,
            status = %report.total_status,
            elapsed_ms = report.total_response_time_ms,
            viewers = self.viewers.len(),
            "update triggered"
        );
        self.broadcast(frame);
    }

    fn broadcast(&self, frame: HubFrame) {
        // Snapshot the registry so viewers connecting or disconnecting
        // mid-broadcast cannot affect the iteration.
        let viewers: Vec<(u64, mpsc::UnboundedSender<HubFrame>)> = self
            .viewers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (viewer_id, tx) in viewers {
            if tx.send(frame.clone()).is_err() {
                warn!(viewer = viewer_id, "viewer channel closed; dropping viewer");
                self.viewers.remove(&viewer_id);
            }
        }
    }
}
