use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::RoadTrackerError;
use crate::registry::{Payload, SubscriptionRegistry};
use crate::types::{PersistedRecord, UserId};

/// Outcome of one `notify` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Queue full: the subscriber is too slow, this update is lost for it
    pub dropped: usize,
    /// Receiver gone: handle pruned from the registry
    pub pruned: usize,
}

/// Pushes newly persisted records to the live connections of their user.
///
/// Delivery is best-effort and at most once per live connection: only
/// connections subscribed at the moment of the call are considered, and a
/// slow or vanished connection never blocks the others.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Broadcaster { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn notify(&self, user_id: UserId, records: &[PersistedRecord]) -> FanoutReport {
        let mut report = FanoutReport::default();

        let subscribers = self.registry.snapshot(user_id);
        if subscribers.is_empty() || records.is_empty() {
            return report;
        }

        let payload: Payload = match serde_json::to_string(records) {
            Ok(json) => json.into(),
            Err(e) => {
                log::error!("Failed to serialize fan-out for user {}: {}", user_id, e);
                return report;
            }
        };

        for (conn_id, tx) in subscribers {
            match tx.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let err = RoadTrackerError::SubscriberUnreachable(format!(
                        "connection {} queue full",
                        conn_id
                    ));
                    log::warn!("Dropping update for user {}: {}", user_id, err);
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    self.registry.remove(user_id, conn_id);
                    report.pruned += 1;
                }
            }
        }

        log::debug!(
            "Fan-out user {}: {} record(s) -> delivered {}, dropped {}, pruned {}",
            user_id,
            records.len(),
            report.delivered,
            report.dropped,
            report.pruned
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, user_id: UserId) -> PersistedRecord {
        PersistedRecord {
            id,
            road_state: "Smooth".to_string(),
            user_id,
            x: 1,
            y: 2,
            z: 3,
            latitude: 50.45,
            longitude: 30.52,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_no_subscribers_is_noop() {
        let broadcaster = Broadcaster::new(Arc::new(SubscriptionRegistry::new()));
        let report = broadcaster.notify(7, &[record(1, 7)]);
        assert_eq!(report, FanoutReport::default());
    }

    #[tokio::test]
    async fn test_delivers_to_every_connection_of_user() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let mut a = registry.open();
        let mut b = registry.open();
        let mut other = registry.open();
        let mut rx_a = registry.subscribe(&mut a, 7).unwrap();
        let mut rx_b = registry.subscribe(&mut b, 7).unwrap();
        let mut rx_other = registry.subscribe(&mut other, 8).unwrap();

        let report = broadcaster.notify(7, &[record(1, 7), record(2, 7)]);
        assert_eq!(report.delivered, 2);

        let payload = rx_a.recv().await.unwrap();
        let decoded: Vec<PersistedRecord> = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(rx_b.recv().await.is_some());
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnected_connection_not_notified() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let mut conn = registry.open();
        let mut rx = registry.subscribe(&mut conn, 7).unwrap();
        registry.close(&mut conn);

        let report = broadcaster.notify(7, &[record(1, 7)]);
        assert_eq!(report.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_does_not_block_others() {
        let registry = Arc::new(SubscriptionRegistry::with_queue_capacity(1));
        let broadcaster = Broadcaster::new(registry.clone());

        let mut slow = registry.open();
        let mut fast = registry.open();
        let _rx_slow = registry.subscribe(&mut slow, 7).unwrap();
        let mut rx_fast = registry.subscribe(&mut fast, 7).unwrap();

        broadcaster.notify(7, &[record(1, 7)]);
        rx_fast.try_recv().unwrap();

        // Slow queue is still full from the first update
        let report = broadcaster.notify(7, &[record(2, 7)]);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert!(rx_fast.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_receiver_pruned() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let mut conn = registry.open();
        let rx = registry.subscribe(&mut conn, 7).unwrap();
        drop(rx);

        let report = broadcaster.notify(7, &[record(1, 7)]);
        assert_eq!(report.pruned, 1);
        assert_eq!(registry.subscriber_count(7), 0);
    }
}
