use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use super::Transport;
use crate::error::{Result, RoadTrackerError};

type Topics = HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>;

/// In-process broker: every subscriber of a topic receives every message,
/// in publish order.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<Topics>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, capacity: usize) -> Result<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut topics = self.lock()?;
        topics.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|t| t.get(topic).map(|subs| subs.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Topics>> {
        self.topics
            .lock()
            .map_err(|_| RoadTrackerError::TransportUnavailable("broker lock poisoned".to_string()))
    }

    async fn deliver(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        // Snapshot so the lock is not held across awaits
        let subscribers = self.lock()?.get(topic).cloned().unwrap_or_default();

        let mut closed = 0;
        for tx in &subscribers {
            if tx.send(payload.clone()).await.is_err() {
                closed += 1;
            }
        }

        if closed > 0 {
            let mut topics = self.lock()?;
            if let Some(subs) = topics.get_mut(topic) {
                subs.retain(|tx| !tx.is_closed());
            }
            log::debug!("Pruned {} closed subscriber(s) from topic {}", closed, topic);
        }

        Ok(())
    }
}

impl Transport for InMemoryBroker {
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        self.deliver(topic, payload).boxed()
    }
}
