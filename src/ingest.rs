use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::broadcaster::Broadcaster;
use crate::error::{Result, RoadTrackerError};
use crate::storage::RecordStore;
use crate::types::{ClassifiedSample, PersistedRecord, UserId};

/// Which users are notified after a batch commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FanoutPolicy {
    /// Each distinct user in the batch receives exactly their own rows
    #[default]
    PerUser,
    /// Legacy behaviour: the first sample's user receives every row
    FirstSampleUser,
}

impl FromStr for FanoutPolicy {
    type Err = RoadTrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per-user" => Ok(FanoutPolicy::PerUser),
            "first-sample" => Ok(FanoutPolicy::FirstSampleUser),
            other => Err(RoadTrackerError::MalformedInput(format!(
                "unknown fan-out policy '{}'",
                other
            ))),
        }
    }
}

/// Persists incoming batches and triggers fan-out.
///
/// Persistence is the durability guarantee; fan-out runs only after a
/// successful commit and its failures never reach the caller.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn RecordStore>,
    broadcaster: Broadcaster,
    policy: FanoutPolicy,
}

impl IngestService {
    pub fn new(store: Arc<dyn RecordStore>, broadcaster: Broadcaster) -> Self {
        Self::with_policy(store, broadcaster, FanoutPolicy::default())
    }

    pub fn with_policy(
        store: Arc<dyn RecordStore>,
        broadcaster: Broadcaster,
        policy: FanoutPolicy,
    ) -> Self {
        IngestService {
            store,
            broadcaster,
            policy,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn ingest(&self, samples: Vec<ClassifiedSample>) -> Result<Vec<PersistedRecord>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        // Commit and fan-out share one detached task; dropping the caller
        // cannot skip notification of a committed batch.
        let service = self.clone();
        tokio::spawn(async move { service.commit_and_notify(samples).await })
            .await
            .map_err(|e| {
                RoadTrackerError::PersistenceFailure(format!("ingest task failed: {}", e))
            })?
    }

    async fn commit_and_notify(
        &self,
        samples: Vec<ClassifiedSample>,
    ) -> Result<Vec<PersistedRecord>> {
        let store = self.store.clone();
        let records = blocking(move || store.commit_batch(&samples))
            .await
            .map_err(|e| {
                log::error!("Batch rolled back: {}", e);
                e
            })?;

        log::info!("Committed batch of {} record(s)", records.len());
        self.fan_out(&records);
        Ok(records)
    }

    fn fan_out(&self, records: &[PersistedRecord]) {
        match self.policy {
            FanoutPolicy::PerUser => {
                for (user_id, rows) in group_by_user(records) {
                    self.broadcaster.notify(user_id, &rows);
                }
            }
            FanoutPolicy::FirstSampleUser => {
                if let Some(first) = records.first() {
                    self.broadcaster.notify(first.user_id, records);
                }
            }
        }
    }

    pub async fn get(&self, id: i64) -> Result<PersistedRecord> {
        let store = self.store.clone();
        blocking(move || store.get_by_id(id))
            .await?
            .ok_or(RoadTrackerError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<PersistedRecord>> {
        let store = self.store.clone();
        blocking(move || store.list_all()).await
    }

    pub async fn update(&self, id: i64, sample: ClassifiedSample) -> Result<usize> {
        let store = self.store.clone();
        let affected = blocking(move || store.update_by_id(id, &sample)).await?;
        if affected == 0 {
            return Err(RoadTrackerError::NotFound(id));
        }
        Ok(affected)
    }

    pub async fn delete(&self, id: i64) -> Result<usize> {
        let store = self.store.clone();
        let affected = blocking(move || store.delete_by_id(id)).await?;
        if affected == 0 {
            return Err(RoadTrackerError::NotFound(id));
        }
        Ok(affected)
    }
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RoadTrackerError::PersistenceFailure(format!("store task failed: {}", e)))?
}

/// Rows grouped by user, users in order of first appearance
fn group_by_user(records: &[PersistedRecord]) -> Vec<(UserId, Vec<PersistedRecord>)> {
    let mut groups: Vec<(UserId, Vec<PersistedRecord>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(user_id, _)| *user_id == record.user_id) {
            Some((_, rows)) => rows.push(record.clone()),
            None => groups.push((record.user_id, vec![record.clone()])),
        }
    }
    groups
}

/// Transport subscription handler: ingests every batch message until the
/// channel closes.
pub async fn run_consumer(mut rx: mpsc::Receiver<Vec<u8>>, service: IngestService) {
    while let Some(message) = rx.recv().await {
        let samples: Vec<ClassifiedSample> = match serde_json::from_slice(&message) {
            Ok(samples) => samples,
            Err(e) => {
                let err = RoadTrackerError::MalformedInput(e.to_string());
                log::warn!("Skipping undecodable batch message: {}", err);
                continue;
            }
        };

        if let Err(e) = service.ingest(samples).await {
            log::error!("Ingest from transport failed: {}", e);
        }
    }
    log::info!("Transport consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubscriptionRegistry;
    use crate::storage::SqliteStore;
    use crate::types::{RawAccelSample, RawGpsFix, UnifiedSample};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample(user_id: UserId, road_state: &str) -> ClassifiedSample {
        ClassifiedSample {
            road_state: road_state.to_string(),
            agent_data: UnifiedSample {
                user_id,
                accelerometer: RawAccelSample::new(1, 2, 3),
                gps: RawGpsFix::new(30.52, 50.45),
                timestamp: Utc::now(),
            },
        }
    }

    /// Store that counts calls and stores nothing
    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    impl RecordStore for CountingStore {
        fn commit_batch(&self, _samples: &[ClassifiedSample]) -> Result<Vec<PersistedRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        fn get_by_id(&self, _id: i64) -> Result<Option<PersistedRecord>> {
            Ok(None)
        }
        fn list_all(&self) -> Result<Vec<PersistedRecord>> {
            Ok(Vec::new())
        }
        fn update_by_id(&self, _id: i64, _sample: &ClassifiedSample) -> Result<usize> {
            Ok(0)
        }
        fn delete_by_id(&self, _id: i64) -> Result<usize> {
            Ok(0)
        }
    }

    fn service_with(policy: FanoutPolicy) -> (IngestService, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = IngestService::with_policy(store, Broadcaster::new(registry.clone()), policy);
        (service, registry)
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let store = Arc::new(CountingStore::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut conn = registry.open();
        let mut rx = registry.subscribe(&mut conn, 1).unwrap();

        let service = IngestService::new(store.clone(), Broadcaster::new(registry));
        let records = service.ingest(Vec::new()).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_row_leaves_nothing_visible() {
        let (service, registry) = service_with(FanoutPolicy::PerUser);
        let mut conn = registry.open();
        let mut rx = registry.subscribe(&mut conn, 1).unwrap();

        let batch = vec![sample(1, "Smooth"), sample(1, ""), sample(1, "Rough")];
        let err = service.ingest(batch).await.unwrap_err();

        assert!(matches!(err, RoadTrackerError::PersistenceFailure(_)));
        assert!(service.list().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_per_user_fan_out() {
        let (service, registry) = service_with(FanoutPolicy::PerUser);
        let mut c1 = registry.open();
        let mut c2 = registry.open();
        let mut rx1 = registry.subscribe(&mut c1, 1).unwrap();
        let mut rx2 = registry.subscribe(&mut c2, 2).unwrap();

        let batch = vec![sample(1, "Smooth"), sample(2, "Rough"), sample(1, "Rough")];
        let records = service.ingest(batch).await.unwrap();
        assert_eq!(records.len(), 3);

        let to_user1: Vec<PersistedRecord> =
            serde_json::from_str(&rx1.recv().await.unwrap()).unwrap();
        let to_user2: Vec<PersistedRecord> =
            serde_json::from_str(&rx2.recv().await.unwrap()).unwrap();

        assert_eq!(to_user1, vec![records[0].clone(), records[2].clone()]);
        assert_eq!(to_user2, vec![records[1].clone()]);
    }

    #[tokio::test]
    async fn test_first_sample_policy_notifies_one_user() {
        let (service, registry) = service_with(FanoutPolicy::FirstSampleUser);
        let mut c1 = registry.open();
        let mut c2 = registry.open();
        let mut rx1 = registry.subscribe(&mut c1, 1).unwrap();
        let mut rx2 = registry.subscribe(&mut c2, 2).unwrap();

        service
            .ingest(vec![sample(1, "Smooth"), sample(2, "Rough")])
            .await
            .unwrap();

        let to_user1: Vec<PersistedRecord> =
            serde_json::from_str(&rx1.recv().await.unwrap()).unwrap();
        assert_eq!(to_user1.len(), 2);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_keyed_operations_distinguish_not_found() {
        let (service, _registry) = service_with(FanoutPolicy::PerUser);
        let records = service.ingest(vec![sample(3, "Smooth")]).await.unwrap();
        let id = records[0].id;

        assert_eq!(service.get(id).await.unwrap(), records[0]);
        assert!(matches!(
            service.get(id + 1).await,
            Err(RoadTrackerError::NotFound(_))
        ));

        assert_eq!(service.update(id, sample(3, "Rough")).await.unwrap(), 1);
        assert!(matches!(
            service.update(id + 1, sample(3, "Rough")).await,
            Err(RoadTrackerError::NotFound(_))
        ));

        assert_eq!(service.delete(id).await.unwrap(), 1);
        assert!(matches!(
            service.delete(id).await,
            Err(RoadTrackerError::NotFound(_))
        ));
    }

    /// SQLite store whose commits take a while
    struct SlowStore {
        inner: SqliteStore,
        delay: std::time::Duration,
    }

    impl RecordStore for SlowStore {
        fn commit_batch(&self, samples: &[ClassifiedSample]) -> Result<Vec<PersistedRecord>> {
            std::thread::sleep(self.delay);
            self.inner.commit_batch(samples)
        }
        fn get_by_id(&self, id: i64) -> Result<Option<PersistedRecord>> {
            self.inner.get_by_id(id)
        }
        fn list_all(&self) -> Result<Vec<PersistedRecord>> {
            self.inner.list_all()
        }
        fn update_by_id(&self, id: i64, sample: &ClassifiedSample) -> Result<usize> {
            self.inner.update_by_id(id, sample)
        }
        fn delete_by_id(&self, id: i64) -> Result<usize> {
            self.inner.delete_by_id(id)
        }
    }

    #[tokio::test]
    async fn test_abandoned_ingest_still_notifies() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = Arc::new(SlowStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            delay: std::time::Duration::from_millis(200),
        });
        let service = IngestService::new(store, Broadcaster::new(registry.clone()));
        let mut conn = registry.open();
        let mut rx = registry.subscribe(&mut conn, 4).unwrap();

        // Caller gives up while the commit is still running
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            service.ingest(vec![sample(4, "Smooth"), sample(4, "Rough")]),
        )
        .await;
        assert!(abandoned.is_err());

        let payload = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let delivered: Vec<PersistedRecord> = serde_json::from_str(&payload).unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(service.list().await.unwrap(), delivered);
    }

    #[tokio::test]
    async fn test_consumer_skips_bad_messages() {
        let (service, _registry) = service_with(FanoutPolicy::PerUser);
        let (tx, rx) = mpsc::channel(4);

        tx.send(b"not json".to_vec()).await.unwrap();
        tx.send(serde_json::to_vec(&vec![sample(5, "Smooth")]).unwrap())
            .await
            .unwrap();
        drop(tx);

        run_consumer(rx, service.clone()).await;
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("per-user".parse::<FanoutPolicy>().unwrap(), FanoutPolicy::PerUser);
        assert_eq!(
            "first-sample".parse::<FanoutPolicy>().unwrap(),
            FanoutPolicy::FirstSampleUser
        );
        assert!("everyone".parse::<FanoutPolicy>().is_err());
    }
}
