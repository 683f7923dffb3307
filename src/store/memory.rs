use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use super::watch::WatchRegistry;
use super::{
    CasOutcome, CollectionSnapshot, KeyValueStore, Record, StoreError, StoreResult, Subscription,
    SubscriptionHandle, Versioned,
};

type Collections = HashMap<String, BTreeMap<String, Versioned>>;

/// In-process store. Every operation is atomic under one lock, so
/// `compare_and_set` is linearizable.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
    watchers: WatchRegistry,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backend were unreachable. Watchers get
    /// the failure pushed to them.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
        let collections: Vec<String> = self.lock().keys().cloned().collect();
        for collection in collections {
            self.watchers.publish_error(&collection, "store is offline");
        }
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(collections: &Collections, collection: &str) -> CollectionSnapshot {
        collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, versioned)| (id.clone(), versioned.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Notify while still holding the data lock so deliveries keep commit order.
    fn notify(&self, collections: &Collections, collection: &str) {
        if self.watchers.is_watched(collection) {
            self.watchers
                .publish(collection, &Self::snapshot(collections, collection));
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn generate_id(&self, _collection: &str) -> StoreResult<String> {
        self.ensure_online()?;
        Ok(Uuid::now_v7().simple().to_string())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Versioned>> {
        self.ensure_online()?;
        Ok(self
            .lock()
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn list(&self, collection: &str) -> StoreResult<CollectionSnapshot> {
        self.ensure_online()?;
        Ok(Self::snapshot(&self.lock(), collection))
    }

    async fn set(&self, collection: &str, id: &str, record: Record) -> StoreResult<u64> {
        self.ensure_online()?;
        let mut collections = self.lock();
        let records = collections.entry(collection.to_string()).or_default();
        let version = records.get(id).map_or(1, |current| current.version + 1);
        records.insert(id.to_string(), Versioned { version, record });
        self.notify(&collections, collection);
        Ok(version)
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        record: Record,
    ) -> StoreResult<CasOutcome> {
        self.ensure_online()?;
        let mut collections = self.lock();
        let records = collections.entry(collection.to_string()).or_default();
        let current = records.get(id);
        if current.map(|versioned| versioned.version) != expected {
            return Ok(CasOutcome::Conflict {
                current: current.cloned(),
            });
        }

        let version = expected.map_or(1, |v| v + 1);
        records.insert(id.to_string(), Versioned { version, record });
        self.notify(&collections, collection);
        Ok(CasOutcome::Applied { version })
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.ensure_online()?;
        let mut collections = self.lock();
        let removed = collections
            .get_mut(collection)
            .and_then(|records| records.remove(id))
            .is_some();
        if removed {
            self.notify(&collections, collection);
        }
        Ok(())
    }

    async fn subscribe_all(&self, collection: &str) -> StoreResult<Subscription<CollectionSnapshot>> {
        self.ensure_online()?;
        let collections = self.lock();
        Ok(self
            .watchers
            .watch_all(collection, Self::snapshot(&collections, collection)))
    }

    async fn subscribe_one(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<Subscription<Option<Versioned>>> {
        self.ensure_online()?;
        let collections = self.lock();
        let current = collections
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned();
        Ok(self.watchers.watch_one(collection, id, current))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.watchers.remove(handle)
    }
}
