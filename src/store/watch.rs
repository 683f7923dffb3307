use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use super::{CollectionSnapshot, Delivery, Subscription, SubscriptionHandle, Versioned};

enum Target {
    All(watch::Sender<Delivery<CollectionSnapshot>>),
    One {
        id: String,
        tx: watch::Sender<Delivery<Option<Versioned>>>,
    },
}

struct Watcher {
    collection: String,
    target: Target,
}

/// Subscriber bookkeeping shared by the store backends.
///
/// Each subscriber holds a single slot that every publish overwrites, so an
/// idle subscriber costs one snapshot no matter how many writes it misses.
/// Callers are responsible for ordering: the initial value handed to `watch_*`
/// must not be older than anything `publish` can deliver afterwards.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    next_handle: AtomicU64,
    watchers: Mutex<HashMap<SubscriptionHandle, Watcher>>,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn watch_all(
        &self,
        collection: &str,
        initial: CollectionSnapshot,
    ) -> Subscription<CollectionSnapshot> {
        let handle = self.allocate();
        let (tx, rx) = watch::channel(Delivery::Ready(initial));
        self.lock().insert(
            handle,
            Watcher {
                collection: collection.to_string(),
                target: Target::All(tx),
            },
        );
        tracing::debug!(collection, handle = handle.0, "collection subscription registered");
        Subscription::new(handle, rx)
    }

    pub(crate) fn watch_one(
        &self,
        collection: &str,
        id: &str,
        initial: Option<Versioned>,
    ) -> Subscription<Option<Versioned>> {
        let handle = self.allocate();
        let (tx, rx) = watch::channel(Delivery::Ready(initial));
        self.lock().insert(
            handle,
            Watcher {
                collection: collection.to_string(),
                target: Target::One {
                    id: id.to_string(),
                    tx,
                },
            },
        );
        tracing::debug!(collection, id, handle = handle.0, "record subscription registered");
        Subscription::new(handle, rx)
    }

    pub(crate) fn remove(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.lock().remove(&handle).is_some();
        if removed {
            tracing::debug!(handle = handle.0, "subscription released");
        }
        removed
    }

    pub(crate) fn is_watched(&self, collection: &str) -> bool {
        self.lock().values().any(|w| w.collection == collection)
    }

    /// Push the post-write state of `collection` to its watchers.
    pub(crate) fn publish(&self, collection: &str, snapshot: &CollectionSnapshot) {
        let mut watchers = self.lock();
        watchers.retain(|_, watcher| {
            if watcher.collection != collection {
                return true;
            }
            match &watcher.target {
                Target::All(tx) => tx.send(Delivery::Ready(snapshot.clone())).is_ok(),
                Target::One { id, tx } => {
                    let current = snapshot
                        .iter()
                        .find(|(key, _)| key == id)
                        .map(|(_, versioned)| versioned.clone());
                    tx.send(Delivery::Ready(current)).is_ok()
                }
            }
        });
    }

    /// Deliver a failure in-band to every watcher of `collection`.
    pub(crate) fn publish_error(&self, collection: &str, reason: &str) {
        let mut watchers = self.lock();
        watchers.retain(|_, watcher| {
            if watcher.collection != collection {
                return true;
            }
            match &watcher.target {
                Target::All(tx) => tx.send(Delivery::Failed(reason.to_string())).is_ok(),
                Target::One { tx, .. } => tx.send(Delivery::Failed(reason.to_string())).is_ok(),
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionHandle, Watcher>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use futures::FutureExt;
    use serde_json::json;

    fn versioned(version: u64, origin: &str) -> Versioned {
        let record = json!({ "origin": origin }).as_object().cloned().unwrap();
        Versioned { version, record }
    }

    #[tokio::test]
    async fn test_initial_value_then_updates() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_all("rides", vec![]);

        assert!(sub.next().await.unwrap().unwrap().is_empty());

        registry.publish("rides", &vec![("a".to_string(), versioned(1, "Nairobi"))]);
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "a");
    }

    #[tokio::test]
    async fn test_single_key_watcher_sees_only_its_key() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_one("rides", "b", None);
        assert_eq!(sub.next().await.unwrap().unwrap(), None);

        registry.publish(
            "rides",
            &vec![
                ("a".to_string(), versioned(1, "Nairobi")),
                ("b".to_string(), versioned(3, "Thika")),
            ],
        );
        let current = sub.next().await.unwrap().unwrap().unwrap();
        assert_eq!(current.version, 3);
    }

    #[tokio::test]
    async fn test_remove_closes_stream() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_all("rides", vec![]);
        let _ = sub.next().await;

        assert!(registry.remove(sub.handle()));
        assert!(!registry.remove(sub.handle()));
        assert!(sub.next().await.is_none());
        assert!(!registry.is_watched("rides"));
    }

    #[tokio::test]
    async fn test_other_collections_are_not_notified() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_all("rides", vec![]);
        let _ = sub.next().await;

        registry.publish("events", &vec![("x".to_string(), versioned(1, "Mombasa"))]);
        assert!(sub.latest().is_none());
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_pruned() {
        let registry = WatchRegistry::new();
        let sub = registry.watch_all("rides", vec![]);
        drop(sub);

        assert!(registry.is_watched("rides"));
        registry.publish("rides", &vec![]);
        assert!(!registry.is_watched("rides"));
    }

    #[tokio::test]
    async fn test_errors_are_delivered_in_band() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_one("rides", "a", None);
        let _ = sub.next().await;

        registry.publish_error("rides", "permission denied");
        assert!(matches!(sub.next().await, Some(Err(StoreError::Unavailable(_)))));
    }

    #[tokio::test]
    async fn test_idle_subscriber_keeps_only_newest_snapshot() {
        let registry = WatchRegistry::new();
        let mut sub = registry.watch_all("rides", vec![]);
        let _ = sub.next().await;

        for version in 1..=500 {
            registry.publish("rides", &vec![("a".to_string(), versioned(version, "Nanyuki"))]);
        }

        let newest = sub.next().await.unwrap().unwrap();
        assert_eq!(newest[0].1.version, 500);
        // Nothing older is queued behind it
        assert!(sub.next().now_or_never().is_none());
        assert!(sub.latest().is_none());
    }
}
