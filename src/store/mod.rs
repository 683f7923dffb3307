//! Schemaless document storage with per-key versioning and push subscriptions.
//!
//! Every document lives under `collection/id` as a flat JSON object. Writes bump
//! a per-key version so callers can do read-modify-write with
//! [`KeyValueStore::compare_and_set`] instead of blind overwrites.

pub mod memory;
pub mod postgres;
mod watch;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch as tokio_watch;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A stored document: a flat field map.
pub type Record = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{collection}/{id} kept changing underneath us after {attempts} attempts")]
    Contention {
        collection: String,
        id: String,
        attempts: u32,
    },

    #[error("malformed record {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub record: Record,
}

/// Every record of a collection, ordered by key.
pub type CollectionSnapshot = Vec<(String, Versioned)>;

#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Applied { version: u64 },
    /// The stored version did not match; `current` is what is there now.
    Conflict { current: Option<Versioned> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub(crate) u64);

/// What a subscriber is handed: the latest state, or the reason the store
/// could not produce it.
#[derive(Debug, Clone)]
pub(crate) enum Delivery<T> {
    Ready(T),
    Failed(String),
}

impl<T> Delivery<T> {
    fn into_result(self) -> StoreResult<T> {
        match self {
            Delivery::Ready(value) => Ok(value),
            Delivery::Failed(reason) => Err(StoreError::Unavailable(reason)),
        }
    }
}

/// Push-based view registered with a store.
///
/// The first item is the state at registration time; after that every committed
/// write replaces the pending value, so a slow reader skips straight to the
/// newest state instead of queueing every intermediate one. The stream ends
/// once the handle is unsubscribed.
#[derive(Debug)]
pub struct Subscription<T> {
    handle: SubscriptionHandle,
    rx: tokio_watch::Receiver<Delivery<T>>,
    initial_pending: bool,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(handle: SubscriptionHandle, rx: tokio_watch::Receiver<Delivery<T>>) -> Self {
        Self {
            handle,
            rx,
            initial_pending: true,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next delivery. `None` once the subscription is released.
    pub async fn next(&mut self) -> Option<StoreResult<T>> {
        if self.initial_pending {
            self.initial_pending = false;
        } else if self.rx.changed().await.is_err() {
            return None;
        }
        Some(self.rx.borrow_and_update().clone().into_result())
    }

    /// Newest delivery not yet seen, without waiting.
    pub fn latest(&mut self) -> Option<StoreResult<T>> {
        let unseen = self.initial_pending || self.rx.has_changed().unwrap_or(false);
        if !unseen {
            return None;
        }
        self.initial_pending = false;
        Some(self.rx.borrow_and_update().clone().into_result())
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Allocate a fresh key. Keys sort in allocation order.
    async fn generate_id(&self, collection: &str) -> StoreResult<String>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Versioned>>;

    async fn list(&self, collection: &str) -> StoreResult<CollectionSnapshot>;

    /// Unconditional write; last writer wins. Returns the new version.
    async fn set(&self, collection: &str, id: &str, record: Record) -> StoreResult<u64>;

    /// Write only if the stored version equals `expected` (`None`: key must be absent).
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        record: Record,
    ) -> StoreResult<CasOutcome>;

    /// Removing an absent key is not an error.
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Server-side filter on "array field contains value". `None` means the
    /// backend cannot filter and the caller should filter `list` itself.
    async fn find_by_member(
        &self,
        _collection: &str,
        _field: &str,
        _value: &str,
    ) -> StoreResult<Option<CollectionSnapshot>> {
        Ok(None)
    }

    async fn subscribe_all(&self, collection: &str) -> StoreResult<Subscription<CollectionSnapshot>>;

    async fn subscribe_one(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<Subscription<Option<Versioned>>>;

    /// Stop deliveries for `handle`. Returns `false` if it was not registered.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}
