use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection};

use crate::config::{Config, StoreBackend};
use crate::error::{AppError, AppResult};
use crate::store::{KeyValueStore, MemoryStore, PgStore};

pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    Database::connect(&config.database_url)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

/// Ride store selected by `RIDE_STORE`.
pub fn ride_store(config: &Config, db: &DatabaseConnection) -> Arc<dyn KeyValueStore> {
    match config.ride_store {
        StoreBackend::Postgres => Arc::new(PgStore::new(db.clone())),
        StoreBackend::Memory => {
            tracing::warn!("Ride store is in-memory, rides are lost on restart");
            Arc::new(MemoryStore::new())
        }
    }
}
