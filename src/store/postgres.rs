use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Statement,
};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::watch::WatchRegistry;
use super::{
    CasOutcome, CollectionSnapshot, KeyValueStore, Record, StoreError, StoreResult, Subscription,
    SubscriptionHandle, Versioned,
};
use crate::entities::record;

/// Store backed by the `record` table.
///
/// Subscriptions are served from this process: writes made through this
/// instance are pushed to its subscribers, writes from other processes are not.
pub struct PgStore {
    db: DatabaseConnection,
    watchers: WatchRegistry,
    // Serializes "read snapshot + deliver" so subscribers never see an older
    // snapshot after a newer one.
    delivery: Mutex<()>,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            watchers: WatchRegistry::new(),
            delivery: Mutex::new(()),
        }
    }

    fn decode(collection: &str, id: String, version: i64, body: Value) -> StoreResult<(String, Versioned)> {
        let record = match body {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Malformed {
                    collection: collection.to_string(),
                    id,
                    reason: format!("expected an object, found {}", other),
                });
            }
        };
        Ok((
            id,
            Versioned {
                version: version.max(0) as u64,
                record,
            },
        ))
    }

    async fn load_collection(&self, collection: &str) -> StoreResult<CollectionSnapshot> {
        let models = record::Entity::find()
            .filter(record::Column::Collection.eq(collection))
            .order_by_asc(record::Column::Id)
            .all(&self.db)
            .await?;

        let mut snapshot = Vec::with_capacity(models.len());
        for model in models {
            match Self::decode(collection, model.id, model.version, model.body) {
                Ok(entry) => snapshot.push(entry),
                // One bad row must not hide the rest of the collection
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable record"),
            }
        }
        Ok(snapshot)
    }

    async fn notify(&self, collection: &str) {
        if !self.watchers.is_watched(collection) {
            return;
        }
        let _guard = self.delivery.lock().await;
        match self.load_collection(collection).await {
            Ok(snapshot) => self.watchers.publish(collection, &snapshot),
            Err(e) => self.watchers.publish_error(collection, &e.to_string()),
        }
    }
}

/// Rows whose `field` holds `value`: as an array element, as the whole
/// string, or as an object key. All three layouts of `bookedBy` match.
fn member_query(collection: &str, field: &str, value: &str) -> Statement {
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"SELECT id, version, body FROM record WHERE collection = $1 AND (body -> $2) ? $3 ORDER BY id"#,
        [collection.into(), field.into(), value.into()],
    )
}

#[derive(Debug, FromQueryResult)]
struct MemberRow {
    id: String,
    version: i64,
    body: Value,
}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn generate_id(&self, _collection: &str) -> StoreResult<String> {
        Ok(Uuid::now_v7().simple().to_string())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Versioned>> {
        let model = record::Entity::find_by_id((collection.to_string(), id.to_string()))
            .one(&self.db)
            .await?;

        model
            .map(|m| Self::decode(collection, m.id, m.version, m.body).map(|(_, versioned)| versioned))
            .transpose()
    }

    async fn list(&self, collection: &str) -> StoreResult<CollectionSnapshot> {
        self.load_collection(collection).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Record) -> StoreResult<u64> {
        // Last writer wins: keep trying until our write lands on whatever is there.
        loop {
            let expected = self.get(collection, id).await?.map(|current| current.version);
            match self
                .compare_and_set(collection, id, expected, fields.clone())
                .await?
            {
                CasOutcome::Applied { version } => return Ok(version),
                CasOutcome::Conflict { .. } => continue,
            }
        }
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected: Option<u64>,
        fields: Record,
    ) -> StoreResult<CasOutcome> {
        let body = Value::Object(fields);
        let now = Utc::now().fixed_offset();

        let applied = match expected {
            None => {
                let model = record::ActiveModel {
                    collection: Set(collection.to_string()),
                    id: Set(id.to_string()),
                    version: Set(1),
                    body: Set(body),
                    updated_at: Set(now),
                };
                let inserted = record::Entity::insert(model)
                    .on_conflict(
                        OnConflict::columns([record::Column::Collection, record::Column::Id])
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&self.db)
                    .await?;
                (inserted == 1).then_some(1)
            }
            Some(version) => {
                let result = record::Entity::update_many()
                    .col_expr(record::Column::Body, Expr::value(body))
                    .col_expr(record::Column::Version, Expr::value(version as i64 + 1))
                    .col_expr(record::Column::UpdatedAt, Expr::value(now))
                    .filter(record::Column::Collection.eq(collection))
                    .filter(record::Column::Id.eq(id))
                    .filter(record::Column::Version.eq(version as i64))
                    .exec(&self.db)
                    .await?;
                (result.rows_affected == 1).then_some(version + 1)
            }
        };

        match applied {
            Some(version) => {
                self.notify(collection).await;
                Ok(CasOutcome::Applied { version })
            }
            None => Ok(CasOutcome::Conflict {
                current: self.get(collection, id).await?,
            }),
        }
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        let result = record::Entity::delete_by_id((collection.to_string(), id.to_string()))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            self.notify(collection).await;
        }
        Ok(())
    }

    async fn find_by_member(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<CollectionSnapshot>> {
        let rows = MemberRow::find_by_statement(member_query(collection, field, value))
            .all(&self.db)
            .await?;

        let mut snapshot = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::decode(collection, row.id, row.version, row.body) {
                Ok(entry) => snapshot.push(entry),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable record"),
            }
        }
        Ok(Some(snapshot))
    }

    async fn subscribe_all(&self, collection: &str) -> StoreResult<Subscription<CollectionSnapshot>> {
        let _guard = self.delivery.lock().await;
        let initial = self.load_collection(collection).await?;
        Ok(self.watchers.watch_all(collection, initial))
    }

    async fn subscribe_one(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<Subscription<Option<Versioned>>> {
        let _guard = self.delivery.lock().await;
        let initial = self.get(collection, id).await?;
        Ok(self.watchers.watch_one(collection, id, initial))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.watchers.remove(handle)
    }
}
