use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use tokio::sync::Mutex;

use super::{GridStore, StoreError, StoreKey};
use crate::db::Database;
use crate::models::OrderedCollection;

/// Local cache tier backed by a libSQL file.
///
/// Keyed by database reference only; the cache belongs to whoever runs the
/// process.
#[derive(Clone)]
pub struct LibSqlGridCache {
    db: Arc<Mutex<Database>>,
}

impl LibSqlGridCache {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::open(path).await?;
        Ok(Self::from_database(db))
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Database references with a cached grid, most recently written first.
    pub async fn cached_refs(&self) -> Result<Vec<String>, StoreError> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT database_ref FROM grid_cache ORDER BY updated_at DESC",
                (),
            )
            .await?;

        let mut refs = Vec::new();
        while let Some(row) = rows.next().await? {
            refs.push(row.get::<String>(0)?);
        }
        Ok(refs)
    }
}

#[async_trait]
impl GridStore for LibSqlGridCache {
    fn name(&self) -> &'static str {
        "libsql-cache"
    }

    async fn get(&self, key: &StoreKey) -> Result<Option<OrderedCollection>, StoreError> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT payload FROM grid_cache WHERE database_ref = ?1",
                params![key.database_ref.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    async fn put(&self, key: &StoreKey, collection: &OrderedCollection) -> Result<(), StoreError> {
        let payload = serde_json::to_string(collection)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO grid_cache (database_ref, payload, content_hash, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(database_ref) DO UPDATE SET
                     payload = excluded.payload,
                     content_hash = excluded.content_hash,
                     updated_at = excluded.updated_at",
                params![
                    key.database_ref.as_str(),
                    payload,
                    collection.content_hash.as_str(),
                    Utc::now().timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }
}
