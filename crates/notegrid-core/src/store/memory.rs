use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GridStore, StoreError, StoreKey};
use crate::models::OrderedCollection;

/// Process-local store usable for any tier.
///
/// In per-user mode grids are keyed by owner and database, and keys without
/// an identity read as empty and reject writes, matching the authoritative
/// tier. Otherwise grids are keyed by database alone.
#[derive(Clone, Default)]
pub struct MemoryGridStore {
    grids: Arc<RwLock<HashMap<String, OrderedCollection>>>,
    per_user: bool,
}

impl MemoryGridStore {
    pub fn shared() -> Self {
        Self::default()
    }

    pub fn per_user() -> Self {
        Self {
            per_user: true,
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.grids.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.grids.read().await.is_empty()
    }

    fn storage_key(&self, key: &StoreKey) -> Option<String> {
        if self.per_user {
            key.user_id()
                .map(|user_id| format!("{user_id}:{}", key.database_ref))
        } else {
            Some(key.database_ref.clone())
        }
    }
}

#[async_trait]
impl GridStore for MemoryGridStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &StoreKey) -> Result<Option<OrderedCollection>, StoreError> {
        let Some(storage_key) = self.storage_key(key) else {
            return Ok(None);
        };
        Ok(self.grids.read().await.get(&storage_key).cloned())
    }

    async fn put(&self, key: &StoreKey, collection: &OrderedCollection) -> Result<(), StoreError> {
        let storage_key = self
            .storage_key(key)
            .ok_or(StoreError::IdentityRequired)?;
        self.grids
            .write()
            .await
            .insert(storage_key, collection.clone());
        Ok(())
    }
}
