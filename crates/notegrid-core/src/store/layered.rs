use std::sync::Arc;

use futures::future::join_all;

use super::demo::demo_collection;
use super::{
    GridStore, MemoryGridStore, ReadSource, StoreKey, StoreRead, StoreTier, TierWrite, WriteReport,
};
use crate::identity::Identity;
use crate::models::OrderedCollection;

/// Fallthrough reads and fan-out writes across the configured tiers.
#[derive(Clone)]
pub struct LayeredStore {
    authoritative: Option<Arc<dyn GridStore>>,
    shared: Option<Arc<dyn GridStore>>,
    cache: Arc<dyn GridStore>,
}

impl LayeredStore {
    pub fn new(cache: Arc<dyn GridStore>) -> Self {
        Self {
            authoritative: None,
            shared: None,
            cache,
        }
    }

    /// All three tiers held in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryGridStore::shared()))
            .with_authoritative(Arc::new(MemoryGridStore::per_user()))
            .with_shared(Arc::new(MemoryGridStore::shared()))
    }

    #[must_use]
    pub fn with_authoritative(mut self, store: Arc<dyn GridStore>) -> Self {
        self.authoritative = Some(store);
        self
    }

    #[must_use]
    pub fn with_shared(mut self, store: Arc<dyn GridStore>) -> Self {
        self.shared = Some(store);
        self
    }

    pub fn tier(&self, tier: StoreTier) -> Option<&Arc<dyn GridStore>> {
        match tier {
            StoreTier::Authoritative => self.authoritative.as_ref(),
            StoreTier::Shared => self.shared.as_ref(),
            StoreTier::Cache => Some(&self.cache),
        }
    }

    /// Tiers consulted for `identity`, in precedence order.
    fn tiers_for(&self, identity: Option<&Identity>) -> Vec<(StoreTier, Arc<dyn GridStore>)> {
        let mut tiers = Vec::with_capacity(3);
        if identity.is_some() {
            if let Some(store) = &self.authoritative {
                tiers.push((StoreTier::Authoritative, Arc::clone(store)));
            }
        }
        if let Some(store) = &self.shared {
            tiers.push((StoreTier::Shared, Arc::clone(store)));
        }
        tiers.push((StoreTier::Cache, Arc::clone(&self.cache)));
        tiers
    }

    /// First non-empty grid across the real tiers, or `None`.
    ///
    /// Tier errors are logged and treated as misses.
    pub async fn read_existing(
        &self,
        identity: Option<&Identity>,
        database_ref: &str,
    ) -> Option<StoreRead> {
        let key = StoreKey::new(identity.cloned(), database_ref);
        for (tier, store) in self.tiers_for(identity) {
            match store.get(&key).await {
                Ok(Some(collection)) if !collection.is_empty() => {
                    tracing::debug!(
                        database_ref,
                        tier = tier.as_str(),
                        items = collection.items.len(),
                        "Loaded grid"
                    );
                    return Some(StoreRead {
                        collection,
                        source: tier.into(),
                    });
                }
                Ok(_) => {
                    tracing::debug!(database_ref, tier = tier.as_str(), "No grid in tier");
                }
                Err(error) => {
                    tracing::warn!(
                        database_ref,
                        tier = tier.as_str(),
                        store = store.name(),
                        %error,
                        "Grid read failed, falling through"
                    );
                }
            }
        }
        None
    }

    /// Like [`Self::read_existing`] but never empty: ends at the demo grid.
    pub async fn read(&self, identity: Option<&Identity>, database_ref: &str) -> StoreRead {
        if let Some(read) = self.read_existing(identity, database_ref).await {
            return read;
        }
        tracing::info!(database_ref, "No stored grid found, serving demo grid");
        StoreRead {
            collection: demo_collection(),
            source: ReadSource::Demo,
        }
    }

    /// Write to every applicable tier concurrently.
    ///
    /// The cache and shared tiers are always written; the authoritative tier
    /// only with an identity. Failures are logged and reported per tier and
    /// never roll back other tiers.
    pub async fn write(
        &self,
        identity: Option<&Identity>,
        database_ref: &str,
        collection: &OrderedCollection,
    ) -> WriteReport {
        let key = StoreKey::new(identity.cloned(), database_ref);
        let writes = self.tiers_for(identity).into_iter().map(|(tier, store)| {
            let key = &key;
            async move {
                match store.put(key, collection).await {
                    Ok(()) => {
                        tracing::debug!(
                            database_ref = key.database_ref.as_str(),
                            tier = tier.as_str(),
                            "Stored grid"
                        );
                        TierWrite { tier, error: None }
                    }
                    Err(error) => {
                        tracing::warn!(
                            database_ref = key.database_ref.as_str(),
                            tier = tier.as_str(),
                            store = store.name(),
                            %error,
                            "Grid write failed"
                        );
                        TierWrite {
                            tier,
                            error: Some(error.to_string()),
                        }
                    }
                }
            }
        });

        WriteReport {
            tiers: join_all(writes).await,
        }
    }
}
