//! notegrid-core - Core library for Notegrid
//!
//! Models, normalization, hashing, order reconciliation, the layered grid
//! store and the sync coordinator shared by the API server and the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod upstream;
pub mod util;

pub use config::{SettingsError, SupabaseStoreConfig, SyncSettings};
pub use error::{Error, Result};
pub use hash::content_hash;
pub use identity::{Identity, IdentityProvider, StaticIdentity};
pub use models::{ContentItem, GridPreferences, OrderedCollection, SyncFingerprint};
pub use store::{GridStore, LayeredStore, ReadSource, StoreError, StoreRead};
pub use sync::{SyncCoordinator, SyncError, SyncEvent, SyncScheduler};
pub use upstream::{ContentSource, DatabaseSummary, FetchError, NotionClient};
