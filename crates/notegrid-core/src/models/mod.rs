//! Data models for Notegrid

mod collection;
mod fingerprint;
mod item;

pub use collection::{GridPreferences, OrderedCollection, MAX_VISIBLE_IMAGES};
pub use fingerprint::SyncFingerprint;
pub use item::{ContentItem, UNTITLED};
