//! Persisted grid state

use serde::{Deserialize, Serialize};

use super::ContentItem;
use crate::hash::content_hash;
use crate::util::rfc3339_now;

/// Largest number of tiles a grid may display.
pub const MAX_VISIBLE_IMAGES: u32 = 12;

/// Display and polling preferences stored alongside a grid.
///
/// Missing fields fall back to defaults, so partial payloads merge over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridPreferences {
    pub gap: u32,
    pub radius: u32,
    pub cols: u32,
    pub num_images: u32,
    pub auto_sync: bool,
    /// Milliseconds between background syncs.
    pub sync_interval: u64,
}

impl Default for GridPreferences {
    fn default() -> Self {
        Self {
            gap: 2,
            radius: 6,
            cols: 3,
            num_images: 9,
            auto_sync: true,
            sync_interval: 300_000,
        }
    }
}

impl GridPreferences {
    /// Clamp values into the ranges the widget can render.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.num_images = self.num_images.clamp(1, MAX_VISIBLE_IMAGES);
        self.cols = self.cols.max(1);
        self
    }
}

/// An ordered grid plus the fingerprint of its contents.
///
/// Deserialization also accepts the legacy shape, a bare JSON array of items,
/// and fills in whatever metadata is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredGridPayload", rename_all = "camelCase")]
pub struct OrderedCollection {
    #[serde(rename = "rows")]
    pub items: Vec<ContentItem>,
    pub content_hash: String,
    pub last_modified: String,
    pub preferences: GridPreferences,
}

impl OrderedCollection {
    pub fn new(items: Vec<ContentItem>, preferences: GridPreferences) -> Self {
        Self {
            content_hash: content_hash(&items),
            last_modified: rfc3339_now(),
            items,
            preferences,
        }
    }

    pub fn from_items(items: Vec<ContentItem>) -> Self {
        Self::new(items, GridPreferences::default())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items the widget shows, honoring the `num_images` preference.
    pub fn visible_items(&self) -> &[ContentItem] {
        let limit = usize::try_from(self.preferences.clone().normalized().num_images)
            .unwrap_or(usize::MAX);
        &self.items[..self.items.len().min(limit)]
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredGridPayload {
    Legacy(Vec<ContentItem>),
    Current(StoredGrid),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGrid {
    #[serde(alias = "items")]
    rows: Vec<ContentItem>,
    #[serde(default, alias = "hash")]
    content_hash: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    preferences: GridPreferences,
}

impl From<StoredGridPayload> for OrderedCollection {
    fn from(payload: StoredGridPayload) -> Self {
        match payload {
            StoredGridPayload::Legacy(items) => Self::from_items(items),
            StoredGridPayload::Current(stored) => {
                let content_hash = stored
                    .content_hash
                    .filter(|hash| !hash.trim().is_empty())
                    .unwrap_or_else(|| content_hash(&stored.rows));
                Self {
                    content_hash,
                    last_modified: stored.last_modified.unwrap_or_else(rfc3339_now),
                    items: stored.rows,
                    preferences: stored.preferences,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(id: &str) -> ContentItem {
        ContentItem::new(id, id, format!("https://img/{id}.jpg"), "2024-01-01T00:00:00Z")
    }

    #[test]
    fn new_collection_carries_hash_of_items() {
        let collection = OrderedCollection::from_items(vec![item("a"), item("b")]);
        assert_eq!(collection.content_hash, content_hash(&collection.items));
        assert!(!collection.last_modified.is_empty());
    }

    #[test]
    fn legacy_array_payload_is_upgraded() {
        let payload = serde_json::to_string(&vec![item("a"), item("b")]).unwrap();
        let collection: OrderedCollection = serde_json::from_str(&payload).unwrap();
        assert_eq!(collection.items.len(), 2);
        assert_eq!(collection.content_hash, content_hash(&collection.items));
        assert_eq!(collection.preferences, GridPreferences::default());
    }

    #[test]
    fn missing_hash_is_recomputed_and_preferences_merge_over_defaults() {
        let payload = serde_json::json!({
            "rows": [item("a")],
            "lastModified": "2024-03-01T00:00:00Z",
            "preferences": { "cols": 4 }
        });
        let collection: OrderedCollection = serde_json::from_value(payload).unwrap();
        assert_eq!(collection.content_hash, content_hash(&[item("a")]));
        assert_eq!(collection.last_modified, "2024-03-01T00:00:00Z");
        assert_eq!(collection.preferences.cols, 4);
        assert_eq!(collection.preferences.gap, 2);
    }

    #[test]
    fn serialized_form_round_trips_through_current_shape() {
        let collection = OrderedCollection::from_items(vec![item("a")]);
        let json = serde_json::to_value(&collection).unwrap();
        assert!(json.get("rows").is_some());
        assert!(json.get("contentHash").is_some());
        let parsed: OrderedCollection = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, collection);
    }

    #[test]
    fn visible_items_respect_image_limit() {
        let items = (0..15).map(|index| item(&format!("p{index}"))).collect();
        let mut collection = OrderedCollection::from_items(items);
        assert_eq!(collection.visible_items().len(), 9);
        collection.preferences.num_images = 40;
        assert_eq!(collection.visible_items().len(), 12);
    }
}
