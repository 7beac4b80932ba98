//! Canonical grid item

use serde::{Deserialize, Serialize};

/// Title used when upstream gives none.
pub const UNTITLED: &str = "Untitled";

/// A single media tile in a grid.
///
/// Wire field names follow the embed widget contract (`mediaUrl`,
/// `createdTime`, `lastEditedTime`); `url` is accepted on input for payloads
/// written before the rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Stable upstream page id, unique within a collection.
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(alias = "url")]
    pub media_url: String,
    #[serde(rename = "createdTime", alias = "created_at")]
    pub created_at: String,
    #[serde(
        rename = "lastEditedTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        media_url: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            media_url: media_url.into(),
            created_at: created_at.into(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    /// Modification timestamp used for change detection.
    pub fn modified_at(&self) -> &str {
        self.updated_at.as_deref().unwrap_or(&self.created_at)
    }
}

fn default_title() -> String {
    UNTITLED.to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serializes_with_widget_field_names() {
        let item = ContentItem::new("p1", "Sunset", "https://img/1.jpg", "2024-01-01T00:00:00Z")
            .with_updated_at("2024-01-02T00:00:00Z");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "p1",
                "title": "Sunset",
                "mediaUrl": "https://img/1.jpg",
                "createdTime": "2024-01-01T00:00:00Z",
                "lastEditedTime": "2024-01-02T00:00:00Z"
            })
        );
    }

    #[test]
    fn accepts_legacy_url_field_and_missing_title() {
        let item: ContentItem = serde_json::from_str(
            r#"{"id":"p1","url":"https://img/1.jpg","createdTime":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(item.title, UNTITLED);
        assert_eq!(item.media_url, "https://img/1.jpg");
        assert_eq!(item.modified_at(), "2024-01-01T00:00:00Z");
    }
}
