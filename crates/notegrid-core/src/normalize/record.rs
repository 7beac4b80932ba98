//! Upstream page records as they arrive from the Notion API.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One upstream page with its property bag.
///
/// Parsing never fails: fields that are missing or have an unexpected shape
/// come through as `None` or as [`PropertyValue::Unsupported`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub id: Option<String>,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
    /// Properties in upstream order.
    pub properties: Vec<(String, PropertyValue)>,
}

/// Typed property value, one variant per field type the normalizer reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<TextSpan>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<TextSpan>,
    },
    Files {
        #[serde(default)]
        files: Vec<FileAttachment>,
    },
    Url {
        #[serde(default)]
        url: Option<String>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextSpan {
    #[serde(default)]
    pub plain_text: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileAttachment {
    External { external: FileLocation },
    File { file: FileLocation },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileLocation {
    pub url: String,
}

impl TextSpan {
    fn text(&self) -> &str {
        self.plain_text
            .as_deref()
            .or_else(|| self.text.as_ref().map(|text| text.content.as_str()))
            .unwrap_or_default()
    }
}

impl FileAttachment {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::External { external } => Some(external.url.as_str()),
            Self::File { file } => Some(file.url.as_str()),
            Self::Unknown => None,
        }
        .map(str::trim)
        .filter(|url| !url.is_empty())
    }
}

impl PropertyValue {
    /// Concatenated text of a title or rich text value, trimmed.
    pub fn plain_text(&self) -> Option<String> {
        let spans = match self {
            Self::Title { title } => title,
            Self::RichText { rich_text } => rich_text,
            _ => return None,
        };
        let text: String = spans.iter().map(TextSpan::text).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// First usable attachment URL of a files value.
    pub fn first_file_url(&self) -> Option<&str> {
        match self {
            Self::Files { files } => files.iter().find_map(FileAttachment::url),
            _ => None,
        }
    }
}

impl RawRecord {
    /// Lenient conversion from a page JSON object.
    pub fn from_json(value: &Value) -> Self {
        let text_field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(ToString::to_string)
        };

        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .map(|bag| {
                bag.iter()
                    .map(|(name, raw)| (name.clone(), parse_property(name, raw)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: text_field("id"),
            created_time: text_field("created_time"),
            last_edited_time: text_field("last_edited_time"),
            properties,
        }
    }
}

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

fn parse_property(name: &str, raw: &Value) -> PropertyValue {
    PropertyValue::deserialize(raw).unwrap_or_else(|error| {
        tracing::debug!(property = name, %error, "Treating malformed property as unsupported");
        PropertyValue::Unsupported
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_notion_page_properties_in_order() {
        let page = json!({
            "object": "page",
            "id": "p1",
            "created_time": "2024-01-01T00:00:00.000Z",
            "last_edited_time": "2024-01-02T00:00:00.000Z",
            "properties": {
                "Name": { "id": "title", "type": "title", "title": [
                    { "type": "text", "plain_text": "Sun", "text": { "content": "Sun" } },
                    { "type": "text", "plain_text": "set", "text": { "content": "set" } }
                ]},
                "Cover": { "id": "x", "type": "files", "files": [
                    { "name": "a.jpg", "type": "external", "external": { "url": "https://img/a.jpg" } }
                ]},
                "Order": { "id": "y", "type": "number", "number": 2 },
                "Tags": { "id": "z", "type": "multi_select", "multi_select": [] }
            }
        });

        let record: RawRecord = serde_json::from_value(page).unwrap();
        assert_eq!(record.id.as_deref(), Some("p1"));
        let names: Vec<&str> = record
            .properties
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["Name", "Cover", "Order", "Tags"]);
        assert_eq!(record.properties[0].1.plain_text().as_deref(), Some("Sunset"));
        assert_eq!(record.properties[1].1.first_file_url(), Some("https://img/a.jpg"));
        assert_eq!(
            record.properties[2].1,
            PropertyValue::Number { number: Some(2.0) }
        );
        assert_eq!(record.properties[3].1, PropertyValue::Unsupported);
    }

    #[test]
    fn malformed_property_degrades_to_unsupported() {
        let page = json!({
            "id": "p1",
            "properties": {
                "Name": { "type": "title", "title": "not-a-list" },
                "Photo": { "type": "files", "files": [ { "type": "file", "file": { "url": "https://s3/x.png", "expiry_time": "soon" } } ] }
            }
        });
        let record = RawRecord::from_json(&page);
        assert_eq!(record.properties[0].1, PropertyValue::Unsupported);
        assert_eq!(record.properties[1].1.first_file_url(), Some("https://s3/x.png"));
    }

    #[test]
    fn non_object_payload_yields_empty_record() {
        let record = RawRecord::from_json(&json!("garbage"));
        assert_eq!(record, RawRecord::default());
    }
}
