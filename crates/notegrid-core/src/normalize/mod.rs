//! Conversion of upstream records into canonical grid items.

mod record;

pub use record::{FileAttachment, FileLocation, PropertyValue, RawRecord, TextContent, TextSpan};

use crate::hash::rolling_hash;
use crate::models::{ContentItem, UNTITLED};
use crate::util::{is_http_url, rfc3339_now};

/// Images used for records without any media of their own.
pub const FALLBACK_IMAGES: [&str; 3] = [
    "https://images.unsplash.com/photo-1581833971358-2c8b550f87b3?q=80&w=1200&auto=format&fit=crop",
    "https://images.unsplash.com/photo-1516822271333-242b3b86aa49?q=80&w=1200&auto=format&fit=crop",
    "https://images.unsplash.com/photo-1544005313-94ddf0286df2?q=80&w=1200&auto=format&fit=crop",
];

const MEDIA_NAME_HINTS: [&str; 3] = ["image", "url", "photo"];

/// Normalize one record. Never fails; missing pieces get defaults.
///
/// Title comes from the first non-empty title field, else from a rich text
/// field named `name`. Media comes from the first non-empty files field, else
/// from a URL-ish field whose name mentions image, url or photo, else from
/// [`fallback_image`].
pub fn normalize(record: &RawRecord) -> ContentItem {
    let id = record.id.clone().unwrap_or_default();
    let title = extract_title(record).unwrap_or_else(|| UNTITLED.to_string());
    let media_url = extract_media_url(record).unwrap_or_else(|| fallback_image(&id).to_string());
    let created_at = record.created_time.clone().unwrap_or_else(rfc3339_now);

    ContentItem {
        id,
        title,
        media_url,
        created_at,
        updated_at: record.last_edited_time.clone(),
    }
}

/// Normalize a batch, dropping records that carry no id.
pub fn normalize_all(records: &[RawRecord]) -> Vec<ContentItem> {
    records
        .iter()
        .filter(|record| {
            let keep = record.id.is_some();
            if !keep {
                tracing::warn!("Skipping upstream record without an id");
            }
            keep
        })
        .map(normalize)
        .collect()
}

/// Deterministic fallback image for a record id.
pub fn fallback_image(id: &str) -> &'static str {
    let index = rolling_hash(id).unsigned_abs() as usize % FALLBACK_IMAGES.len();
    FALLBACK_IMAGES[index]
}

fn extract_title(record: &RawRecord) -> Option<String> {
    record
        .properties
        .iter()
        .find_map(|(_, value)| match value {
            PropertyValue::Title { .. } => value.plain_text(),
            _ => None,
        })
        .or_else(|| {
            record.properties.iter().find_map(|(name, value)| {
                match value {
                    PropertyValue::RichText { .. } if name.eq_ignore_ascii_case("name") => {
                        value.plain_text()
                    }
                    _ => None,
                }
            })
        })
}

fn extract_media_url(record: &RawRecord) -> Option<String> {
    record
        .properties
        .iter()
        .find_map(|(_, value)| value.first_file_url().map(ToString::to_string))
        .or_else(|| {
            record
                .properties
                .iter()
                .filter(|(name, _)| is_media_name(name))
                .find_map(|(_, value)| hinted_url(value))
        })
}

fn is_media_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    MEDIA_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

fn hinted_url(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Url { url } => url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string),
        PropertyValue::RichText { .. } => value.plain_text().filter(|text| is_http_url(text)),
        _ => None,
    }
}
