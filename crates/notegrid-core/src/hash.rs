//! Content fingerprinting for change detection.
//!
//! The fingerprint is a 31-multiplier polynomial rolling hash over UTF-16
//! code units, wrapped to 32 bits. It detects edits cheaply and is not meant
//! to resist collisions.

use crate::models::ContentItem;

/// 32-bit rolling hash of `value`.
pub fn rolling_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0_i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Canonical fingerprint of an ordered item sequence.
///
/// Covers id, title and modification time of every item, in order, so a
/// reorder, a rename or an upstream edit all change the result.
pub fn content_hash(items: &[ContentItem]) -> String {
    rolling_hash(&canonical_string(items)).to_string()
}

fn canonical_string(items: &[ContentItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}:{}:{}", item.id, item.title, item.modified_at()))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(id: &str, title: &str) -> ContentItem {
        ContentItem::new(id, title, "https://img/x.jpg", "2024-01-01T00:00:00Z")
    }

    #[test]
    fn rolling_hash_matches_known_values() {
        assert_eq!(rolling_hash(""), 0);
        assert_eq!(rolling_hash("a"), 97);
        assert_eq!(rolling_hash("ab"), 97 * 31 + 98);
        // "hello" overflows past i32 and wraps
        assert_eq!(rolling_hash("hello"), 99_162_322);
        assert_eq!(rolling_hash("hello world, this wraps"), {
            let mut expected: i32 = 0;
            for unit in "hello world, this wraps".encode_utf16() {
                expected = expected.wrapping_mul(31).wrapping_add(i32::from(unit));
            }
            expected
        });
    }

    #[test]
    fn content_hash_is_deterministic() {
        let items = vec![item("a", "A"), item("b", "B")];
        assert_eq!(content_hash(&items), content_hash(&items.clone()));
    }

    #[test]
    fn content_hash_is_order_sensitive() {
        let forward = vec![item("a", "A"), item("b", "B")];
        let reversed = vec![item("b", "B"), item("a", "A")];
        assert_ne!(content_hash(&forward), content_hash(&reversed));
    }

    #[test]
    fn content_hash_tracks_title_and_edit_time() {
        let base = vec![item("a", "A")];
        let renamed = vec![item("a", "A2")];
        let edited = vec![item("a", "A").with_updated_at("2024-02-01T00:00:00Z")];
        assert_ne!(content_hash(&base), content_hash(&renamed));
        assert_ne!(content_hash(&base), content_hash(&edited));
    }

    #[test]
    fn empty_sequence_hashes_to_zero() {
        assert_eq!(content_hash(&[]), "0");
    }
}
