//! Merging a user's custom order with fresh upstream content.
//!
//! Upstream owns content, the custom order owns sequence. Items keep the
//! custom position but always carry fresh upstream fields; items deleted
//! upstream disappear; new upstream items are appended in upstream order.

use std::collections::{HashMap, HashSet};

use crate::models::ContentItem;

/// Merge `custom_order` with `fresh` upstream items.
///
/// Duplicates in either input are collapsed by first occurrence. The result
/// is the next custom order.
pub fn reconcile(custom_order: Option<&[ContentItem]>, fresh: &[ContentItem]) -> Vec<ContentItem> {
    let fresh = dedupe(fresh.iter());
    let Some(custom_order) = custom_order.filter(|custom| !custom.is_empty()) else {
        return fresh.into_iter().cloned().collect();
    };

    let by_id: HashMap<&str, &ContentItem> =
        fresh.iter().map(|item| (item.id.as_str(), *item)).collect();
    let mut seen = HashSet::with_capacity(fresh.len());
    let mut merged = Vec::with_capacity(fresh.len());

    for kept in custom_order {
        if let Some(item) = by_id.get(kept.id.as_str()) {
            if seen.insert(kept.id.as_str()) {
                merged.push((*item).clone());
            }
        }
    }

    for item in &fresh {
        if seen.insert(item.id.as_str()) {
            merged.push((*item).clone());
        }
    }

    merged
}

/// Reorder `current` to follow `ordered_ids`.
///
/// Unknown ids are ignored and repeated ids count once. Items not named in
/// `ordered_ids` keep their relative order after the named ones, so a partial
/// id list never drops items.
pub fn apply_order(current: &[ContentItem], ordered_ids: &[String]) -> Vec<ContentItem> {
    let current = dedupe(current.iter());
    let by_id: HashMap<&str, &ContentItem> = current
        .iter()
        .map(|item| (item.id.as_str(), *item))
        .collect();
    let mut seen = HashSet::with_capacity(current.len());
    let mut ordered = Vec::with_capacity(current.len());

    for id in ordered_ids {
        if let Some(item) = by_id.get(id.as_str()) {
            if seen.insert(item.id.as_str()) {
                ordered.push((*item).clone());
            }
        }
    }

    for item in &current {
        if seen.insert(item.id.as_str()) {
            ordered.push((*item).clone());
        }
    }

    ordered
}

fn dedupe<'a>(items: impl Iterator<Item = &'a ContentItem>) -> Vec<&'a ContentItem> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.id.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn item(id: &str, title: &str) -> ContentItem {
        ContentItem::new(id, title, format!("https://img/{id}.jpg"), "2024-01-01T00:00:00Z")
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn no_custom_order_returns_fresh() {
        let fresh = vec![item("a", "A"), item("b", "B")];
        assert_eq!(reconcile(None, &fresh), fresh);
        assert_eq!(reconcile(Some(&[]), &fresh), fresh);
    }

    #[test]
    fn custom_positions_survive_with_fresh_content() {
        let custom = vec![item("C", "c"), item("A", "a"), item("B", "b")];
        let fresh = vec![
            item("A", "a2"),
            item("B", "b2"),
            item("C", "c2"),
            item("D", "d"),
        ];

        let merged = reconcile(Some(&custom), &fresh);
        assert_eq!(ids(&merged), vec!["C", "A", "B", "D"]);
        let titles: Vec<&str> = merged.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["c2", "a2", "b2", "d"]);
    }

    #[test]
    fn items_deleted_upstream_are_dropped() {
        let custom = vec![item("A", "a"), item("B", "b"), item("C", "c")];
        let fresh = vec![item("A", "a"), item("C", "c")];
        assert_eq!(ids(&reconcile(Some(&custom), &fresh)), vec!["A", "C"]);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let custom = vec![item("B", "b"), item("A", "a")];
        let fresh = vec![item("A", "a2"), item("B", "b2"), item("C", "c")];
        let once = reconcile(Some(&custom), &fresh);
        let twice = reconcile(Some(&once), &fresh);
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let custom = vec![item("A", "a"), item("A", "a"), item("B", "b")];
        let fresh = vec![item("B", "b1"), item("B", "b2"), item("A", "a")];
        let merged = reconcile(Some(&custom), &fresh);
        assert_eq!(ids(&merged), vec!["A", "B"]);
        assert_eq!(merged[1].title, "b1");
    }

    #[test]
    fn apply_order_keeps_unmentioned_items() {
        let current = vec![item("A", "a"), item("B", "b"), item("C", "c"), item("D", "d")];
        let ordered = apply_order(
            &current,
            &["C".to_string(), "missing".to_string(), "A".to_string(), "C".to_string()],
        );
        assert_eq!(ids(&ordered), vec!["C", "A", "B", "D"]);
    }
}
