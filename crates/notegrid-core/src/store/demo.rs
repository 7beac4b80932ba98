//! Built-in demo grid, the read tier of last resort.

use crate::models::{ContentItem, GridPreferences, OrderedCollection};

/// Number of demo tiles shown by default.
pub const DEMO_VISIBLE: usize = 9;

const DEMO_CREATED_AT: &str = "2024-01-01T00:00:00.000Z";

const DEMO_ROWS: [(&str, &str); 12] = [
    ("Red chair", "https://images.unsplash.com/photo-1516822271333-242b3b86aa49?q=80&w=1200&auto=format&fit=crop"),
    ("Portrait", "https://images.unsplash.com/photo-1544005313-94ddf0286df2?q=80&w=1200&auto=format&fit=crop"),
    ("City", "https://images.unsplash.com/photo-1503023345310-bd7c1de61c7d?q=80&w=1200&auto=format&fit=crop"),
    ("Coffee", "https://images.unsplash.com/photo-1520975661595-6453be3f7070?q=80&w=1200&auto=format&fit=crop"),
    ("Desk", "https://images.unsplash.com/photo-1520975682031-6a1bf3371784?q=80&w=1200&auto=format&fit=crop"),
    ("Notebook", "https://images.unsplash.com/photo-1492447166138-50c3889fccb1?q=80&w=1200&auto=format&fit=crop"),
    ("Smile", "https://images.unsplash.com/photo-1494790108377-be9c29b29330?q=80&w=1200&auto=format&fit=crop"),
    ("Leaf", "https://images.unsplash.com/photo-1544731612-de7f96afe55f?q=80&w=1200&auto=format&fit=crop"),
    ("Mount", "https://images.unsplash.com/photo-1547425260-76bcadfb4f2c?q=80&w=1200&auto=format&fit=crop"),
    ("Wall", "https://images.unsplash.com/photo-1520975592071-d2c3e636a7d0?q=80&w=1200&auto=format&fit=crop"),
    ("Studio", "https://images.unsplash.com/photo-1498050108023-c5249f4df085?q=80&w=1200&auto=format&fit=crop"),
    ("Poster", "https://images.unsplash.com/photo-1514989940723-e8e51635b782?q=80&w=1200&auto=format&fit=crop"),
];

/// All demo items, in display order.
pub fn demo_items() -> Vec<ContentItem> {
    DEMO_ROWS
        .iter()
        .enumerate()
        .map(|(index, (title, url))| {
            ContentItem::new(
                format!("demo-{:02}", index + 1),
                *title,
                *url,
                DEMO_CREATED_AT,
            )
        })
        .collect()
}

/// The demo grid. Never empty, identical on every call.
pub fn demo_collection() -> OrderedCollection {
    let mut collection = OrderedCollection::from_items(demo_items());
    collection.last_modified = DEMO_CREATED_AT.to_string();
    collection.preferences = GridPreferences {
        num_images: u32::try_from(DEMO_VISIBLE).unwrap_or(u32::MAX),
        ..GridPreferences::default()
    };
    collection
}
