// Most-recently-opened document paths, persisted in the user's config row.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::store::records::RecordStore;

pub const MAX_RECENT_ITEMS: usize = 10;

/// Move `item` to the front of `items`, dropping duplicates and anything past
/// [`MAX_RECENT_ITEMS`].
pub fn push_front(items: &mut Vec<String>, item: &str) {
    items.retain(|existing| existing != item);
    items.insert(0, item.to_string());
    items.truncate(MAX_RECENT_ITEMS);
}

pub struct RecentItems {
    store: Arc<dyn RecordStore>,
    user_id: i64,
}

impl RecentItems {
    pub fn new(store: Arc<dyn RecordStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }

    /// Most recent first.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.get_recent_items(self.user_id)
    }

    /// Record an opened document and return the updated list.
    pub fn record(&self, path: &Path) -> Result<Vec<String>> {
        let mut items = self.list()?;
        push_front(&mut items, &path.to_string_lossy());
        self.store.set_recent_items(self.user_id, &items)?;
        Ok(items)
    }
}
