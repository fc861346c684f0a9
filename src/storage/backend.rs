//! Item store trait
//!
//! The bridge never owns bibliographic records; it reads them through
//! `LibraryStore`. Implementations must tolerate concurrent reads from many
//! connection tasks.

use crate::error::Result;
use crate::types::{Annotation, Collection, CollectionId, Item, ItemId, LibraryId};

use super::filter::ItemQuery;

/// Read-only access to a reference library
///
/// Methods are synchronous; the in-memory implementation answers directly
/// and a store that blocks should be driven from `spawn_blocking` by the
/// caller.
pub trait LibraryStore: Send + Sync {
    // ========================================================================
    // Items
    // ========================================================================

    /// The library addressed when a request does not name one
    fn user_library_id(&self) -> LibraryId;

    /// Look up an item by its key within a library
    fn item_by_key(&self, library_id: LibraryId, key: &str) -> Result<Option<Item>>;

    fn item_by_id(&self, id: ItemId) -> Result<Option<Item>>;

    /// Fetch several items; unknown ids are skipped, order follows `ids`
    fn items_by_ids(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.item_by_id(*id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Execute a conjunctive query
    ///
    /// # Returns
    /// Matching item ids in store order
    fn search(&self, query: &ItemQuery) -> Result<Vec<ItemId>>;

    /// Attachments and notes whose parent is `parent_id`
    fn child_items(&self, parent_id: ItemId) -> Result<Vec<Item>>;

    // ========================================================================
    // Collections
    // ========================================================================

    fn collection_by_key(&self, library_id: LibraryId, key: &str) -> Result<Option<Collection>>;

    /// All collections of a library
    fn collections(&self, library_id: LibraryId) -> Result<Vec<Collection>>;

    /// Ids of items directly in a collection
    fn collection_item_ids(&self, collection_id: CollectionId) -> Result<Vec<ItemId>>;

    /// Direct subcollections
    fn child_collections(&self, collection_id: CollectionId) -> Result<Vec<Collection>> {
        let library_id = self
            .collection_by_id(collection_id)?
            .map(|c| c.library_id)
            .unwrap_or_else(|| self.user_library_id());
        Ok(self
            .collections(library_id)?
            .into_iter()
            .filter(|c| c.parent_id == Some(collection_id))
            .collect())
    }

    /// Look up a collection by numeric id
    fn collection_by_id(&self, collection_id: CollectionId) -> Result<Option<Collection>> {
        Ok(self
            .collections(self.user_library_id())?
            .into_iter()
            .find(|c| c.id == collection_id))
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    /// Annotations made on one attachment
    fn annotations_for(&self, attachment_id: ItemId) -> Result<Vec<Annotation>>;

    fn annotation_by_key(&self, key: &str) -> Result<Option<Annotation>>;

    /// Every annotation in the library
    fn all_annotations(&self, library_id: LibraryId) -> Result<Vec<Annotation>>;
}
