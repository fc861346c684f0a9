//! In-memory library loaded from a JSON snapshot
//!
//! Snapshot layout:
//!
//! ```json
//! {
//!   "libraryId": 1,
//!   "items": [ { "id": 1, "key": "ABCD2345", "itemType": "journalArticle", ... } ],
//!   "collections": [ { "id": 1, "key": "COLL0001", "name": "Reading" } ],
//!   "annotations": [ { "key": "ANN00001", "parentId": 7, "type": "highlight", ... } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{BridgeError, Result};
use crate::types::{Annotation, Collection, CollectionId, Item, ItemId, LibraryId};

use super::backend::LibraryStore;
use super::filter::{CompiledCondition, ItemQuery, SearchField};

fn default_library_id() -> LibraryId {
    1
}

/// Serialized form of a library
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySnapshot {
    #[serde(default = "default_library_id")]
    pub library_id: LibraryId,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl LibrarySnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut snapshot: LibrarySnapshot = serde_json::from_str(raw)?;
        // Records without an explicit library belong to the snapshot's library
        let library_id = snapshot.library_id;
        for item in &mut snapshot.items {
            if item.library_id == 0 {
                item.library_id = library_id;
            }
        }
        for collection in &mut snapshot.collections {
            if collection.library_id == 0 {
                collection.library_id = library_id;
            }
        }
        Ok(snapshot)
    }
}

/// Indexed view over a snapshot
#[derive(Debug, Default)]
struct Indexed {
    snapshot: LibrarySnapshot,
    by_id: HashMap<ItemId, usize>,
    children: HashMap<ItemId, Vec<usize>>,
    collection_by_id: HashMap<CollectionId, usize>,
}

impl Indexed {
    fn new(snapshot: LibrarySnapshot) -> Self {
        let mut by_id = HashMap::new();
        let mut children: HashMap<ItemId, Vec<usize>> = HashMap::new();
        for (idx, item) in snapshot.items.iter().enumerate() {
            by_id.insert(item.id, idx);
            if let Some(parent) = item.parent_id {
                children.entry(parent).or_default().push(idx);
            }
        }
        let collection_by_id = snapshot
            .collections
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.id, idx))
            .collect();
        Self {
            snapshot,
            by_id,
            children,
            collection_by_id,
        }
    }

    fn children_of(&self, id: ItemId) -> impl Iterator<Item = &Item> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(|idx| &self.snapshot.items[*idx])
    }

    /// Keys of the collections an item is in, plus their ancestors when `recursive`
    fn collection_keys(&self, item: &Item, recursive: bool) -> Vec<&str> {
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for id in &item.collections {
            let mut current = Some(*id);
            while let Some(cid) = current {
                if !seen.insert(cid) {
                    break;
                }
                let Some(collection) = self
                    .collection_by_id
                    .get(&cid)
                    .map(|idx| &self.snapshot.collections[*idx])
                else {
                    break;
                };
                keys.push(collection.key.as_str());
                current = if recursive { collection.parent_id } else { None };
            }
        }
        keys
    }

    fn evaluate(&self, item: &Item, cond: &CompiledCondition, recursive: bool) -> bool {
        match cond.field {
            SearchField::QuickSearch => {
                let full_names: Vec<String> =
                    item.creators.iter().map(|c| c.display_name()).collect();
                let mut candidates: Vec<&str> = item.fields.values().map(String::as_str).collect();
                candidates.extend(full_names.iter().map(String::as_str));
                candidates.extend(item.tags.iter().map(String::as_str));
                if let Some(note) = &item.note {
                    candidates.push(note);
                }
                cond.matches_any(candidates)
            }
            SearchField::Title => cond.matches_any([item.display_title().as_str()]),
            SearchField::Creator => {
                let names: Vec<String> = item
                    .creators
                    .iter()
                    .flat_map(|c| [c.display_name(), c.last_name.clone()])
                    .collect();
                cond.matches_any(names.iter().map(String::as_str))
            }
            SearchField::Year => cond.matches_number(item.year().map(i64::from)),
            SearchField::ItemType => cond.matches_any([item.item_type.as_str()]),
            SearchField::Doi => cond.matches_any([item.field("DOI")]),
            SearchField::Isbn => cond.matches_any([item.field("ISBN")]),
            SearchField::Collection => cond.matches_any(self.collection_keys(item, recursive)),
            SearchField::HasAttachment => {
                let has = self.children_of(item.id).any(Item::is_attachment);
                cond.matches_any([if has { "true" } else { "false" }])
            }
            SearchField::HasNote => {
                let has = self.children_of(item.id).any(Item::is_note);
                cond.matches_any([if has { "true" } else { "false" }])
            }
        }
    }
}

/// Immutable library held in memory, indexed once at load
pub struct MemoryLibrary {
    inner: Indexed,
    /// Whether collection conditions include items of subcollections
    recursive_collections: bool,
}

impl MemoryLibrary {
    pub fn new(snapshot: LibrarySnapshot) -> Self {
        Self {
            inner: Indexed::new(snapshot),
            recursive_collections: false,
        }
    }

    /// Empty user library
    pub fn empty() -> Self {
        Self::new(LibrarySnapshot {
            library_id: default_library_id(),
            ..Default::default()
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self::new(LibrarySnapshot::from_json(raw)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Store(format!("Failed to read library {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn with_recursive_collections(mut self, recursive: bool) -> Self {
        self.recursive_collections = recursive;
        self
    }

    pub fn item_count(&self) -> usize {
        self.inner.snapshot.items.len()
    }
}

impl LibraryStore for MemoryLibrary {
    fn user_library_id(&self) -> LibraryId {
        self.inner.snapshot.library_id
    }

    fn item_by_key(&self, library_id: LibraryId, key: &str) -> Result<Option<Item>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .items
            .iter()
            .find(|i| i.library_id == library_id && i.key == key)
            .cloned())
    }

    fn item_by_id(&self, id: ItemId) -> Result<Option<Item>> {
        let inner = &self.inner;
        Ok(inner
            .by_id
            .get(&id)
            .map(|idx| inner.snapshot.items[*idx].clone()))
    }

    fn search(&self, query: &ItemQuery) -> Result<Vec<ItemId>> {
        let compiled = query.compile()?;
        let inner = &self.inner;
        let library_id = query.library_id.unwrap_or(inner.snapshot.library_id);
        Ok(inner
            .snapshot
            .items
            .iter()
            .filter(|item| item.library_id == library_id)
            .filter(|item| {
                compiled
                    .iter()
                    .all(|cond| inner.evaluate(item, cond, self.recursive_collections))
            })
            .map(|item| item.id)
            .collect())
    }

    fn child_items(&self, parent_id: ItemId) -> Result<Vec<Item>> {
        let inner = &self.inner;
        Ok(inner.children_of(parent_id).cloned().collect())
    }

    fn collection_by_key(&self, library_id: LibraryId, key: &str) -> Result<Option<Collection>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .collections
            .iter()
            .find(|c| c.library_id == library_id && c.key == key)
            .cloned())
    }

    fn collection_by_id(&self, collection_id: CollectionId) -> Result<Option<Collection>> {
        let inner = &self.inner;
        Ok(inner
            .collection_by_id
            .get(&collection_id)
            .map(|idx| inner.snapshot.collections[*idx].clone()))
    }

    fn collections(&self, library_id: LibraryId) -> Result<Vec<Collection>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .collections
            .iter()
            .filter(|c| c.library_id == library_id)
            .cloned()
            .collect())
    }

    fn collection_item_ids(&self, collection_id: CollectionId) -> Result<Vec<ItemId>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .items
            .iter()
            .filter(|i| i.collections.contains(&collection_id))
            .map(|i| i.id)
            .collect())
    }

    fn annotations_for(&self, attachment_id: ItemId) -> Result<Vec<Annotation>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .annotations
            .iter()
            .filter(|a| a.parent_id == attachment_id)
            .cloned()
            .collect())
    }

    fn annotation_by_key(&self, key: &str) -> Result<Option<Annotation>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .annotations
            .iter()
            .find(|a| a.key == key)
            .cloned())
    }

    fn all_annotations(&self, library_id: LibraryId) -> Result<Vec<Annotation>> {
        let inner = &self.inner;
        Ok(inner
            .snapshot
            .annotations
            .iter()
            .filter(|a| {
                inner
                    .by_id
                    .get(&a.parent_id)
                    .map(|idx| inner.snapshot.items[*idx].library_id == library_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filter::SearchOperator;

    const SNAPSHOT: &str = r#"{
        "libraryId": 1,
        "collections": [
            {"id": 1, "key": "PARENT01", "name": "Parent", "parentId": null},
            {"id": 2, "key": "CHILD001", "name": "Child", "parentId": 1}
        ],
        "items": [
            {"id": 1, "key": "ITEM0001", "itemType": "journalArticle",
             "fields": {"title": "Deep Learning", "date": "2015-05-28", "DOI": "10.1038/nature14539"},
             "creators": [{"firstName": "Yann", "lastName": "LeCun"}],
             "tags": ["AI", "Review"], "collections": [2],
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-02T00:00:00Z"},
            {"id": 2, "key": "ITEM0002", "itemType": "book",
             "fields": {"title": "Graph Theory", "date": "1998"},
             "creators": [{"firstName": "Reinhard", "lastName": "Diestel"}],
             "tags": ["Math"], "collections": [1],
             "dateAdded": "2024-02-01T00:00:00Z", "dateModified": "2024-02-02T00:00:00Z"},
            {"id": 3, "key": "ATTACH01", "itemType": "attachment", "parentId": 1,
             "fields": {"title": "Full Text PDF"},
             "attachment": {"contentType": "application/pdf", "filename": "lecun.pdf"},
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-01T00:00:00Z"}
        ],
        "annotations": [
            {"key": "ANNOT001", "parentId": 3, "type": "highlight", "text": "representation learning",
             "dateModified": "2024-01-03T00:00:00Z"}
        ]
    }"#;

    fn library() -> MemoryLibrary {
        MemoryLibrary::from_json(SNAPSHOT).unwrap()
    }

    #[test]
    fn test_lookup_by_key_and_id() {
        let lib = library();
        assert_eq!(lib.item_by_key(1, "ITEM0002").unwrap().unwrap().id, 2);
        assert!(lib.item_by_key(2, "ITEM0002").unwrap().is_none());
        assert_eq!(lib.item_by_id(3).unwrap().unwrap().key, "ATTACH01");
        assert_eq!(lib.items_by_ids(&[2, 99, 1]).unwrap().len(), 2);
    }

    #[test]
    fn test_search_conditions() {
        let lib = library();
        let query = ItemQuery::new(None)
            .with(SearchField::QuickSearch, SearchOperator::Contains, "lecun")
            .with(SearchField::ItemType, SearchOperator::IsNot, "attachment");
        assert_eq!(lib.search(&query).unwrap(), vec![1]);

        let query = ItemQuery::new(None).with(SearchField::Year, SearchOperator::Is, "1998");
        assert_eq!(lib.search(&query).unwrap(), vec![2]);

        let query =
            ItemQuery::new(None).with(SearchField::HasAttachment, SearchOperator::Is, "true");
        assert_eq!(lib.search(&query).unwrap(), vec![1]);
    }

    #[test]
    fn test_collection_recursion() {
        let query =
            ItemQuery::new(None).with(SearchField::Collection, SearchOperator::Is, "PARENT01");
        assert_eq!(library().search(&query).unwrap(), vec![2]);
        let recursive = library().with_recursive_collections(true);
        assert_eq!(recursive.search(&query).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_children_and_annotations() {
        let lib = library();
        let children = lib.child_items(1).unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_attachment());
        assert_eq!(lib.annotations_for(3).unwrap().len(), 1);
        assert!(lib.annotation_by_key("ANNOT001").unwrap().is_some());
        assert_eq!(lib.all_annotations(1).unwrap().len(), 1);
        assert_eq!(lib.child_collections(1).unwrap()[0].key, "CHILD001");
    }

    #[test]
    fn test_load_missing_file_is_store_error() {
        let err = MemoryLibrary::load(Path::new("/nonexistent/library.json")).err().unwrap();
        assert!(matches!(err, BridgeError::Store(_)));
    }
}
