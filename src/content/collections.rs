//! Collection listing, search and detail views

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::storage::LibraryStore;
use crate::types::{Collection, ItemSummary, Pagination, QueryParams, SortOrder};

use super::formatter::format_item;

pub const DEFAULT_COLLECTION_LIMIT: usize = 100;
pub const DEFAULT_DETAIL_ITEMS_LIMIT: usize = 50;
pub const DEFAULT_COLLECTION_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionSort {
    #[default]
    Name,
    Key,
    DateModified,
}

impl std::str::FromStr for CollectionSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(CollectionSort::Name),
            "key" => Ok(CollectionSort::Key),
            "dateModified" => Ok(CollectionSort::DateModified),
            _ => Err(format!(
                "Unsupported sort field: {}. Use 'name', 'key' or 'dateModified'.",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionListOptions {
    pub sort: CollectionSort,
    pub direction: SortOrder,
    /// Only children of this collection key
    pub parent: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for CollectionListOptions {
    fn default() -> Self {
        Self {
            sort: CollectionSort::Name,
            direction: SortOrder::Asc,
            parent: None,
            limit: DEFAULT_COLLECTION_LIMIT,
            offset: 0,
        }
    }
}

impl CollectionListOptions {
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let mut options = Self::default();
        if let Some(sort) = params.get_non_empty("sort") {
            options.sort = sort.parse().map_err(BridgeError::Validation)?;
        }
        if let Some(direction) = params.get_non_empty("direction") {
            options.direction = direction.parse().map_err(BridgeError::Validation)?;
        }
        options.parent = params.get_non_empty("parentCollection").map(str::to_string);
        options.limit = params
            .parse_usize("limit", DEFAULT_COLLECTION_LIMIT)
            .map_err(BridgeError::Validation)?;
        options.offset = params.parse_usize("offset", 0).map_err(BridgeError::Validation)?;
        Ok(options)
    }
}

/// A page of JSON records plus the unpaginated total
#[derive(Debug, Clone)]
pub struct Listing {
    pub total: usize,
    pub entries: Vec<Value>,
}

pub struct CollectionService {
    store: Arc<dyn LibraryStore>,
}

impl CollectionService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    fn require(&self, key: &str) -> Result<Collection> {
        let library_id = self.store.user_library_id();
        self.store.collection_by_key(library_id, key)?.ok_or_else(|| {
            BridgeError::not_found(format!("Collection with key {} not found", key))
        })
    }

    fn summary(&self, collection: &Collection, all: &[Collection]) -> Result<Value> {
        let parent_key = collection
            .parent_id
            .and_then(|pid| all.iter().find(|c| c.id == pid))
            .map(|p| p.key.clone());
        let item_count = self.store.collection_item_ids(collection.id)?.len();
        let child_count = all
            .iter()
            .filter(|c| c.parent_id == Some(collection.id))
            .count();
        Ok(json!({
            "key": collection.key,
            "name": collection.name,
            "parentCollection": parent_key,
            "itemCount": item_count,
            "childCollectionCount": child_count,
            "dateModified": collection.date_modified.map(|d| d.to_rfc3339()),
        }))
    }

    pub fn list(&self, options: &CollectionListOptions) -> Result<Listing> {
        let all = self.store.collections(self.store.user_library_id())?;
        let mut selected: Vec<&Collection> = match &options.parent {
            Some(parent_key) => {
                let parent = all.iter().find(|c| &c.key == parent_key).ok_or_else(|| {
                    BridgeError::not_found(format!("Parent collection {} not found", parent_key))
                })?;
                all.iter().filter(|c| c.parent_id == Some(parent.id)).collect()
            }
            None => all.iter().collect(),
        };

        selected.sort_by(|a, b| {
            let ordering = match options.sort {
                CollectionSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                CollectionSort::Key => a.key.cmp(&b.key),
                CollectionSort::DateModified => a.date_modified.cmp(&b.date_modified),
            };
            match options.direction {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = selected.len();
        let entries = selected
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .map(|c| self.summary(c, &all))
            .collect::<Result<Vec<_>>>()?;
        Ok(Listing { total, entries })
    }

    /// Case-insensitive name substring match
    pub fn search(&self, query: &str, limit: usize) -> Result<Listing> {
        let query = query.trim();
        if query.is_empty() {
            return Err(BridgeError::validation("Missing query parameter 'q'"));
        }
        let needle = query.to_lowercase();
        let all = self.store.collections(self.store.user_library_id())?;
        let matches: Vec<&Collection> = all
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect();
        let total = matches.len();
        let entries = matches
            .into_iter()
            .take(limit)
            .map(|c| self.summary(c, &all))
            .collect::<Result<Vec<_>>>()?;
        Ok(Listing { total, entries })
    }

    pub fn details(
        &self,
        key: &str,
        include_items: bool,
        include_subcollections: bool,
        items_limit: usize,
    ) -> Result<Value> {
        let collection = self.require(key)?;
        let all = self.store.collections(collection.library_id)?;
        let mut value = self.summary(&collection, &all)?;

        if include_subcollections {
            let children = all
                .iter()
                .filter(|c| c.parent_id == Some(collection.id))
                .map(|c| self.summary(c, &all))
                .collect::<Result<Vec<_>>>()?;
            value["subcollections"] = json!(children);
        }

        if include_items {
            let ids = self.store.collection_item_ids(collection.id)?;
            let items = self.store.items_by_ids(&ids)?;
            let summaries: Vec<ItemSummary> = items
                .iter()
                .filter(|i| i.is_regular())
                .take(items_limit)
                .map(ItemSummary::from_item)
                .collect();
            value["items"] = json!(summaries);
        }
        Ok(value)
    }

    /// Name search driven by `q` and `limit`
    pub fn search_params(&self, params: &QueryParams) -> Result<Listing> {
        let limit = params
            .parse_usize("limit", DEFAULT_COLLECTION_SEARCH_LIMIT)
            .map_err(BridgeError::Validation)?;
        self.search(params.get("q").unwrap_or_default(), limit)
    }

    /// Details driven by `includeItems`, `includeSubcollections` and `itemsLimit`
    pub fn details_params(&self, key: &str, params: &QueryParams) -> Result<Value> {
        let items_limit = params
            .parse_usize("itemsLimit", DEFAULT_DETAIL_ITEMS_LIMIT)
            .map_err(BridgeError::Validation)?;
        self.details(
            key,
            params.flag("includeItems"),
            params.flag("includeSubcollections"),
            items_limit,
        )
    }

    /// Items driven by `limit`, `offset` and a comma-separated `fields` list
    pub fn items_params(&self, key: &str, params: &QueryParams) -> Result<Listing> {
        let limit = params
            .parse_usize("limit", DEFAULT_COLLECTION_LIMIT)
            .map_err(BridgeError::Validation)?;
        let offset = params.parse_usize("offset", 0).map_err(BridgeError::Validation)?;
        self.items(key, limit, offset, &params.get_list("fields"))
    }

    /// Regular items of a collection, formatted with `fields`
    pub fn items(&self, key: &str, limit: usize, offset: usize, fields: &[String]) -> Result<Listing> {
        let collection = self.require(key)?;
        let ids = self.store.collection_item_ids(collection.id)?;
        let items: Vec<_> = self
            .store
            .items_by_ids(&ids)?
            .into_iter()
            .filter(|i| i.is_regular())
            .collect();
        let total = items.len();
        let entries = items
            .iter()
            .skip(offset)
            .take(limit)
            .map(|item| format_item(self.store.as_ref(), item, fields))
            .collect::<Result<Vec<_>>>()?;
        Ok(Listing { total, entries })
    }

    /// `{collectionKey, pagination, items}` for the collection-items tool
    pub fn items_page(&self, key: &str, limit: usize, offset: usize) -> Result<Value> {
        let listing = self.items(key, limit, offset, &[])?;
        Ok(json!({
            "collectionKey": key,
            "pagination": Pagination::new(limit, offset, listing.total),
            "items": listing.entries,
        }))
    }
}
