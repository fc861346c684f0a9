//! Library search
//!
//! Implements:
//! - Flat parameter parsing and validation
//! - Compound field conditions against the item store
//! - In-memory tag-set filtering (any / all / none)
//! - Stable sorting and pagination

mod params;
mod sort;
pub mod tags;

pub use params::{parse_search_params, parse_year_range, DEFAULT_LIMIT, MAX_LIMIT};
pub use sort::{paginate, sort_by_field, sort_key};
pub use tags::{filter_by_tags, TagFilterOutcome, TagQuery, Tagged};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::Result;
use crate::storage::{ItemQuery, LibraryStore, SearchField, SearchOperator};
use crate::types::{
    Item, ItemSummary, Pagination, QueryParams, SearchQuery, SearchResult, TitleOperator,
    ATTACHMENT_TYPE, NOTE_TYPE,
};

/// Executes [`SearchQuery`]s against a library
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn LibraryStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    /// Parse flat request parameters and run the search
    pub fn search_params(&self, params: &QueryParams) -> Result<SearchResult> {
        let query = parse_search_params(params)?;
        self.search(&query)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let started = Instant::now();
        let library_id = query
            .library_id
            .unwrap_or_else(|| self.store.user_library_id());

        if let Some(key) = &query.key {
            let item = self.store.item_by_key(library_id, key)?;
            let total = usize::from(item.is_some());
            debug!(key = %key, found = total, "Search by key");
            return Ok(SearchResult {
                query: query.clone(),
                pagination: Pagination {
                    limit: 1,
                    offset: 0,
                    total,
                    has_more: false,
                },
                matched_tags: HashMap::new(),
                search_time: elapsed(started),
                results: item.iter().map(ItemSummary::from_item).collect(),
            });
        }

        let Some(item_query) = self.build_item_query(query, library_id)? else {
            debug!(collection = ?query.collection, "Unknown collection, empty result");
            return Ok(empty_result(query, started));
        };

        let ids = self.store.search(&item_query)?;
        if ids.is_empty() {
            return Ok(empty_result(query, started));
        }
        let items = self.store.items_by_ids(&ids)?;

        let tag_query = TagQuery::new(query.tags.iter().cloned(), query.tag_mode, query.tag_match);
        let (candidates, matched_counts): (Vec<(Item, Option<Vec<String>>)>, _) =
            if tag_query.is_empty() {
                (items.into_iter().map(|i| (i, None)).collect(), HashMap::new())
            } else {
                let outcome = filter_by_tags(items, &tag_query);
                (
                    outcome
                        .items
                        .into_iter()
                        .map(|(item, matched)| (item, Some(matched)))
                        .collect(),
                    outcome.matched_counts,
                )
            };

        let sorted = sort_by_field(candidates, query.sort, query.direction, |(item, _)| item);
        let total = sorted.len();
        let results = paginate(sorted, query.offset, query.limit)
            .into_iter()
            .map(|(item, matched)| ItemSummary {
                matched_tags: matched,
                ..ItemSummary::from_item(&item)
            })
            .collect();

        debug!(total, candidates = ids.len(), "Search completed");
        Ok(SearchResult {
            query: query.clone(),
            pagination: Pagination::new(query.limit, query.offset, total),
            matched_tags: matched_counts,
            search_time: elapsed(started),
            results,
        })
    }

    /// Base conjunctive query; `None` when the requested collection does not exist
    fn build_item_query(&self, query: &SearchQuery, library_id: i64) -> Result<Option<ItemQuery>> {
        let mut q = ItemQuery::new(Some(library_id));

        if let Some(text) = &query.q {
            q.add(SearchField::QuickSearch, SearchOperator::Contains, text);
        }
        if let Some(title) = &query.title {
            let op = match query.title_operator {
                TitleOperator::Contains => SearchOperator::Contains,
                TitleOperator::Exact => SearchOperator::Is,
                TitleOperator::StartsWith => SearchOperator::BeginsWith,
                TitleOperator::EndsWith => SearchOperator::EndsWith,
                TitleOperator::Regex => SearchOperator::Matches,
            };
            q.add(SearchField::Title, op, title);
        }
        if let Some(creator) = &query.creator {
            q.add(SearchField::Creator, SearchOperator::Contains, creator);
        }
        if let Some(year) = &query.year {
            q.add(SearchField::Year, SearchOperator::Is, year);
        }
        if let Some(range) = &query.year_range {
            if let Some(from) = range.from {
                q.add(SearchField::Year, SearchOperator::IsAtLeast, from.to_string());
            }
            if let Some(to) = range.to {
                q.add(SearchField::Year, SearchOperator::IsAtMost, to.to_string());
            }
        }
        if let Some(item_type) = &query.item_type {
            q.add(SearchField::ItemType, SearchOperator::Is, item_type);
        }
        if let Some(doi) = &query.doi {
            q.add(SearchField::Doi, SearchOperator::Contains, doi);
        }
        if let Some(isbn) = &query.isbn {
            q.add(SearchField::Isbn, SearchOperator::Contains, isbn);
        }
        if let Some(key) = &query.collection {
            match self.store.collection_by_key(library_id, key)? {
                Some(collection) => {
                    q.add(SearchField::Collection, SearchOperator::Is, collection.key)
                }
                None => return Ok(None),
            }
        }
        if let Some(has) = query.has_attachment {
            q.add(SearchField::HasAttachment, SearchOperator::Is, has.to_string());
        }
        if let Some(has) = query.has_note {
            q.add(SearchField::HasNote, SearchOperator::Is, has.to_string());
        }
        if !query.include_attachments {
            q.add(SearchField::ItemType, SearchOperator::IsNot, ATTACHMENT_TYPE);
        }
        if !query.include_notes {
            q.add(SearchField::ItemType, SearchOperator::IsNot, NOTE_TYPE);
        }

        Ok(Some(q))
    }
}

fn elapsed(started: Instant) -> String {
    format!("{}ms", started.elapsed().as_millis())
}

fn empty_result(query: &SearchQuery, started: Instant) -> SearchResult {
    SearchResult {
        query: query.clone(),
        pagination: Pagination::new(query.limit, query.offset, 0),
        matched_tags: HashMap::new(),
        search_time: elapsed(started),
        results: Vec::new(),
    }
}
