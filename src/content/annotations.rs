//! Annotation retrieval, relevance search and output shaping
//!
//! PDF annotations and child notes are exposed through one view type so
//! that search can rank both. Output modes trade detail for size:
//!
//! - `full`: everything
//! - `preview`: content cut to [`PREVIEW_CHARS`]
//! - `minimal`: content cut to [`MINIMAL_CHARS`], no comment or tags
//! - `smart`: full while the token budget allows, then degrade

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::storage::LibraryStore;
use crate::types::{Annotation, Item, Pagination, QueryParams};

use super::{now_rfc3339, strip_html, text_length};

pub const DEFAULT_ITEM_ANNOTATIONS_LIMIT: usize = 20;
pub const MAX_ITEM_ANNOTATIONS_LIMIT: usize = 100;
pub const DEFAULT_SEARCH_LIMIT: usize = 15;
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.1;
pub const DEFAULT_MAX_TOKENS: usize = 10_000;
pub const PREVIEW_CHARS: usize = 300;
pub const MINIMAL_CHARS: usize = 100;
const CHARS_PER_TOKEN: usize = 4;
const COMMENT_BONUS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Smart,
    Preview,
    Full,
    Minimal,
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "smart" => Ok(OutputMode::Smart),
            "preview" => Ok(OutputMode::Preview),
            "full" => Ok(OutputMode::Full),
            "minimal" => Ok(OutputMode::Minimal),
            _ => Err(format!(
                "Unsupported outputMode: {}. Use 'smart', 'preview', 'full' or 'minimal'.",
                s
            )),
        }
    }
}

/// An annotation or note as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationView {
    pub id: String,
    /// Top-level item the annotation belongs to
    pub item_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_key: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub page: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub date_modified: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

impl AnnotationView {
    fn size(&self) -> usize {
        text_length(&self.content) + text_length(&self.comment)
    }

    fn shaped(mut self, mode: OutputMode) -> Self {
        match mode {
            OutputMode::Full | OutputMode::Smart => self,
            OutputMode::Preview => {
                self.truncate(PREVIEW_CHARS);
                self
            }
            OutputMode::Minimal => {
                self.truncate(MINIMAL_CHARS);
                self.comment.clear();
                self.tags.clear();
                self
            }
        }
    }

    fn truncate(&mut self, max_chars: usize) {
        if text_length(&self.content) > max_chars {
            let cut: String = self.content.chars().take(max_chars).collect();
            self.content = format!("{}...", cut);
            self.truncated = true;
        }
    }
}

/// Paginated annotations of one item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPage {
    pub pagination: Pagination,
    pub total_count: usize,
    pub version: &'static str,
    pub endpoint: &'static str,
    pub item_key: String,
    pub annotations: Vec<AnnotationView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnnotations {
    pub results: Vec<AnnotationView>,
    pub requested_count: usize,
    pub found_count: usize,
    pub timestamp: String,
}

fn default_min_relevance() -> f64 {
    DEFAULT_MIN_RELEVANCE
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_lookup_limit() -> usize {
    DEFAULT_ITEM_ANNOTATIONS_LIMIT
}

/// Relevance search over annotations and notes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSearch {
    pub q: String,
    #[serde(default)]
    pub item_keys: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    /// Annotations must carry at least one of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    pub color: Option<String>,
    pub has_comment: Option<bool>,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl AnnotationSearch {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            item_keys: Vec::new(),
            types: Vec::new(),
            tags: Vec::new(),
            color: None,
            has_comment: None,
            output_mode: OutputMode::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            limit: DEFAULT_SEARCH_LIMIT,
            offset: 0,
        }
    }

    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let q = params
            .get_non_empty("q")
            .ok_or_else(|| BridgeError::validation("Missing query parameter 'q'"))?;
        let mut search = Self::new(q);
        search.item_keys = params.get_list("itemKeys");
        search.types = params.get_list("types");
        search.tags = params.get_list("tags");
        search.color = params.get_non_empty("color").map(str::to_string);
        search.has_comment = match params.get_non_empty("hasComment") {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                return Err(BridgeError::validation(format!(
                    "Invalid hasComment: '{}'. Use 'true' or 'false'.",
                    other
                )))
            }
        };
        if let Some(mode) = params.get_non_empty("outputMode") {
            search.output_mode = mode.parse().map_err(BridgeError::Validation)?;
        }
        search.max_tokens = params
            .parse_usize("maxTokens", DEFAULT_MAX_TOKENS)
            .map_err(BridgeError::Validation)?;
        if let Some(raw) = params.get_non_empty("minRelevance") {
            search.min_relevance = raw.trim().parse().map_err(|_| {
                BridgeError::validation(format!("Invalid minRelevance: '{}'", raw))
            })?;
        }
        search.limit = params
            .parse_usize("limit", DEFAULT_SEARCH_LIMIT)
            .map_err(BridgeError::Validation)?;
        search.offset = params.parse_usize("offset", 0).map_err(BridgeError::Validation)?;
        Ok(search)
    }
}

/// Annotation lookup by item or by id(s)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationLookup {
    pub item_key: Option<String>,
    pub annotation_id: Option<String>,
    pub annotation_ids: Option<Vec<String>>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_lookup_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

pub struct AnnotationService {
    store: Arc<dyn LibraryStore>,
}

impl AnnotationService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    /// Top-level item for an attachment (or the attachment itself when standalone)
    fn owner_of(&self, attachment: &Item) -> Result<Item> {
        match attachment.parent_id {
            Some(parent) => Ok(self
                .store
                .item_by_id(parent)?
                .unwrap_or_else(|| attachment.clone())),
            None => Ok(attachment.clone()),
        }
    }

    fn view(&self, annotation: &Annotation) -> Result<AnnotationView> {
        let attachment = self.store.item_by_id(annotation.parent_id)?;
        let (item_key, attachment_key) = match &attachment {
            Some(att) => (self.owner_of(att)?.key, Some(att.key.clone())),
            None => (String::new(), None),
        };
        Ok(annotation_view(annotation, item_key, attachment_key))
    }

    /// Annotations on an item's attachments, or on the attachment itself
    fn annotations_of(&self, item: &Item) -> Result<Vec<AnnotationView>> {
        let attachments = if item.is_attachment() {
            vec![item.clone()]
        } else {
            self.store
                .child_items(item.id)?
                .into_iter()
                .filter(Item::is_attachment)
                .collect()
        };
        let owner_key = if item.is_attachment() {
            self.owner_of(item)?.key
        } else {
            item.key.clone()
        };
        let mut views = Vec::new();
        for attachment in attachments {
            for annotation in self.store.annotations_for(attachment.id)? {
                views.push(annotation_view(
                    &annotation,
                    owner_key.clone(),
                    Some(attachment.key.clone()),
                ));
            }
        }
        Ok(views)
    }

    fn require_item(&self, key: &str) -> Result<Item> {
        self.store
            .item_by_key(self.store.user_library_id(), key)?
            .ok_or_else(|| BridgeError::not_found(format!("Item with key {} not found", key)))
    }

    /// Annotations of one item filtered by `type` (comma list) and exact `color`
    pub fn for_item(&self, key: &str, params: &QueryParams) -> Result<AnnotationPage> {
        let item = self.require_item(key)?;
        let types = params.get_list("type");
        let color = params.get_non_empty("color");
        let limit = params
            .parse_usize("limit", DEFAULT_ITEM_ANNOTATIONS_LIMIT)
            .map_err(BridgeError::Validation)?
            .min(MAX_ITEM_ANNOTATIONS_LIMIT);
        let offset = params.parse_usize("offset", 0).map_err(BridgeError::Validation)?;

        let views: Vec<AnnotationView> = self
            .annotations_of(&item)?
            .into_iter()
            .filter(|v| types.is_empty() || types.contains(&v.kind))
            .filter(|v| color.map_or(true, |c| v.color == c))
            .collect();
        let total = views.len();
        Ok(AnnotationPage {
            pagination: Pagination::new(limit, offset, total),
            total_count: total,
            version: "2.0",
            endpoint: "items/annotations",
            item_key: item.key,
            annotations: views.into_iter().skip(offset).take(limit).collect(),
        })
    }

    pub fn by_id(&self, id: &str) -> Result<AnnotationView> {
        let annotation = self
            .store
            .annotation_by_key(id)?
            .ok_or_else(|| BridgeError::not_found("Annotation not found"))?;
        self.view(&annotation)
    }

    /// Look up annotations listed in a `{"ids": [...]}` body; unknown ids are skipped
    pub fn batch(&self, body: &str) -> Result<BatchAnnotations> {
        let request: Value = serde_json::from_str(body)
            .map_err(|_| BridgeError::validation("Invalid JSON in request body"))?;
        let ids: Vec<String> = request
            .get("ids")
            .and_then(Value::as_array)
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| BridgeError::validation("ids must be a non-empty array"))?
            .iter()
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let results = self.lookup_ids(&ids)?;
        Ok(BatchAnnotations {
            requested_count: ids.len(),
            found_count: results.len(),
            results,
            timestamp: now_rfc3339(),
        })
    }

    fn lookup_ids(&self, ids: &[String]) -> Result<Vec<AnnotationView>> {
        let mut results = Vec::new();
        for id in ids {
            match self.store.annotation_by_key(id)? {
                Some(annotation) => results.push(self.view(&annotation)?),
                None => debug!(id = %id, "Annotation id not found"),
            }
        }
        Ok(results)
    }

    /// Every annotation plus notes, the search pool
    fn pool(&self) -> Result<Vec<AnnotationView>> {
        let library_id = self.store.user_library_id();
        let mut pool = Vec::new();
        for annotation in self.store.all_annotations(library_id)? {
            pool.push(self.view(&annotation)?);
        }
        let note_ids = self.store.search(&crate::storage::ItemQuery::new(Some(library_id)))?;
        for note in self.store.items_by_ids(&note_ids)?.into_iter().filter(Item::is_note) {
            let owner_key = match note.parent_id {
                Some(parent) => self
                    .store
                    .item_by_id(parent)?
                    .map(|p| p.key)
                    .unwrap_or_else(|| note.key.clone()),
                None => note.key.clone(),
            };
            pool.push(note_view(&note, owner_key));
        }
        Ok(pool)
    }

    pub fn search(&self, search: &AnnotationSearch) -> Result<Value> {
        let terms: Vec<String> = search
            .q
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Err(BridgeError::validation("Missing query parameter 'q'"));
        }
        let item_keys: HashSet<&str> = search.item_keys.iter().map(String::as_str).collect();

        let mut scored: Vec<AnnotationView> = self
            .pool()?
            .into_iter()
            .filter(|v| search.types.is_empty() || search.types.contains(&v.kind))
            .filter(|v| search.color.as_deref().map_or(true, |c| v.color == c))
            .filter(|v| {
                search
                    .has_comment
                    .map_or(true, |wanted| wanted == !v.comment.trim().is_empty())
            })
            .filter(|v| {
                search.tags.is_empty()
                    || v.tags
                        .iter()
                        .any(|t| search.tags.iter().any(|q| q.eq_ignore_ascii_case(t)))
            })
            .filter(|v| {
                item_keys.is_empty()
                    || item_keys.contains(v.item_key.as_str())
                    || v.attachment_key
                        .as_deref()
                        .is_some_and(|k| item_keys.contains(k))
            })
            .filter_map(|mut v| {
                let score = relevance(&v, &terms)?;
                (score >= search.min_relevance).then(|| {
                    v.relevance = Some(score);
                    v
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.relevance
                .unwrap_or(0.0)
                .total_cmp(&a.relevance.unwrap_or(0.0))
        });

        let total = scored.len();
        let page: Vec<_> = scored
            .into_iter()
            .skip(search.offset)
            .take(search.limit)
            .collect();
        debug!(query = %search.q, total, "Annotation search complete");

        let shaped = shape(page, search.output_mode, search.max_tokens);
        Ok(json!({
            "data": shaped.views,
            "metadata": {
                "query": search.q,
                "pagination": Pagination::new(search.limit, search.offset, total),
                "totalCount": total,
                "outputMode": search.output_mode,
                "estimatedTokens": shaped.estimated_tokens,
                "omittedForBudget": shaped.omitted,
            }
        }))
    }

    /// Annotations by item key, single id or id list
    pub fn lookup(&self, lookup: &AnnotationLookup) -> Result<Value> {
        let views = if let Some(id) = &lookup.annotation_id {
            vec![self.by_id(id)?]
        } else if let Some(ids) = lookup.annotation_ids.as_ref().filter(|ids| !ids.is_empty()) {
            self.lookup_ids(ids)?
        } else if let Some(key) = &lookup.item_key {
            let item = self.require_item(key)?;
            self.annotations_of(&item)?
        } else {
            return Err(BridgeError::validation(
                "One of itemKey, annotationId or annotationIds is required",
            ));
        };

        let views: Vec<_> = views
            .into_iter()
            .filter(|v| lookup.types.is_empty() || lookup.types.contains(&v.kind))
            .collect();
        let total = views.len();
        let page: Vec<_> = views
            .into_iter()
            .skip(lookup.offset)
            .take(lookup.limit)
            .collect();
        let shaped = shape(page, lookup.output_mode, lookup.max_tokens);
        Ok(json!({
            "data": shaped.views,
            "metadata": {
                "pagination": Pagination::new(lookup.limit, lookup.offset, total),
                "totalCount": total,
                "outputMode": lookup.output_mode,
                "estimatedTokens": shaped.estimated_tokens,
                "omittedForBudget": shaped.omitted,
            }
        }))
    }
}

fn annotation_view(annotation: &Annotation, item_key: String, attachment_key: Option<String>) -> AnnotationView {
    AnnotationView {
        id: annotation.key.clone(),
        item_key,
        attachment_key,
        kind: annotation.annotation_type.clone(),
        content: annotation.text.clone(),
        comment: annotation.comment.clone(),
        color: annotation.color.clone(),
        page: annotation.page_label.clone(),
        tags: annotation.tags.clone(),
        date_modified: annotation.date_modified.to_rfc3339(),
        truncated: false,
        relevance: None,
    }
}

fn note_view(note: &Item, item_key: String) -> AnnotationView {
    AnnotationView {
        id: note.key.clone(),
        item_key,
        attachment_key: None,
        kind: "note".to_string(),
        content: strip_html(note.note.as_deref().unwrap_or("")),
        comment: String::new(),
        color: String::new(),
        page: String::new(),
        tags: note.tags.clone(),
        date_modified: note.date_modified.to_rfc3339(),
        truncated: false,
        relevance: None,
    }
}

/// Share of query terms found in content, comment or tags, plus a bonus
/// for commented annotations; `None` when no term matches
pub(crate) fn relevance(view: &AnnotationView, terms: &[String]) -> Option<f64> {
    let haystack = format!(
        "{}\n{}\n{}",
        view.content.to_lowercase(),
        view.comment.to_lowercase(),
        view.tags.join(" ").to_lowercase()
    );
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    if matched == 0 {
        return None;
    }
    let mut score = matched as f64 / terms.len() as f64;
    if !view.comment.trim().is_empty() {
        score += COMMENT_BONUS;
    }
    Some(score.min(1.0))
}

struct Shaped {
    views: Vec<AnnotationView>,
    estimated_tokens: usize,
    omitted: usize,
}

/// Apply an output mode; `smart` degrades full → preview → minimal per entry
/// to stay within `max_tokens` and drops entries that no longer fit
fn shape(views: Vec<AnnotationView>, mode: OutputMode, max_tokens: usize) -> Shaped {
    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let mut used = 0;
    let mut out = Vec::with_capacity(views.len());
    let mut omitted = 0;

    for view in views {
        let shaped = if mode == OutputMode::Smart {
            let remaining = budget.saturating_sub(used);
            [OutputMode::Full, OutputMode::Preview, OutputMode::Minimal]
                .into_iter()
                .map(|m| view.clone().shaped(m))
                .find(|candidate| candidate.size() <= remaining)
        } else {
            Some(view.shaped(mode))
        };
        match shaped {
            Some(v) => {
                used += v.size();
                out.push(v);
            }
            None => omitted += 1,
        }
    }

    Shaped {
        views: out,
        estimated_tokens: used.div_ceil(CHARS_PER_TOKEN),
        omitted,
    }
}
