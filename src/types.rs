//! Core types for the Zotero bridge

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Internal numeric identifier of an item in the store
pub type ItemId = i64;

/// Internal numeric identifier of a collection
pub type CollectionId = i64;

/// Identifier of a library (the user library, or a group library)
pub type LibraryId = i64;

/// Item types treated as non-regular and excluded from default search scope
pub const ATTACHMENT_TYPE: &str = "attachment";
pub const NOTE_TYPE: &str = "note";

/// A creator (author, editor, ...) attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_creator_type")]
    pub creator_type: String,
}

fn default_creator_type() -> String {
    "author".to_string()
}

impl Creator {
    /// "First Last", trimmed when either part is empty
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// File-level details of an attachment item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub filename: String,
    /// Absolute path on disk, if the file is stored locally
    pub path: Option<String>,
    #[serde(default)]
    pub link_mode: i32,
    /// Cached extracted text (the host's fulltext cache)
    pub text: Option<String>,
}

/// A bibliographic record, attachment or note in the library
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub key: String,
    #[serde(default)]
    pub library_id: LibraryId,
    pub item_type: String,
    /// Bibliographic fields keyed by the host's field names (title, date, DOI, ...)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Collections this item belongs to directly
    #[serde(default)]
    pub collections: Vec<CollectionId>,
    /// Parent item for attachments and child notes
    pub parent_id: Option<ItemId>,
    pub date_added: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub attachment: Option<AttachmentInfo>,
    /// HTML body of a note item
    pub note: Option<String>,
}

impl Item {
    /// Field value, or empty string when unset
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn is_attachment(&self) -> bool {
        self.item_type == ATTACHMENT_TYPE
    }

    pub fn is_note(&self) -> bool {
        self.item_type == NOTE_TYPE
    }

    pub fn is_regular(&self) -> bool {
        !self.is_attachment() && !self.is_note()
    }

    /// Title used for display; notes fall back to their first line
    pub fn display_title(&self) -> String {
        let title = self.field("title");
        if !title.is_empty() {
            return title.to_string();
        }
        match &self.note {
            Some(html) => crate::content::note_title(html),
            None => String::new(),
        }
    }

    /// Four-digit year pulled out of the date field
    pub fn year(&self) -> Option<i32> {
        extract_year(self.field("date"))
    }

    /// Comma-joined creator display names
    pub fn creators_display(&self) -> String {
        self.creators
            .iter()
            .map(Creator::display_name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4}").unwrap());

/// First four consecutive digits of a free-form date string
///
/// Longer digit runs are not rejected: `"20210304"` gives 2021.
pub fn extract_year(date: &str) -> Option<i32> {
    YEAR_PATTERN.find(date)?.as_str().parse().ok()
}

/// A user-defined grouping of items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: CollectionId,
    pub key: String,
    #[serde(default)]
    pub library_id: LibraryId,
    pub name: String,
    pub parent_id: Option<CollectionId>,
    pub date_modified: Option<DateTime<Utc>>,
}

/// A PDF annotation (highlight, underline, note, ...) on an attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub key: String,
    /// Attachment the annotation was made on
    pub parent_id: ItemId,
    #[serde(rename = "type", alias = "annotationType")]
    pub annotation_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub page_label: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date_modified: DateTime<Utc>,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Decoded query-string parameters; a key may repeat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// First value of a key, ignoring empty strings
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// List-typed parameter: every occurrence split on commas, trimmed,
    /// empties dropped, duplicates removed (first occurrence wins)
    pub fn get_list(&self, key: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for raw in self.get_all(key) {
            for part in raw.split(',') {
                let part = part.trim();
                if !part.is_empty() && !out.iter().any(|existing| existing == part) {
                    out.push(part.to_string());
                }
            }
        }
        out
    }

    /// `true` only for the literal string "true"
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// `false` only for the literal string "false"; anything else is true
    pub fn flag_default_true(&self, key: &str) -> bool {
        self.get(key) != Some("false")
    }

    /// Parse an unsigned number, or fall back to `default` when absent
    pub fn parse_usize(&self, key: &str, default: usize) -> Result<usize, String> {
        match self.get_non_empty(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid {}: '{}' is not a non-negative integer", key, raw)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

// ============================================================================
// Search query model
// ============================================================================

/// Fields the search engine is allowed to sort by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortField {
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "creator")]
    Creator,
    #[default]
    #[serde(rename = "dateAdded")]
    DateAdded,
    #[serde(rename = "dateModified")]
    DateModified,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Date,
        SortField::Title,
        SortField::Creator,
        SortField::DateAdded,
        SortField::DateModified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::Title => "title",
            SortField::Creator => "creator",
            SortField::DateAdded => "dateAdded",
            SortField::DateModified => "dateModified",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unsupported sort field: {}. Supported fields are: {}",
                    s,
                    SortField::ALL
                        .iter()
                        .map(SortField::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!(
                "Unsupported sort direction: {}. Use 'asc' or 'desc'.",
                s
            )),
        }
    }
}

/// Boolean combinator applied across the query tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    Any,
    All,
    None,
}

impl std::str::FromStr for TagMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(TagMode::Any),
            "all" => Ok(TagMode::All),
            "none" => Ok(TagMode::None),
            _ => Err(format!(
                "Unsupported tagMode: {}. Use 'any', 'all' or 'none'.",
                s
            )),
        }
    }
}

/// String comparison used between a query tag and an item tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TagMatch {
    #[default]
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startsWith")]
    StartsWith,
}

impl std::str::FromStr for TagMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(TagMatch::Exact),
            "contains" => Ok(TagMatch::Contains),
            "startsWith" => Ok(TagMatch::StartsWith),
            _ => Err(format!(
                "Unsupported tagMatch: {}. Use 'exact', 'contains' or 'startsWith'.",
                s
            )),
        }
    }
}

/// How the `title` parameter is compared against item titles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TitleOperator {
    #[default]
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "regex")]
    Regex,
}

impl std::str::FromStr for TitleOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(TitleOperator::Contains),
            "exact" => Ok(TitleOperator::Exact),
            "startsWith" => Ok(TitleOperator::StartsWith),
            "endsWith" => Ok(TitleOperator::EndsWith),
            "regex" => Ok(TitleOperator::Regex),
            _ => Err(format!("Unsupported titleOperator: {}", s)),
        }
    }
}

/// Inclusive year bounds; either side may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i32>,
}

/// Structured search request, built from flat query parameters or tool arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Free text matched against every searchable field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Exact item key; bypasses the general query path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub title_operator: TitleOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<YearRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Collection key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_note: Option<bool>,
    #[serde(default)]
    pub include_attachments: bool,
    #[serde(default)]
    pub include_notes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tag_mode: TagMode,
    #[serde(default)]
    pub tag_match: TagMatch,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub direction: SortOrder,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(rename = "libraryID", skip_serializing_if = "Option::is_none")]
    pub library_id: Option<LibraryId>,
}

/// Pagination block of a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub total: usize,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize, total: usize) -> Self {
        Self {
            limit,
            offset,
            total,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

/// Brief item representation used in result lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub key: String,
    pub title: String,
    pub creators: String,
    /// Year extracted from the date field, empty when unknown
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_tags: Option<Vec<String>>,
}

impl ItemSummary {
    pub fn from_item(item: &Item) -> Self {
        let title = item.field("title");
        Self {
            key: item.key.clone(),
            title: if title.is_empty() {
                "No Title".to_string()
            } else {
                title.to_string()
            },
            creators: item.creators_display(),
            date: item.year().map(|y| y.to_string()).unwrap_or_default(),
            matched_tags: None,
        }
    }
}

/// Normalized search envelope shared by REST and MCP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: SearchQuery,
    pub pagination: Pagination,
    pub matched_tags: HashMap<String, usize>,
    pub search_time: String,
    pub results: Vec<ItemSummary>,
}
