//! Item fulltext bundles and fulltext search with context snippets

use serde::Serialize;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::storage::ItemQuery;
use crate::types::{Item, QueryParams};

use super::unified::{abstract_of, AttachmentContent, IncludeOptions, NoteContent, WebpageContent};
use super::{now_rfc3339, text_length, ContentService};

pub const DEFAULT_CONTEXT_LENGTH: usize = 200;
pub const DEFAULT_MAX_RESULTS: usize = 50;
pub const MAX_RESULTS_LIMIT: usize = 200;

/// Which parts of an item's fulltext to return; all on by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FulltextSections {
    pub attachments: bool,
    pub notes: bool,
    pub webpage: bool,
    pub abstract_text: bool,
}

impl Default for FulltextSections {
    fn default() -> Self {
        Self {
            attachments: true,
            notes: true,
            webpage: true,
            abstract_text: true,
        }
    }
}

impl FulltextSections {
    /// Every flag is on unless given as the literal "false"
    pub fn from_params(params: &QueryParams) -> Self {
        Self {
            attachments: params.flag_default_true("attachments"),
            notes: params.flag_default_true("notes"),
            webpage: params.flag_default_true("webpage"),
            abstract_text: params.flag_default_true("abstract"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbstractText {
    pub content: String,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FulltextBody {
    pub attachments: Vec<AttachmentContent>,
    pub notes: Vec<NoteContent>,
    pub webpage: Option<WebpageContent>,
    pub total_length: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFulltext {
    pub item_key: String,
    pub title: String,
    pub item_type: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<AbstractText>,
    pub fulltext: FulltextBody,
    pub extracted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulltextOptions {
    /// Restrict the search to these items
    pub item_keys: Option<Vec<String>>,
    /// Characters of context around each match
    pub context_length: usize,
    pub max_results: usize,
    pub case_sensitive: bool,
}

impl Default for FulltextOptions {
    fn default() -> Self {
        Self {
            item_keys: None,
            context_length: DEFAULT_CONTEXT_LENGTH,
            max_results: DEFAULT_MAX_RESULTS,
            case_sensitive: false,
        }
    }
}

impl FulltextOptions {
    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let item_keys = params.get_list("itemKeys");
        Ok(Self {
            item_keys: (!item_keys.is_empty()).then_some(item_keys),
            context_length: params
                .parse_usize("contextLength", DEFAULT_CONTEXT_LENGTH)
                .map_err(BridgeError::Validation)?,
            max_results: params
                .parse_usize("maxResults", DEFAULT_MAX_RESULTS)
                .map_err(BridgeError::Validation)?
                .min(MAX_RESULTS_LIMIT),
            case_sensitive: params.flag("caseSensitive"),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulltextMatch {
    /// abstract, attachment or note
    pub source: &'static str,
    pub source_key: String,
    /// Character offset of the match within the source text
    pub position: usize,
    pub context: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulltextHit {
    pub item_key: String,
    pub title: String,
    pub match_count: usize,
    pub matches: Vec<FulltextMatch>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulltextSearchResult {
    pub query: String,
    pub total_items: usize,
    pub total_matches: usize,
    pub search_time: String,
    pub results: Vec<FulltextHit>,
}

pub struct FulltextService {
    content: ContentService,
}

impl FulltextService {
    pub fn new(content: ContentService) -> Self {
        Self { content }
    }

    pub fn item_fulltext(&self, key: &str, sections: FulltextSections) -> Result<ItemFulltext> {
        let item = self.content.require_item(key)?;
        let include = IncludeOptions {
            pdf: sections.attachments,
            attachments: sections.attachments,
            notes: false,
            abstract_text: false,
            webpage: false,
        };
        let attachments = if sections.attachments {
            self.content.attachments_of(&item, include)?
        } else {
            Vec::new()
        };
        let notes = if sections.notes {
            self.content.notes_of(&item)?
        } else {
            Vec::new()
        };
        let webpage = if sections.webpage {
            self.content.webpage_of(&item)?
        } else {
            None
        };
        let abstract_text = if sections.abstract_text {
            abstract_of(&item).map(|content| AbstractText {
                length: text_length(&content),
                content,
            })
        } else {
            None
        };

        let total_length = abstract_text.as_ref().map_or(0, |a| a.length)
            + attachments.iter().map(|a| a.length).sum::<usize>()
            + notes.iter().map(|n| n.length).sum::<usize>()
            + webpage.as_ref().map_or(0, |w| w.length);

        Ok(ItemFulltext {
            item_key: item.key.clone(),
            title: item.display_title(),
            item_type: item.item_type.clone(),
            abstract_text,
            fulltext: FulltextBody {
                attachments,
                notes,
                webpage,
                total_length,
            },
            extracted_at: now_rfc3339(),
        })
    }

    fn candidates(&self, options: &FulltextOptions) -> Result<Vec<Item>> {
        let store = self.content.store();
        let library_id = store.user_library_id();
        match &options.item_keys {
            Some(keys) => {
                let mut items = Vec::new();
                for key in keys {
                    match store.item_by_key(library_id, key)? {
                        Some(item) => items.push(item),
                        None => debug!(key = %key, "Skipping unknown item key"),
                    }
                }
                Ok(items)
            }
            None => {
                let ids = store.search(&ItemQuery::new(Some(library_id)))?;
                Ok(store
                    .items_by_ids(&ids)?
                    .into_iter()
                    .filter(Item::is_regular)
                    .collect())
            }
        }
    }

    /// Search abstracts, attachment text and notes for `query`
    ///
    /// At most `max_results` items are returned, in library order.
    pub fn search(&self, query: &str, options: &FulltextOptions) -> Result<FulltextSearchResult> {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(BridgeError::validation("Missing query parameter 'q'"));
        }

        let mut results = Vec::new();
        let mut total_matches = 0;
        for item in self.candidates(options)? {
            if results.len() >= options.max_results {
                break;
            }
            let mut matches = Vec::new();
            if let Some(text) = abstract_of(&item) {
                collect_matches(&mut matches, "abstract", &item.key, &text, query, options);
            }
            let include = IncludeOptions::default();
            match self.content.attachments_of(&item, include) {
                Ok(attachments) => {
                    for attachment in attachments {
                        collect_matches(
                            &mut matches,
                            "attachment",
                            &attachment.attachment_key,
                            &attachment.content,
                            query,
                            options,
                        );
                    }
                }
                Err(e) => warn!(key = %item.key, error = %e, "Skipping attachments in fulltext search"),
            }
            for note in self.content.notes_of(&item)? {
                collect_matches(&mut matches, "note", &note.note_key, &note.content, query, options);
            }

            if !matches.is_empty() {
                total_matches += matches.len();
                results.push(FulltextHit {
                    item_key: item.key.clone(),
                    title: item.display_title(),
                    match_count: matches.len(),
                    matches,
                });
            }
        }

        Ok(FulltextSearchResult {
            query: query.to_string(),
            total_items: results.len(),
            total_matches,
            search_time: format!("{}ms", started.elapsed().as_millis()),
            results,
        })
    }
}

fn collect_matches(
    out: &mut Vec<FulltextMatch>,
    source: &'static str,
    source_key: &str,
    text: &str,
    query: &str,
    options: &FulltextOptions,
) {
    for position in find_matches(text, query, options.case_sensitive) {
        out.push(FulltextMatch {
            source,
            source_key: source_key.to_string(),
            position,
            context: snippet(text, position, text_length(query), options.context_length),
        });
    }
}

fn fold(c: char, case_sensitive: bool) -> char {
    if case_sensitive {
        c
    } else {
        c.to_lowercase().next().unwrap_or(c)
    }
}

/// Character offsets of non-overlapping occurrences of `needle`
pub(crate) fn find_matches(haystack: &str, needle: &str, case_sensitive: bool) -> Vec<usize> {
    let hay: Vec<char> = haystack.chars().map(|c| fold(c, case_sensitive)).collect();
    let pat: Vec<char> = needle.chars().map(|c| fold(c, case_sensitive)).collect();
    let mut positions = Vec::new();
    if pat.is_empty() || pat.len() > hay.len() {
        return positions;
    }
    let mut i = 0;
    while i + pat.len() <= hay.len() {
        if hay[i..i + pat.len()] == pat[..] {
            positions.push(i);
            i += pat.len();
        } else {
            i += 1;
        }
    }
    positions
}

/// Up to `context` characters around a match, split evenly on both sides,
/// with "..." marking cut ends
pub(crate) fn snippet(text: &str, position: usize, match_len: usize, context: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let half = context / 2;
    let start = position.saturating_sub(half);
    let end = (position + match_len + half).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(chars[start..end].iter());
    if end < chars.len() {
        out.push_str("...");
    }
    out
}
