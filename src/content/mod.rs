//! Content services: text extraction, notes, annotations, fulltext and
//! item/collection formatting
//!
//! Everything here reads through [`crate::storage::LibraryStore`] and turns
//! attachments into text through a [`ContentExtractor`].

mod annotations;
mod collections;
mod extractor;
mod formatter;
mod fulltext;
mod unified;

pub use annotations::{
    AnnotationLookup, AnnotationPage, AnnotationSearch, AnnotationService, AnnotationView, BatchAnnotations,
    OutputMode,
};
pub use collections::{
    CollectionListOptions, CollectionService, CollectionSort, Listing, DEFAULT_COLLECTION_LIMIT,
};
pub use extractor::{AttachmentKind, ContentExtractor, ExtractedText, ExtractionMethod, FileExtractor};
pub use formatter::{format_item, format_items, DEFAULT_ITEM_FIELDS};
pub use fulltext::{
    FulltextOptions, FulltextSearchResult, FulltextSections, FulltextService, ItemFulltext,
};
pub use unified::{
    convert_to_text, AbstractResult, AttachmentContent, ContentService, IncludeOptions,
    ItemContent, NoteContent, NotesPage, DEFAULT_NOTES_LIMIT,
};

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static BLOCK_END_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|blockquote|pre)>").unwrap());

static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Remove tags from note HTML, keeping line structure
pub fn strip_html(html: &str) -> String {
    let text = TAG_PATTERN.replace_all(html, "");
    decode_entities(&text).trim().to_string()
}

/// Flatten an HTML document to a single line of text
pub fn html_to_text(html: &str) -> String {
    let text = TAG_PATTERN.replace_all(html, " ");
    let text = decode_entities(&text);
    WHITESPACE_PATTERN.replace_all(&text, " ").trim().to_string()
}

/// First non-empty line of a note
pub fn note_title(html: &str) -> String {
    let with_breaks = BLOCK_END_PATTERN.replace_all(html, "\n");
    let text = decode_entities(&TAG_PATTERN.replace_all(&with_breaks, ""));
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Length as reported to clients, in characters
pub(crate) fn text_length(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
