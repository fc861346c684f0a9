//! Unified item content: abstract, attachments, notes and webpage snapshots

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::storage::LibraryStore;
use crate::types::{Item, Pagination};

use super::extractor::{is_html, is_pdf, AttachmentKind, ContentExtractor, ExtractionMethod};
use super::{note_title, now_rfc3339, strip_html, text_length};

pub const DEFAULT_NOTES_LIMIT: usize = 20;
pub const MAX_NOTES_LIMIT: usize = 100;

/// Which content sources to gather for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeOptions {
    pub pdf: bool,
    pub attachments: bool,
    pub notes: bool,
    #[serde(rename = "abstract")]
    pub abstract_text: bool,
    pub webpage: bool,
}

impl Default for IncludeOptions {
    fn default() -> Self {
        Self {
            pdf: true,
            attachments: true,
            notes: true,
            abstract_text: true,
            webpage: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbstractBlock {
    pub content: String,
    pub length: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentContent {
    pub attachment_key: String,
    pub filename: String,
    pub file_path: String,
    pub content_type: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub content: String,
    pub length: usize,
    pub extraction_method: ExtractionMethod,
    pub extracted_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContent {
    pub note_key: String,
    pub title: String,
    pub content: String,
    pub html_content: String,
    pub length: usize,
    pub date_modified: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebpageContent {
    pub url: String,
    pub filename: String,
    pub file_path: String,
    pub content: String,
    pub length: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub extracted_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentSections {
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_block: Option<AbstractBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NoteContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpage: Option<WebpageContent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub extracted_at: String,
    pub sources: Vec<String>,
    pub total_length: usize,
}

/// Everything readable about one item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContent {
    pub item_key: String,
    pub title: String,
    pub content: ContentSections,
    pub metadata: ContentMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractResult {
    pub item_key: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub length: usize,
    pub extracted_at: String,
}

/// Paginated child notes of an item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesPage {
    pub pagination: Pagination,
    pub total_count: usize,
    pub version: &'static str,
    pub endpoint: &'static str,
    pub item_key: String,
    pub notes: Vec<NoteContent>,
}

/// Content lookups keyed by item or attachment
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn LibraryStore>,
    extractor: Arc<dyn ContentExtractor>,
}

impl ContentService {
    pub fn new(store: Arc<dyn LibraryStore>, extractor: Arc<dyn ContentExtractor>) -> Self {
        Self { store, extractor }
    }

    pub(crate) fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    /// Resolve an item in the user library or fail with NotFound
    pub fn require_item(&self, key: &str) -> Result<Item> {
        let library_id = self.store.user_library_id();
        self.store
            .item_by_key(library_id, key)?
            .ok_or_else(|| BridgeError::not_found(format!("Item with key {} not found", key)))
    }

    pub fn item_content(&self, key: &str, include: IncludeOptions) -> Result<ItemContent> {
        let item = self.require_item(key)?;
        debug!(key, "Gathering item content");

        let mut sections = ContentSections::default();
        let mut sources = Vec::new();
        let mut total_length = 0;

        if include.abstract_text {
            if let Some(text) = abstract_of(&item) {
                let length = text_length(&text);
                sections.abstract_block = Some(AbstractBlock {
                    content: text,
                    length,
                    kind: "abstract",
                });
                sources.push("abstract".to_string());
                total_length += length;
            }
        }

        if include.pdf || include.attachments {
            sections.attachments = self.attachments_of(&item, include)?;
            if !sections.attachments.is_empty() {
                sources.push("attachments".to_string());
                total_length += sections.attachments.iter().map(|a| a.length).sum::<usize>();
            }
        }

        if include.notes {
            sections.notes = self.notes_of(&item)?;
            if !sections.notes.is_empty() {
                sources.push("notes".to_string());
                total_length += sections.notes.iter().map(|n| n.length).sum::<usize>();
            }
        }

        if include.webpage {
            sections.webpage = self.webpage_of(&item)?;
            if let Some(webpage) = &sections.webpage {
                sources.push("webpage".to_string());
                total_length += webpage.length;
            }
        }

        debug!(key, total_length, sources = sources.len(), "Item content gathered");
        Ok(ItemContent {
            item_key: item.key.clone(),
            title: item.display_title(),
            content: sections,
            metadata: ContentMetadata {
                extracted_at: now_rfc3339(),
                sources,
                total_length,
            },
        })
    }

    /// Text of one attachment; NotFound when the key is not an attachment
    /// or nothing could be extracted
    pub fn attachment_content(&self, key: &str) -> Result<AttachmentContent> {
        let library_id = self.store.user_library_id();
        let attachment = self
            .store
            .item_by_key(library_id, key)?
            .filter(Item::is_attachment)
            .ok_or_else(|| {
                BridgeError::not_found(format!("Attachment with key {} not found", key))
            })?;
        self.process_attachment(&attachment)?.ok_or_else(|| {
            BridgeError::not_found("No extractable content found in attachment")
        })
    }

    pub fn abstract_of(&self, key: &str) -> Result<AbstractResult> {
        let item = self.require_item(key)?;
        let text = abstract_of(&item)
            .ok_or_else(|| BridgeError::not_found("No abstract found for this item"))?;
        Ok(AbstractResult {
            item_key: item.key.clone(),
            title: item.display_title(),
            length: text_length(&text),
            abstract_text: text,
            extracted_at: now_rfc3339(),
        })
    }

    /// Text of the item's PDF attachments, joined with blank lines
    pub fn pdf_content(&self, key: &str) -> Result<String> {
        let item = self.require_item(key)?;
        let include = IncludeOptions {
            pdf: true,
            attachments: false,
            ..Default::default()
        };
        let texts: Vec<String> = self
            .attachments_of(&item, include)?
            .into_iter()
            .map(|a| a.content)
            .collect();
        if texts.is_empty() {
            return Err(BridgeError::not_found("No PDF content found for this item"));
        }
        Ok(texts.join("\n\n"))
    }

    pub fn notes(&self, key: &str, limit: usize, offset: usize) -> Result<NotesPage> {
        let item = self.require_item(key)?;
        let limit = limit.min(MAX_NOTES_LIMIT);
        let notes = self.notes_of(&item)?;
        let total = notes.len();
        Ok(NotesPage {
            pagination: Pagination::new(limit, offset, total),
            total_count: total,
            version: "2.0",
            endpoint: "items/notes",
            item_key: item.key,
            notes: notes.into_iter().skip(offset).take(limit).collect(),
        })
    }

    /// Extract one attachment, `None` when it yields no text
    pub(crate) fn process_attachment(&self, attachment: &Item) -> Result<Option<AttachmentContent>> {
        let Some(info) = &attachment.attachment else {
            return Ok(None);
        };
        let Some(extracted) = self.extractor.extract(attachment)? else {
            return Ok(None);
        };
        Ok(Some(AttachmentContent {
            attachment_key: attachment.key.clone(),
            filename: info.filename.clone(),
            file_path: info.path.clone().unwrap_or_default(),
            content_type: info.content_type.clone(),
            kind: AttachmentKind::categorize(&info.content_type),
            length: text_length(&extracted.text),
            content: extracted.text,
            extraction_method: extracted.method,
            extracted_at: now_rfc3339(),
        }))
    }

    /// Attachment texts of an item; a failing attachment is logged and skipped
    pub(crate) fn attachments_of(&self, item: &Item, include: IncludeOptions) -> Result<Vec<AttachmentContent>> {
        let mut out = Vec::new();
        for child in self.store.child_items(item.id)? {
            let Some(info) = child.attachment.as_ref().filter(|_| child.is_attachment()) else {
                continue;
            };
            let pdf = is_pdf(info);
            if (pdf && !include.pdf) || (!pdf && !include.attachments) {
                continue;
            }
            match self.process_attachment(&child) {
                Ok(Some(content)) => out.push(content),
                Ok(None) => {}
                Err(e) => warn!(key = %child.key, error = %e, "Skipping attachment"),
            }
        }
        Ok(out)
    }

    pub(crate) fn notes_of(&self, item: &Item) -> Result<Vec<NoteContent>> {
        Ok(self
            .store
            .child_items(item.id)?
            .iter()
            .filter_map(note_content)
            .collect())
    }

    pub(crate) fn webpage_of(&self, item: &Item) -> Result<Option<WebpageContent>> {
        let url = item.field("url");
        if url.is_empty() {
            return Ok(None);
        }
        for child in self.store.child_items(item.id)? {
            let Some(info) = child.attachment.as_ref() else {
                continue;
            };
            if !is_html(info) {
                continue;
            }
            match self.extractor.extract(&child) {
                Ok(Some(extracted)) => {
                    return Ok(Some(WebpageContent {
                        url: url.to_string(),
                        filename: info.filename.clone(),
                        file_path: info.path.clone().unwrap_or_default(),
                        length: text_length(&extracted.text),
                        content: extracted.text,
                        kind: "webpage_snapshot",
                        extracted_at: now_rfc3339(),
                    }))
                }
                Ok(None) => {}
                Err(e) => warn!(key = %child.key, error = %e, "Skipping webpage snapshot"),
            }
        }
        Ok(None)
    }
}

/// Trimmed abstract, `None` when empty
pub(crate) fn abstract_of(item: &Item) -> Option<String> {
    let text = item.field("abstractNote").trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub(crate) fn note_content(note: &Item) -> Option<NoteContent> {
    if !note.is_note() {
        return None;
    }
    let html = note.note.as_deref().unwrap_or("");
    if html.trim().is_empty() {
        return None;
    }
    let plain = strip_html(html);
    let title = note_title(html);
    Some(NoteContent {
        note_key: note.key.clone(),
        title: if title.is_empty() {
            "Untitled Note".to_string()
        } else {
            title
        },
        length: text_length(&plain),
        content: plain,
        html_content: html.to_string(),
        date_modified: note.date_modified.to_rfc3339(),
        kind: "note",
    })
}

/// Render gathered content as plain text blocks
pub fn convert_to_text(content: &ItemContent) -> String {
    let mut parts = Vec::new();
    if let Some(block) = &content.content.abstract_block {
        parts.push(format!("ABSTRACT:\n{}\n", block.content));
    }
    for attachment in &content.content.attachments {
        let label = if attachment.filename.is_empty() {
            attachment.kind.as_str().to_string()
        } else {
            attachment.filename.clone()
        };
        parts.push(format!("ATTACHMENT ({}):\n{}\n", label, attachment.content));
    }
    for note in &content.content.notes {
        parts.push(format!("NOTE ({}):\n{}\n", note.title, note.content));
    }
    if let Some(webpage) = &content.content.webpage {
        parts.push(format!("WEBPAGE:\n{}\n", webpage.content));
    }
    parts.join("\n---\n\n")
}

impl ItemContent {
    pub fn to_text(&self) -> String {
        convert_to_text(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FileExtractor;
    use crate::storage::MemoryLibrary;

    const LIBRARY: &str = r#"{
        "libraryId": 1,
        "items": [
            {"id": 1, "key": "PAPER001", "itemType": "journalArticle",
             "fields": {"title": "Attention Is All You Need", "abstractNote": "  We propose the Transformer.  ",
                        "url": "https://arxiv.org/abs/1706.03762"},
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-01T00:00:00Z"},
            {"id": 2, "key": "PDF00001", "itemType": "attachment", "parentId": 1,
             "attachment": {"contentType": "application/pdf", "filename": "transformer.pdf",
                            "path": "/papers/transformer.pdf", "text": "Self-attention layers."},
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-01T00:00:00Z"},
            {"id": 3, "key": "SNAP0001", "itemType": "attachment", "parentId": 1,
             "attachment": {"contentType": "text/html", "filename": "arxiv.html", "text": "arXiv landing page"},
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-01T00:00:00Z"},
            {"id": 4, "key": "NOTE0001", "itemType": "note", "parentId": 1,
             "note": "<h1>Key idea</h1><p>No recurrence.</p>",
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-05T00:00:00Z"},
            {"id": 5, "key": "NOTE0002", "itemType": "note", "parentId": 1, "note": "  ",
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-05T00:00:00Z"},
            {"id": 6, "key": "BOOK0001", "itemType": "book", "fields": {"title": "No Abstract"},
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-01T00:00:00Z"}
        ]
    }"#;

    fn service() -> ContentService {
        ContentService::new(
            Arc::new(MemoryLibrary::from_json(LIBRARY).unwrap()),
            Arc::new(FileExtractor::new()),
        )
    }

    #[test]
    fn test_item_content_defaults() {
        let content = service().item_content("PAPER001", IncludeOptions::default()).unwrap();
        assert_eq!(content.title, "Attention Is All You Need");
        assert_eq!(content.metadata.sources, vec!["abstract", "attachments", "notes"]);
        assert_eq!(content.content.attachments.len(), 2);
        assert_eq!(content.content.notes.len(), 1);
        assert_eq!(content.content.notes[0].title, "Key idea");
        assert!(content.content.webpage.is_none());
        let expected = "We propose the Transformer.".len()
            + "Self-attention layers.".len()
            + "arXiv landing page".len()
            + content.content.notes[0].length;
        assert_eq!(content.metadata.total_length, expected);
    }

    #[test]
    fn test_include_flags() {
        let include = IncludeOptions {
            attachments: false,
            notes: false,
            abstract_text: false,
            webpage: true,
            ..Default::default()
        };
        let content = service().item_content("PAPER001", include).unwrap();
        assert_eq!(content.content.attachments.len(), 1);
        assert_eq!(content.content.attachments[0].attachment_key, "PDF00001");
        assert_eq!(content.content.webpage.as_ref().unwrap().content, "arXiv landing page");
        assert_eq!(content.metadata.sources, vec!["attachments", "webpage"]);
    }

    #[test]
    fn test_convert_to_text() {
        let include = IncludeOptions {
            attachments: false,
            ..Default::default()
        };
        let text = service().item_content("PAPER001", include).unwrap().to_text();
        assert!(text.starts_with("ABSTRACT:\nWe propose the Transformer.\n"));
        assert!(text.contains("\n---\n\nATTACHMENT (transformer.pdf):\nSelf-attention layers.\n"));
        assert!(text.contains("NOTE (Key idea):\n"));
    }

    #[test]
    fn test_attachment_content() {
        let svc = service();
        let content = svc.attachment_content("PDF00001").unwrap();
        assert_eq!(content.kind, AttachmentKind::Pdf);
        assert_eq!(content.extraction_method, ExtractionMethod::Cache);

        let err = svc.attachment_content("PAPER001").unwrap_err();
        assert_eq!(err.to_string(), "Attachment with key PAPER001 not found");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_abstract() {
        let svc = service();
        let result = svc.abstract_of("PAPER001").unwrap();
        assert_eq!(result.abstract_text, "We propose the Transformer.");
        let err = svc.abstract_of("BOOK0001").unwrap_err();
        assert_eq!(err.to_string(), "No abstract found for this item");
        assert!(matches!(svc.abstract_of("MISSING1"), Err(BridgeError::NotFound(_))));
    }

    #[test]
    fn test_pdf_content() {
        let svc = service();
        assert_eq!(svc.pdf_content("PAPER001").unwrap(), "Self-attention layers.");
        let err = svc.pdf_content("BOOK0001").unwrap_err();
        assert_eq!(err.to_string(), "No PDF content found for this item");
    }

    #[test]
    fn test_notes_page() {
        let page = service().notes("PAPER001", 500, 0).unwrap();
        assert_eq!(page.pagination.limit, MAX_NOTES_LIMIT);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.endpoint, "items/notes");
        assert_eq!(page.notes[0].content, "Key ideaNo recurrence.");
    }
}
