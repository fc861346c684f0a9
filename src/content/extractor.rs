//! Attachment text extraction

use serde::Serialize;
use std::path::Path;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::types::{AttachmentInfo, Item};

use super::html_to_text;

/// How the text of an attachment was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Pre-extracted text stored with the library
    Cache,
    PdfProcessor,
    HtmlParsing,
    TextReading,
}

/// Coarse attachment category derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Pdf,
    Html,
    Text,
    Document,
    Other,
    Unknown,
}

impl AttachmentKind {
    pub fn categorize(content_type: &str) -> Self {
        if content_type.is_empty() {
            AttachmentKind::Unknown
        } else if content_type.contains("pdf") {
            AttachmentKind::Pdf
        } else if content_type.contains("html") {
            AttachmentKind::Html
        } else if content_type.contains("text") {
            AttachmentKind::Text
        } else if content_type.contains("word") || content_type.contains("document") {
            AttachmentKind::Document
        } else {
            AttachmentKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Html => "html",
            AttachmentKind::Text => "text",
            AttachmentKind::Document => "document",
            AttachmentKind::Other => "other",
            AttachmentKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
}

/// Turns an attachment item into text
///
/// `Ok(None)` means the attachment has nothing extractable (no file, an
/// unsupported type, or empty text). I/O and decoder failures are errors.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, attachment: &Item) -> Result<Option<ExtractedText>>;
}

pub(crate) fn is_pdf(info: &AttachmentInfo) -> bool {
    info.content_type.contains("pdf")
        || info.filename.to_lowercase().ends_with(".pdf")
        || info
            .path
            .as_deref()
            .is_some_and(|p| p.to_lowercase().ends_with(".pdf"))
}

pub(crate) fn is_html(info: &AttachmentInfo) -> bool {
    info.content_type.contains("html") || info.content_type.contains("xml")
}

fn is_text(info: &AttachmentInfo) -> bool {
    info.content_type.contains("text") && !info.content_type.contains("html")
}

/// Whether an attachment probably has text we can pull out
pub(crate) fn has_extractable_text(info: &AttachmentInfo) -> bool {
    if info.text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        return true;
    }
    let path = info.path.as_deref().unwrap_or("").to_lowercase();
    is_pdf(info)
        || info.content_type.contains("text")
        || [".txt", ".md", ".html", ".htm", ".xml"]
            .iter()
            .any(|ext| path.ends_with(ext))
}

/// Reads attachment files from local disk
#[derive(Debug, Clone, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub fn new() -> Self {
        Self
    }

    fn read_file(path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| {
            BridgeError::Extraction(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    #[cfg(feature = "pdf")]
    fn extract_pdf(path: &Path) -> Result<Option<String>> {
        pdf_extract::extract_text(path)
            .map(Some)
            .map_err(|e| BridgeError::Extraction(format!("PDF extraction failed: {}", e)))
    }

    #[cfg(not(feature = "pdf"))]
    fn extract_pdf(path: &Path) -> Result<Option<String>> {
        tracing::warn!(
            path = %path.display(),
            "PDF attachment has no cached text and PDF support is not compiled in"
        );
        Ok(None)
    }
}

impl ContentExtractor for FileExtractor {
    fn extract(&self, attachment: &Item) -> Result<Option<ExtractedText>> {
        let Some(info) = &attachment.attachment else {
            return Ok(None);
        };

        if let Some(cached) = info.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Some(ExtractedText {
                text: cached.trim().to_string(),
                method: ExtractionMethod::Cache,
            }));
        }

        let Some(path) = info.path.as_deref().filter(|p| !p.is_empty()) else {
            debug!(key = %attachment.key, "Attachment has no file path");
            return Ok(None);
        };
        let path = Path::new(path);

        let (text, method) = if is_pdf(info) {
            match Self::extract_pdf(path)? {
                Some(text) => (text, ExtractionMethod::PdfProcessor),
                None => return Ok(None),
            }
        } else if is_html(info) {
            (html_to_text(&Self::read_file(path)?), ExtractionMethod::HtmlParsing)
        } else if is_text(info) {
            (Self::read_file(path)?, ExtractionMethod::TextReading)
        } else {
            return Ok(None);
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ExtractedText {
            text: text.to_string(),
            method,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;

    fn attachment(info: AttachmentInfo) -> Item {
        Item {
            id: 10,
            key: "ATTACH01".into(),
            library_id: 1,
            item_type: "attachment".into(),
            fields: Default::default(),
            creators: vec![],
            tags: vec![],
            collections: vec![],
            parent_id: Some(1),
            date_added: Utc::now(),
            date_modified: Utc::now(),
            attachment: Some(info),
            note: None,
        }
    }

    #[test]
    fn test_categorize() {
        assert_eq!(AttachmentKind::categorize("application/pdf"), AttachmentKind::Pdf);
        assert_eq!(AttachmentKind::categorize("text/html"), AttachmentKind::Html);
        assert_eq!(AttachmentKind::categorize("text/plain"), AttachmentKind::Text);
        assert_eq!(
            AttachmentKind::categorize("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            AttachmentKind::Document
        );
        assert_eq!(AttachmentKind::categorize("image/png"), AttachmentKind::Other);
        assert_eq!(AttachmentKind::categorize(""), AttachmentKind::Unknown);
    }

    #[test]
    fn test_cached_text_wins() {
        let item = attachment(AttachmentInfo {
            content_type: "application/pdf".into(),
            filename: "paper.pdf".into(),
            path: Some("/does/not/exist.pdf".into()),
            link_mode: 0,
            text: Some("  cached body  ".into()),
        });
        let extracted = FileExtractor::new().extract(&item).unwrap().unwrap();
        assert_eq!(extracted.text, "cached body");
        assert_eq!(extracted.method, ExtractionMethod::Cache);
    }

    #[test]
    fn test_html_and_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let html_path = dir.path().join("snapshot.html");
        std::fs::File::create(&html_path)
            .unwrap()
            .write_all(b"<html><p>Hello</p>\n<p>world</p></html>")
            .unwrap();
        let item = attachment(AttachmentInfo {
            content_type: "text/html".into(),
            filename: "snapshot.html".into(),
            path: Some(html_path.to_string_lossy().into_owned()),
            ..Default::default()
        });
        let extracted = FileExtractor::new().extract(&item).unwrap().unwrap();
        assert_eq!(extracted.text, "Hello world");
        assert_eq!(extracted.method, ExtractionMethod::HtmlParsing);

        let txt_path = dir.path().join("notes.txt");
        std::fs::write(&txt_path, "plain café\n").unwrap();
        let item = attachment(AttachmentInfo {
            content_type: "text/plain".into(),
            path: Some(txt_path.to_string_lossy().into_owned()),
            ..Default::default()
        });
        let extracted = FileExtractor::new().extract(&item).unwrap().unwrap();
        assert_eq!(extracted.text, "plain café");
    }

    #[test]
    fn test_missing_file_is_extraction_error() {
        let item = attachment(AttachmentInfo {
            content_type: "text/plain".into(),
            path: Some("/nonexistent/file.txt".into()),
            ..Default::default()
        });
        let err = FileExtractor::new().extract(&item).unwrap_err();
        assert!(matches!(err, BridgeError::Extraction(_)));
    }

    #[test]
    fn test_nothing_extractable() {
        let item = attachment(AttachmentInfo {
            content_type: "image/png".into(),
            path: Some("/tmp/figure.png".into()),
            ..Default::default()
        });
        assert!(FileExtractor::new().extract(&item).unwrap().is_none());

        let item = attachment(AttachmentInfo::default());
        assert!(FileExtractor::new().extract(&item).unwrap().is_none());
    }
}
