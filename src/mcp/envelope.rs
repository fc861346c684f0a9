//! Uniform `{data, metadata}` wrapping of tool results

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::tools::ToolName;

/// Coarse response type derived from the tool name
pub fn response_type(tool: ToolName) -> &'static str {
    let name = tool.as_str();
    if name.contains("search") {
        "search"
    } else if name.contains("annotation") {
        "annotation"
    } else if name.contains("content") {
        "content"
    } else if name.contains("collection") {
        "collection"
    } else {
        "content"
    }
}

fn guidance(data_structure: Value, interpretation: Value, usage: &[&str]) -> Value {
    json!({
        "dataStructure": data_structure,
        "interpretation": interpretation,
        "usage": usage,
    })
}

/// How a client should read the result of `tool`
pub fn tool_guidance(tool: ToolName) -> Value {
    use ToolName::*;
    match tool {
        SearchLibrary => guidance(
            json!({
                "type": "search_results",
                "format": "Array of Zotero items with metadata",
                "pagination": "Check pagination.hasMore and use offset/limit parameters"
            }),
            json!({
                "purpose": "Library search results from user's personal Zotero collection",
                "content": "Each item represents a bibliographic entry with full metadata",
                "reliability": "Direct from user library - treat as authoritative source material"
            }),
            &[
                "These are research items from the user's personal library",
                "You can analyze and discuss these items to help with research",
                "Use the provided metadata for citations when needed",
                "Use itemKey to get full content with get_content tool",
            ],
        ),
        SearchAnnotations | GetAnnotations => guidance(
            json!({
                "type": "annotation_results",
                "format": "Smart-processed annotations with relevance scoring",
                "compression": "Content may be intelligently truncated based on importance"
            }),
            json!({
                "purpose": "User's personal highlights, notes, and comments from research materials",
                "content": "Direct quotes and personal insights from user's reading",
                "reliability": "User-generated content - preserve exact wording and context"
            }),
            &[
                "These are the user's personal research notes and highlights",
                "You can summarize and analyze these annotations to help with research",
                "User highlighting indicates what they found important or interesting",
                "Combine with other sources to provide comprehensive research assistance",
            ],
        ),
        GetContent => guidance(
            json!({
                "type": "document_content",
                "format": "Full-text content from PDFs, attachments, notes, abstracts",
                "sources": "Multiple content types combined (pdf, notes, abstract, webpage)"
            }),
            json!({
                "purpose": "Complete textual content of research documents",
                "content": "Raw extracted text from user's document collection",
                "reliability": "Direct extraction - may contain OCR errors or formatting artifacts"
            }),
            &[
                "Use for detailed content analysis and full-text research",
                "Content includes user's attached PDFs and personal notes",
                "May require cleaning for OCR artifacts in PDF extractions",
                "Combine with annotations for user's personal insights on this content",
                "When the user asks for the full text, provide the entire extracted text without summarization",
            ],
        ),
        GetCollections | SearchCollections | GetCollectionDetails | GetCollectionItems => guidance(
            json!({
                "type": "collection_data",
                "format": "Hierarchical collection structure with items and subcollections",
                "organization": "Reflects user's personal research organization system"
            }),
            json!({
                "purpose": "User's personal organization system for research materials",
                "content": "Custom-named folders reflecting research topics and projects",
                "reliability": "User-curated organization - reflects research priorities"
            }),
            &[
                "Collection names indicate user's research areas and interests",
                "Use collection structure to understand research project organization",
                "Respect user's categorization decisions in your responses",
                "Collections show thematic relationships between documents",
            ],
        ),
        SearchFulltext => guidance(
            json!({
                "type": "fulltext_search",
                "format": "Full-text search results with content snippets",
                "relevance": "Results ranked by text matching"
            }),
            json!({
                "purpose": "Deep content search across all document texts",
                "content": "Matching text passages from user's entire document collection",
                "reliability": "Search-based - results depend on query accuracy"
            }),
            &[
                "Use for finding specific concepts across entire research collection",
                "Results show where user has relevant materials on specific topics",
                "Good for discovering connections between different documents",
                "Use get_content with the itemKey to retrieve complete text",
            ],
        ),
        GetItemDetails => guidance(
            json!({
                "type": "item_metadata",
                "format": "Complete bibliographic metadata for single item",
                "completeness": "Full citation information and item relationships"
            }),
            json!({
                "purpose": "Detailed metadata for specific research item",
                "content": "Publication details, authors, dates, identifiers, relationships",
                "reliability": "Curated metadata - suitable for citations and references"
            }),
            &[
                "Use for generating proper citations and references",
                "Contains all bibliographic data needed for academic writing",
                "Use itemKey to access full content via get_content",
            ],
        ),
        GetItemAbstract => guidance(
            json!({
                "type": "abstract_content",
                "format": "Academic abstract or summary text",
                "source": "Publisher-provided or user-entered abstract"
            }),
            json!({
                "purpose": "Summary of research paper or document main points",
                "content": "Concise overview of research objectives, methods, results",
                "reliability": "Authoritative summary - typically from original publication"
            }),
            &[
                "Use for quick understanding of paper's main contributions",
                "Suitable for literature reviews and research summaries",
                "Combine with full content and annotations for complete understanding",
            ],
        ),
    }
}

/// Library-wide reading rules attached to every envelope
pub fn ai_guidelines() -> Value {
    json!({
        "dataIntegrity": "Content comes from the user's own library; quote it verbatim and do not invent details",
        "citation": "Cite items by title and creators using the metadata provided",
        "privacy": "Notes and annotations are personal research material",
    })
}

fn base_metadata(tool: ToolName, response_type: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("extractedAt".into(), json!(Utc::now().to_rfc3339()));
    meta.insert("toolName".into(), json!(tool.as_str()));
    meta.insert("responseType".into(), json!(response_type));
    meta.insert("toolGuidance".into(), tool_guidance(tool));
    meta
}

fn wrap(data: Value, tool: ToolName, response_type: &str, extra: Option<(&str, Value)>) -> Value {
    let mut meta = base_metadata(tool, response_type);
    if let Some((key, value)) = extra {
        meta.insert(key.into(), value);
    }
    meta.insert("aiGuidelines".into(), ai_guidelines());
    json!({ "data": data, "metadata": meta })
}

/// Wrap a tool's raw result
///
/// Objects that already carry `metadata` next to `data` or `content` keep
/// their payload; only their metadata is enriched.
pub fn apply(result: Value, tool: ToolName) -> Value {
    match result {
        Value::Null => wrap(Value::Null, tool, "object", None),
        Value::String(_) => wrap(result, tool, "text", None),
        Value::Array(ref items) => {
            let count = items.len();
            wrap(result, tool, "array", Some(("count", json!(count))))
        }
        Value::Object(mut object)
            if object.get("metadata").is_some_and(Value::is_object)
                && (object.contains_key("data") || object.contains_key("content")) =>
        {
            let mut meta = match object.remove("metadata") {
                Some(Value::Object(meta)) => meta,
                _ => Map::new(),
            };
            meta.extend(base_metadata(tool, response_type(tool)));
            meta.insert("aiGuidelines".into(), ai_guidelines());
            object.insert("metadata".into(), Value::Object(meta));
            Value::Object(object)
        }
        Value::Object(_) => wrap(result, tool, "object", None),
        other => wrap(other, tool, "object", None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_response_types() {
        assert_eq!(response_type(ToolName::SearchCollections), "search");
        assert_eq!(response_type(ToolName::GetAnnotations), "annotation");
        assert_eq!(response_type(ToolName::GetContent), "content");
        assert_eq!(response_type(ToolName::GetCollectionItems), "collection");
        assert_eq!(response_type(ToolName::GetItemDetails), "content");
    }

    #[test]
    fn test_wraps_plain_values() {
        let wrapped = apply(json!({"key": "ABC"}), ToolName::GetItemDetails);
        assert_eq!(wrapped["data"], json!({"key": "ABC"}));
        assert_eq!(wrapped["metadata"]["responseType"], "object");
        assert_eq!(wrapped["metadata"]["toolName"], "get_item_details");
        assert!(wrapped["metadata"]["toolGuidance"]["usage"].is_array());

        let wrapped = apply(json!([1, 2, 3]), ToolName::GetCollections);
        assert_eq!(wrapped["metadata"]["responseType"], "array");
        assert_eq!(wrapped["metadata"]["count"], 3);

        let wrapped = apply(json!("abstract text"), ToolName::GetItemAbstract);
        assert_eq!(wrapped["metadata"]["responseType"], "text");

        let wrapped = apply(Value::Null, ToolName::GetContent);
        assert_eq!(wrapped["data"], Value::Null);
    }

    #[test]
    fn test_enriches_existing_structure() {
        let raw = json!({"data": [], "metadata": {"totalCount": 0, "outputMode": "smart"}});
        let wrapped = apply(raw, ToolName::SearchAnnotations);
        assert_eq!(wrapped["data"], json!([]));
        assert!(wrapped.get("metadata").and_then(|m| m.get("data")).is_none());
        assert_eq!(wrapped["metadata"]["totalCount"], 0);
        assert_eq!(wrapped["metadata"]["outputMode"], "smart");
        assert_eq!(wrapped["metadata"]["responseType"], "search");
        assert!(wrapped["metadata"]["aiGuidelines"].is_object());
    }
}
