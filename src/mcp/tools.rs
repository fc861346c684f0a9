//! MCP tool registry for the Zotero bridge

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use super::protocol::ToolDefinition;
use crate::error::{BridgeError, Result};

/// Every tool the engine can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchLibrary,
    SearchAnnotations,
    GetItemDetails,
    GetAnnotations,
    GetContent,
    GetCollections,
    SearchCollections,
    GetCollectionDetails,
    GetCollectionItems,
    SearchFulltext,
    GetItemAbstract,
}

impl ToolName {
    pub const ALL: [ToolName; 11] = [
        ToolName::SearchLibrary,
        ToolName::SearchAnnotations,
        ToolName::GetItemDetails,
        ToolName::GetAnnotations,
        ToolName::GetContent,
        ToolName::GetCollections,
        ToolName::SearchCollections,
        ToolName::GetCollectionDetails,
        ToolName::GetCollectionItems,
        ToolName::SearchFulltext,
        ToolName::GetItemAbstract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchLibrary => "search_library",
            ToolName::SearchAnnotations => "search_annotations",
            ToolName::GetItemDetails => "get_item_details",
            ToolName::GetAnnotations => "get_annotations",
            ToolName::GetContent => "get_content",
            ToolName::GetCollections => "get_collections",
            ToolName::SearchCollections => "search_collections",
            ToolName::GetCollectionDetails => "get_collection_details",
            ToolName::GetCollectionItems => "get_collection_items",
            ToolName::SearchFulltext => "search_fulltext",
            ToolName::GetItemAbstract => "get_item_abstract",
        }
    }

    /// Registry entry for this tool
    pub fn definition(&self) -> Option<ToolDefinition> {
        get_tool_definitions()
            .into_iter()
            .find(|def| def.name == self.as_str())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// All tool definitions: name, description, JSON input schema
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "search_library",
        "Search the Zotero library by text, title, creator, year, item type, identifiers, collection and tags. All given filters must match. Results are sorted by date, title, creator or timestamps and paginated with limit and offset.",
        r#"{
            "type": "object",
            "properties": {
                "q": {"type": "string", "description": "General search query"},
                "key": {"type": "string", "description": "Exact item key"},
                "title": {"type": "string", "description": "Title search"},
                "titleOperator": {"type": "string", "enum": ["contains", "exact", "startsWith", "endsWith", "regex"], "description": "Title search operator"},
                "creator": {"type": "string", "description": "Creator name search"},
                "year": {"type": "string", "description": "Exact publication year"},
                "yearRange": {"type": "string", "description": "Year range (e.g., \"2020-2023\")"},
                "itemType": {"type": "string", "description": "Item type such as journalArticle or book"},
                "doi": {"type": "string", "description": "DOI substring"},
                "isbn": {"type": "string", "description": "ISBN substring"},
                "collection": {"type": "string", "description": "Restrict to a collection key"},
                "tags": {"type": "string", "description": "Comma-separated tags"},
                "tagMode": {"type": "string", "enum": ["any", "all", "none"], "description": "How query tags combine (default: any)"},
                "tagMatch": {"type": "string", "enum": ["exact", "contains", "startsWith"], "description": "Tag comparison (default: exact)"},
                "hasAttachment": {"type": "boolean", "description": "Only items with attachments"},
                "hasNote": {"type": "boolean", "description": "Only items with notes"},
                "includeAttachments": {"type": "boolean", "description": "Include attachment items in results"},
                "includeNotes": {"type": "boolean", "description": "Include note items in results"},
                "sort": {"type": "string", "enum": ["date", "title", "creator", "dateAdded", "dateModified"], "description": "Sort order"},
                "direction": {"type": "string", "enum": ["asc", "desc"], "description": "Sort direction"},
                "limit": {"type": "number", "description": "Maximum results to return"},
                "offset": {"type": "number", "description": "Pagination offset"}
            }
        }"#,
    ),
    (
        "search_annotations",
        "Search annotations and notes with intelligent ranking and content management",
        r#"{
            "type": "object",
            "properties": {
                "q": {"type": "string", "description": "Search query"},
                "itemKeys": {"type": "array", "items": {"type": "string"}, "description": "Limit search to specific items"},
                "types": {"type": "array", "items": {"type": "string", "enum": ["note", "highlight", "annotation", "ink", "text", "image"]}, "description": "Types of annotations to search"},
                "outputMode": {"type": "string", "enum": ["smart", "preview", "full", "minimal"], "description": "Content processing mode (default: smart)"},
                "maxTokens": {"type": "number", "description": "Token budget (default: 10000)"},
                "minRelevance": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.1, "description": "Minimum relevance threshold"},
                "limit": {"type": "number", "default": 15, "description": "Maximum results"},
                "offset": {"type": "number", "default": 0, "description": "Pagination offset"}
            },
            "required": ["q"]
        }"#,
    ),
    (
        "get_item_details",
        "Get detailed information for a specific item including metadata, abstract, attachments, notes, and tags but not fulltext content",
        r#"{
            "type": "object",
            "properties": {
                "itemKey": {"type": "string", "description": "Unique item key"}
            },
            "required": ["itemKey"]
        }"#,
    ),
    (
        "get_annotations",
        "Get annotations and notes with intelligent content management (PDF annotations, highlights, notes)",
        r#"{
            "type": "object",
            "properties": {
                "itemKey": {"type": "string", "description": "Get all annotations for this item"},
                "annotationId": {"type": "string", "description": "Get specific annotation by ID"},
                "annotationIds": {"type": "array", "items": {"type": "string"}, "description": "Get multiple annotations by IDs"},
                "types": {"type": "array", "items": {"type": "string", "enum": ["note", "highlight", "annotation", "ink", "text", "image"]}, "default": ["note", "highlight", "annotation"], "description": "Types of annotations to include"},
                "outputMode": {"type": "string", "enum": ["smart", "preview", "full", "minimal"], "description": "Content processing mode (default: smart)"},
                "maxTokens": {"type": "number", "description": "Token budget (default: 10000)"},
                "limit": {"type": "number", "default": 20, "description": "Maximum results"},
                "offset": {"type": "number", "default": 0, "description": "Pagination offset"}
            },
            "anyOf": [
                {"required": ["itemKey"]},
                {"required": ["annotationId"]},
                {"required": ["annotationIds"]}
            ]
        }"#,
    ),
    (
        "get_content",
        "Unified content extraction tool: get PDF, attachments, notes, abstract etc. from items or specific attachments",
        r#"{
            "type": "object",
            "properties": {
                "itemKey": {"type": "string", "description": "Item key to get all content from this item"},
                "attachmentKey": {"type": "string", "description": "Attachment key to get content from specific attachment"},
                "include": {
                    "type": "object",
                    "properties": {
                        "pdf": {"type": "boolean", "default": true, "description": "Include PDF attachments content"},
                        "attachments": {"type": "boolean", "default": true, "description": "Include other attachments content"},
                        "notes": {"type": "boolean", "default": true, "description": "Include notes content"},
                        "abstract": {"type": "boolean", "default": true, "description": "Include abstract"},
                        "webpage": {"type": "boolean", "default": false, "description": "Include webpage snapshots"}
                    },
                    "description": "Content types to include (only applies to itemKey)"
                },
                "format": {"type": "string", "enum": ["json", "text"], "default": "json", "description": "Output format: json (structured) or text (plain text)"}
            },
            "anyOf": [
                {"required": ["itemKey"]},
                {"required": ["attachmentKey"]}
            ]
        }"#,
    ),
    (
        "get_collections",
        "Get list of all collections in the library",
        r#"{
            "type": "object",
            "properties": {
                "limit": {"type": "number", "description": "Maximum results to return"},
                "offset": {"type": "number", "description": "Pagination offset"}
            }
        }"#,
    ),
    (
        "search_collections",
        "Search collections by name",
        r#"{
            "type": "object",
            "properties": {
                "q": {"type": "string", "description": "Collection name search query"},
                "limit": {"type": "number", "description": "Maximum results to return"}
            }
        }"#,
    ),
    (
        "get_collection_details",
        "Get detailed information about a specific collection",
        r#"{
            "type": "object",
            "properties": {
                "collectionKey": {"type": "string", "description": "Collection key"}
            },
            "required": ["collectionKey"]
        }"#,
    ),
    (
        "get_collection_items",
        "Get items in a specific collection",
        r#"{
            "type": "object",
            "properties": {
                "collectionKey": {"type": "string", "description": "Collection key"},
                "limit": {"type": "number", "description": "Maximum results to return"},
                "offset": {"type": "number", "description": "Pagination offset"}
            },
            "required": ["collectionKey"]
        }"#,
    ),
    (
        "search_fulltext",
        "Search within fulltext content of items and return context snippets around each match",
        r#"{
            "type": "object",
            "properties": {
                "q": {"type": "string", "description": "Search query"},
                "itemKeys": {"type": "array", "items": {"type": "string"}, "description": "Limit search to specific items (optional)"},
                "contextLength": {"type": "number", "description": "Context length around matches (default: 200)"},
                "maxResults": {"type": "number", "description": "Maximum results to return (default: 50)"},
                "caseSensitive": {"type": "boolean", "description": "Case sensitive search (default: false)"}
            },
            "required": ["q"]
        }"#,
    ),
    (
        "get_item_abstract",
        "Get the abstract/summary of a specific item",
        r#"{
            "type": "object",
            "properties": {
                "itemKey": {"type": "string", "description": "Item key"},
                "format": {"type": "string", "enum": ["json", "text"], "description": "Response format (default: json)"}
            },
            "required": ["itemKey"]
        }"#,
    ),
];

/// Get all tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

/// Missing, null, empty-string and `false` arguments count as absent
fn is_present(args: &Value, name: &str) -> bool {
    match args.get(name) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn required_names(value: &Value) -> Vec<&str> {
    value
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn describe(name: &str) -> String {
    match name {
        "q" => "q (query)".to_string(),
        other => other.to_string(),
    }
}

/// "a", "a or b", "a, b, or c"
fn alternatives(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} or {}", first, second),
        [rest @ .., last] => format!("{}, or {}", rest.join(", "), last),
    }
}

/// Check `args` against the schema's `required` list and `anyOf` sets
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<()> {
    if let Some(missing) = required_names(schema)
        .into_iter()
        .find(|name| !is_present(args, name))
    {
        return Err(BridgeError::validation(format!("{} is required", describe(missing))));
    }

    if let Some(sets) = schema.get("anyOf").and_then(Value::as_array) {
        let satisfied = sets.iter().any(|set| {
            required_names(set)
                .into_iter()
                .all(|name| is_present(args, name))
        });
        if !satisfied {
            let options: Vec<String> = sets
                .iter()
                .map(|set| required_names(set).join(" and "))
                .collect();
            return Err(BridgeError::validation(format!(
                "Either {} is required",
                alternatives(&options)
            )));
        }
    }
    Ok(())
}
