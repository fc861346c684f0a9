//! JSON-RPC dispatcher binding MCP tools to the library services

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::envelope;
use super::protocol::{
    error_codes, methods, InitializeResult, McpHandler, McpRequest, McpResponse, ServerInfo,
    ToolCallResult, PROTOCOL_VERSION,
};
use super::tools::{get_tool_definitions, validate_arguments, ToolName};
use crate::content::{
    convert_to_text, format_item, AnnotationLookup, AnnotationSearch, CollectionListOptions,
    FulltextOptions, IncludeOptions, DEFAULT_COLLECTION_LIMIT,
};
use crate::error::{BridgeError, Result};
use crate::services::Services;
use crate::types::QueryParams;

/// JSON-RPC methods the engine answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Initialize,
    Initialized,
    ListTools,
    CallTool,
    Ping,
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            methods::INITIALIZE => Ok(Method::Initialize),
            methods::INITIALIZED | methods::NOTIFICATIONS_INITIALIZED => Ok(Method::Initialized),
            methods::LIST_TOOLS => Ok(Method::ListTools),
            methods::CALL_TOOL => Ok(Method::CallTool),
            methods::PING => Ok(Method::Ping),
            _ => Err(()),
        }
    }
}

/// What a tool produced before it is put on the wire
#[derive(Debug)]
enum ToolOutput {
    /// Sent as-is, without the metadata envelope
    Text(String),
    Json(Value),
}

/// MCP engine shared by every connection
///
/// The initialized flag is advisory: calls made before the client sends
/// `initialized` are served normally.
pub struct McpEngine {
    services: Services,
    initialized: AtomicBool,
}

impl McpEngine {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handle a raw POST body
    ///
    /// # Returns
    /// HTTP status and the JSON-RPC response; a body that is not a JSON-RPC
    /// request yields 400 with a `-32700` error.
    pub fn handle_body(&self, body: &str) -> (u16, McpResponse) {
        match serde_json::from_str::<McpRequest>(body) {
            Ok(request) => (200, self.handle_request(request)),
            Err(e) => {
                warn!(error = %e, "Unparseable MCP request");
                (400, McpResponse::parse_error())
            }
        }
    }

    fn dispatch(&self, request: &McpRequest) -> Result<McpResponse> {
        let id = request.id.clone();
        let Ok(method) = request.method.parse::<Method>() else {
            return Ok(McpResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ));
        };

        let result = match method {
            Method::Initialize => serde_json::to_value(InitializeResult::default())?,
            Method::Initialized => {
                self.initialized.store(true, Ordering::SeqCst);
                info!("MCP client initialized");
                json!({ "success": true })
            }
            Method::ListTools => json!({ "tools": get_tool_definitions() }),
            Method::CallTool => serde_json::to_value(self.call_tool(&request.params)?)?,
            Method::Ping => json!({ "status": "ok" }),
        };
        Ok(McpResponse::success(id, result))
    }

    /// Resolve, validate and run a tool; every tool-level failure becomes an
    /// `isError` result rather than a JSON-RPC error
    fn call_tool(&self, params: &Value) -> Result<ToolCallResult> {
        let params = params
            .as_object()
            .ok_or_else(|| BridgeError::Internal("tools/call requires params".to_string()))?;
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        let outcome = ToolName::from_str(name)
            .map_err(BridgeError::Validation)
            .and_then(|tool| {
                debug!(tool = %tool, "Calling tool");
                if let Some(def) = tool.definition() {
                    validate_arguments(&def.input_schema, &args)?;
                }
                self.run_tool(tool, &args)
                    .map(|output| (tool, output))
            });

        Ok(match outcome {
            Ok((_, ToolOutput::Text(text))) => ToolCallResult::text(text),
            Ok((tool, ToolOutput::Json(value))) => {
                ToolCallResult::json(&envelope::apply(value, tool))
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                ToolCallResult::error(format!("Error executing {}: {}", name, e))
            }
        })
    }

    fn run_tool(&self, tool: ToolName, args: &Value) -> Result<ToolOutput> {
        let services = &self.services;
        let output = match tool {
            ToolName::SearchLibrary => {
                let result = services.search.search_params(&args_to_params(args, &[]))?;
                ToolOutput::Json(serde_json::to_value(result)?)
            }
            ToolName::SearchAnnotations => {
                let search: AnnotationSearch = deserialize_args(args)?;
                ToolOutput::Json(services.annotations.search(&search)?)
            }
            ToolName::GetItemDetails => {
                let item = services.content.require_item(string_arg(args, "itemKey"))?;
                ToolOutput::Json(format_item(services.store.as_ref(), &item, &[])?)
            }
            ToolName::GetAnnotations => {
                let lookup: AnnotationLookup = deserialize_args(args)?;
                ToolOutput::Json(services.annotations.lookup(&lookup)?)
            }
            ToolName::GetContent => self.get_content(args)?,
            ToolName::GetCollections => {
                let options = CollectionListOptions::from_params(&args_to_params(args, &[]))?;
                ToolOutput::Json(Value::Array(services.collections.list(&options)?.entries))
            }
            ToolName::SearchCollections => {
                let listing = services.collections.search_params(&args_to_params(args, &[]))?;
                ToolOutput::Json(Value::Array(listing.entries))
            }
            ToolName::GetCollectionDetails => {
                let key = string_arg(args, "collectionKey");
                let params = args_to_params(args, &["collectionKey"]);
                ToolOutput::Json(services.collections.details_params(key, &params)?)
            }
            ToolName::GetCollectionItems => {
                let key = string_arg(args, "collectionKey");
                let params = args_to_params(args, &["collectionKey"]);
                let limit = params
                    .parse_usize("limit", DEFAULT_COLLECTION_LIMIT)
                    .map_err(BridgeError::Validation)?;
                let offset = params.parse_usize("offset", 0).map_err(BridgeError::Validation)?;
                ToolOutput::Json(services.collections.items_page(key, limit, offset)?)
            }
            ToolName::SearchFulltext => {
                let params = args_to_params(args, &[]);
                let options = FulltextOptions::from_params(&params)?;
                let result = services
                    .fulltext
                    .search(params.get("q").unwrap_or_default(), &options)?;
                ToolOutput::Json(serde_json::to_value(result)?)
            }
            ToolName::GetItemAbstract => {
                let result = services.content.abstract_of(string_arg(args, "itemKey"))?;
                if string_arg(args, "format") == "text" {
                    ToolOutput::Text(result.abstract_text)
                } else {
                    ToolOutput::Json(serde_json::to_value(result)?)
                }
            }
        };
        Ok(output)
    }

    fn get_content(&self, args: &Value) -> Result<ToolOutput> {
        let content = &self.services.content;
        let as_text = string_arg(args, "format") == "text";
        let item_key = string_arg(args, "itemKey");

        if !item_key.is_empty() {
            let include: IncludeOptions = match args.get("include") {
                Some(raw) if raw.is_object() => deserialize_args(raw)?,
                _ => IncludeOptions::default(),
            };
            let result = content.item_content(item_key, include)?;
            return Ok(if as_text {
                ToolOutput::Text(convert_to_text(&result))
            } else {
                ToolOutput::Json(serde_json::to_value(result)?)
            });
        }

        let attachment = content.attachment_content(string_arg(args, "attachmentKey"))?;
        Ok(if as_text {
            ToolOutput::Text(attachment.content)
        } else {
            ToolOutput::Json(serde_json::to_value(attachment)?)
        })
    }

    /// Introspection block for `/mcp/status`
    pub fn status(&self) -> Value {
        json!({
            "isInitialized": self.is_initialized(),
            "serverInfo": ServerInfo::default(),
            "protocolVersion": PROTOCOL_VERSION,
            "supportedMethods": methods::SUPPORTED,
            "availableTools": ToolName::ALL.iter().map(ToolName::as_str).collect::<Vec<_>>(),
        })
    }

    /// Server identity plus the full tool registry
    pub fn capabilities(&self) -> Value {
        json!({
            "serverInfo": ServerInfo::default(),
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": InitializeResult::default().capabilities,
            "tools": get_tool_definitions(),
        })
    }
}

impl McpHandler for McpEngine {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        debug!(method = %request.method, "MCP request");
        match self.dispatch(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %request.method, error = %e, "MCP dispatch failed");
                McpResponse::error(request.id, error_codes::INTERNAL_ERROR, "Internal error")
            }
        }
    }
}

fn string_arg<'a>(args: &'a Value, name: &str) -> &'a str {
    args.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

/// Flatten tool arguments to request parameters; arrays become comma lists
fn args_to_params(args: &Value, skip: &[&str]) -> QueryParams {
    let mut params = QueryParams::new();
    let Some(object) = args.as_object() else {
        return params;
    };
    for (key, value) in object {
        if skip.contains(&key.as_str()) {
            continue;
        }
        let rendered = match value {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            other => scalar_to_string(other),
        };
        if let Some(rendered) = rendered {
            params.insert(key.clone(), rendered);
        }
    }
    params
}

/// Clients often send `15.0` where an integer is meant
fn integral_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f >= 0.0 && f < 1e15 => json!(f as u64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integral_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integral_numbers(v)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

fn deserialize_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    let args = match args {
        Value::Null => json!({}),
        other => integral_numbers(other.clone()),
    };
    serde_json::from_value(args)
        .map_err(|e| BridgeError::validation(format!("Invalid arguments: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLibrary;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const LIBRARY: &str = r#"{
        "items": [
            {"id": 1, "key": "PAPER001", "itemType": "journalArticle",
             "fields": {"title": "Attention Is All You Need", "date": "2017", "abstractNote": "Transformers replace recurrence."},
             "creators": [{"firstName": "Ashish", "lastName": "Vaswani", "creatorType": "author"}],
             "tags": ["nlp"], "collections": [10],
             "dateAdded": "2024-01-01T00:00:00Z", "dateModified": "2024-01-02T00:00:00Z"}
        ],
        "collections": [{"id": 10, "key": "COLL0001", "name": "Deep Learning"}]
    }"#;

    fn engine() -> McpEngine {
        let store = Arc::new(MemoryLibrary::from_json(LIBRARY).unwrap());
        McpEngine::new(Services::with_file_extractor(store))
    }

    fn call(engine: &McpEngine, name: &str, arguments: Value) -> ToolCallResult {
        let response = engine.handle_request(McpRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: "tools/call".into(),
            params: json!({"name": name, "arguments": arguments}),
        });
        assert!(response.error.is_none(), "tool calls never produce protocol errors");
        serde_json::from_value(response.result.unwrap()).unwrap()
    }

    #[test]
    fn test_parse_error_is_400() {
        let (status, response) = engine().handle_body("{not json");
        assert_eq!(status, 400);
        assert_eq!(response.id, json!("unknown"));
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[test]
    fn test_unknown_method() {
        let (status, response) =
            engine().handle_body(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#);
        assert_eq!(status, 200);
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found: resources/list");
    }

    #[test]
    fn test_initialized_flag_and_alias() {
        let engine = engine();
        assert!(!engine.is_initialized());
        let (_, response) =
            engine.handle_body(r#"{"jsonrpc":"2.0","id":1,"method":"notifications/initialized"}"#);
        assert_eq!(response.result, Some(json!({"success": true})));
        assert!(engine.is_initialized());
        assert_eq!(engine.status()["isInitialized"], true);
    }

    #[test]
    fn test_tools_call_without_params_is_internal_error() {
        let (_, response) = engine().handle_body(r#"{"jsonrpc":"2.0","id":9,"method":"tools/call"}"#);
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "Internal error");
        assert_eq!(response.id, json!(9));
    }

    #[test]
    fn test_missing_argument_is_tool_error() {
        let result = call(&engine(), "get_item_details", json!({}));
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            Some("Error executing get_item_details: itemKey is required")
        );
    }

    #[test]
    fn test_unknown_tool_is_tool_error() {
        let result = call(&engine(), "delete_library", json!({}));
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            Some("Error executing delete_library: Unknown tool: delete_library")
        );
    }

    #[test]
    fn test_search_library_envelope() {
        let result = call(&engine(), "search_library", json!({"q": "attention", "limit": 5.0}));
        assert!(!result.is_error);
        let body: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert_eq!(body["metadata"]["toolName"], "search_library");
        assert_eq!(body["metadata"]["responseType"], "object");
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["query"]["limit"], 5);
        assert_eq!(body["data"]["results"][0]["key"], "PAPER001");
    }

    #[test]
    fn test_abstract_as_text_skips_envelope() {
        let result = call(
            &engine(),
            "get_item_abstract",
            json!({"itemKey": "PAPER001", "format": "text"}),
        );
        assert_eq!(result.first_text(), Some("Transformers replace recurrence."));
    }

    #[test]
    fn test_collections_are_arrays() {
        let result = call(&engine(), "get_collections", json!({}));
        let body: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert_eq!(body["metadata"]["responseType"], "array");
        assert_eq!(body["metadata"]["count"], 1);
        assert_eq!(body["data"][0]["name"], "Deep Learning");
    }

    #[test]
    fn test_not_found_surfaces_message() {
        let result = call(&engine(), "get_collection_details", json!({"collectionKey": "MISSING1"}));
        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            Some("Error executing get_collection_details: Collection with key MISSING1 not found")
        );
    }

    #[test]
    fn test_args_to_params() {
        let params = args_to_params(
            &json!({"q": "x", "itemKeys": ["A", "B"], "limit": 10.0, "caseSensitive": true, "skip": null}),
            &[],
        );
        assert_eq!(params.get("q"), Some("x"));
        assert_eq!(params.get("itemKeys"), Some("A,B"));
        assert_eq!(params.get("limit"), Some("10"));
        assert_eq!(params.get("caseSensitive"), Some("true"));
        assert!(!params.contains_key("skip"));
    }

    #[test]
    fn test_every_listed_tool_dispatches() {
        let engine = engine();
        for def in get_tool_definitions() {
            let result = call(&engine, &def.name, json!({}));
            let text = result.first_text().unwrap_or_default().to_string();
            assert!(!text.contains("Unknown tool"), "{} did not resolve", def.name);
        }
    }
}
