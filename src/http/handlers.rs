//! REST handlers
//!
//! Every handler is synchronous and returns a finished [`HttpResponse`];
//! failures are converted to `{"error": message}` bodies here so nothing
//! reaches the socket layer as an error.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use super::request::Request;
use super::response::HttpResponse;
use super::router::{self, PathParams, Route};
use crate::content::{
    format_item, AnnotationSearch, CollectionListOptions, FulltextOptions, FulltextSections,
    DEFAULT_NOTES_LIMIT,
};
use crate::error::{BridgeError, Result};
use crate::mcp::{get_tool_definitions, McpEngine, ServerInfo, PROTOCOL_VERSION};
use crate::services::Services;
use crate::types::QueryParams;

/// Shared state handed to every connection
pub struct AppState {
    pub services: Services,
    pub mcp: Arc<McpEngine>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            mcp: Arc::new(McpEngine::new(services.clone())),
            services,
        }
    }
}

/// Outcome of routing one request
#[derive(Debug)]
pub enum Reply {
    Response(HttpResponse),
    /// No route matched; answered with the fixed plain-text 404
    NotFound,
}

/// Route and run a parsed request
pub fn handle(state: &AppState, request: &Request) -> Reply {
    let Some((route, params)) = router::resolve(&request.method, &request.path) else {
        debug!(method = %request.method, path = %request.path, "No route");
        return Reply::NotFound;
    };
    debug!(?route, path = %request.path, "Dispatching");

    let response = match dispatch(state, route, &params, request) {
        Ok(response) => response,
        Err(e) => {
            if e.is_client_error() {
                debug!(?route, error = %e, "Request rejected");
            } else {
                warn!(?route, error = %e, "Handler failed");
            }
            HttpResponse::from_error(&e)
        }
    };
    Reply::Response(response)
}

fn dispatch(state: &AppState, route: Route, params: &PathParams, req: &Request) -> Result<HttpResponse> {
    let services = &state.services;
    let query = &req.query;
    let key = params.key();

    match route {
        Route::Ping => Ok(HttpResponse::ok(&json!({
            "message": "pong",
            "timestamp": Utc::now().to_rfc3339(),
        }))),
        Route::Search => Ok(HttpResponse::ok(&services.search.search_params(query)?)),
        Route::FulltextSearch => {
            let options = FulltextOptions::from_params(query)?;
            let result = services
                .fulltext
                .search(query.get("q").unwrap_or_default(), &options)?;
            Ok(HttpResponse::ok(&result))
        }
        Route::Collections => {
            let listing = services
                .collections
                .list(&CollectionListOptions::from_params(query)?)?;
            Ok(HttpResponse::ok(&listing.entries)
                .with_header("X-Total-Count", listing.total.to_string()))
        }
        Route::CollectionSearch => {
            let listing = services.collections.search_params(query)?;
            Ok(HttpResponse::ok(&listing.entries)
                .with_header("X-Total-Count", listing.total.to_string()))
        }
        Route::CollectionDetails => Ok(HttpResponse::ok(
            &services.collections.details_params(key, query)?,
        )),
        Route::CollectionItems => {
            let listing = services.collections.items_params(key, query)?;
            Ok(HttpResponse::ok(&listing.entries)
                .with_header("X-Total-Count", listing.total.to_string()))
        }
        Route::ItemDetails => {
            let item = services.content.require_item(key)?;
            let fields = query.get_list("fields");
            Ok(HttpResponse::ok(&format_item(
                services.store.as_ref(),
                &item,
                &fields,
            )?))
        }
        Route::ItemPdfContent => {
            let text = services.content.pdf_content(key)?;
            if wants_text(query) {
                Ok(HttpResponse::text(200, text))
            } else {
                Ok(HttpResponse::ok(&json!({ "itemKey": key, "content": text })))
            }
        }
        Route::ItemFulltext => {
            let sections = FulltextSections::from_params(query);
            Ok(HttpResponse::ok(&services.fulltext.item_fulltext(key, sections)?))
        }
        Route::ItemNotes => {
            let limit = parse_usize(query, "limit", DEFAULT_NOTES_LIMIT)?;
            let offset = parse_usize(query, "offset", 0)?;
            Ok(HttpResponse::ok(&services.content.notes(key, limit, offset)?))
        }
        Route::ItemAnnotations => Ok(HttpResponse::ok(&services.annotations.for_item(key, query)?)),
        Route::ItemAbstract => {
            let result = services.content.abstract_of(key)?;
            if wants_text(query) {
                Ok(HttpResponse::text(200, result.abstract_text))
            } else {
                Ok(HttpResponse::ok(&result))
            }
        }
        Route::AttachmentContent => {
            let content = services.content.attachment_content(key)?;
            if wants_text(query) {
                Ok(HttpResponse::text(200, content.content))
            } else {
                Ok(HttpResponse::ok(&content))
            }
        }
        Route::AnnotationSearch => {
            let search = if req.method == "POST" {
                annotation_search_body(&req.body)?
            } else {
                AnnotationSearch::from_params(query)?
            };
            Ok(HttpResponse::ok(&services.annotations.search(&search)?))
        }
        Route::AnnotationBatch => Ok(HttpResponse::ok(&services.annotations.batch(&req.body)?)),
        Route::AnnotationById => Ok(HttpResponse::ok(&services.annotations.by_id(key)?)),
        Route::Mcp => {
            let (status, response) = state.mcp.handle_body(&req.body);
            Ok(HttpResponse::json(status, &response))
        }
        Route::McpStatus => Ok(HttpResponse::ok(&state.mcp.status())),
        Route::McpCapabilities => Ok(HttpResponse::ok(&state.mcp.capabilities())),
        Route::Capabilities => Ok(HttpResponse::ok(&json!({
            "serverInfo": ServerInfo::default(),
            "protocolVersion": PROTOCOL_VERSION,
            "tools": get_tool_definitions(),
            "endpoints": router::endpoints(),
            "timestamp": Utc::now().to_rfc3339(),
        }))),
        Route::Help => Ok(HttpResponse::ok(&json!({
            "name": ServerInfo::default().name,
            "version": ServerInfo::default().version,
            "endpoints": router::endpoints(),
        }))),
    }
}

fn wants_text(query: &QueryParams) -> bool {
    query.get("format") == Some("text")
}

fn parse_usize(query: &QueryParams, key: &str, default: usize) -> Result<usize> {
    query.parse_usize(key, default).map_err(BridgeError::Validation)
}

fn annotation_search_body(body: &str) -> Result<AnnotationSearch> {
    serde_json::from_str(body)
        .map_err(|_| BridgeError::validation("Invalid JSON in request body"))
}
