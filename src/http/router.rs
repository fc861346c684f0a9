//! Ordered route table
//!
//! Literal paths and specific patterns come before prefix matches, so
//! `/search/fulltext` wins over the `/search` prefix and
//! `/collections/search` over `/collections/:key`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Every endpoint the server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    FulltextSearch,
    Search,
    Collections,
    CollectionSearch,
    CollectionItems,
    CollectionDetails,
    ItemPdfContent,
    ItemFulltext,
    ItemNotes,
    ItemAnnotations,
    ItemAbstract,
    ItemDetails,
    AttachmentContent,
    AnnotationSearch,
    AnnotationBatch,
    AnnotationById,
    Mcp,
    McpStatus,
    McpCapabilities,
    Capabilities,
    Help,
}

impl Route {
    pub fn description(&self) -> &'static str {
        match self {
            Route::Ping => "Liveness check",
            Route::FulltextSearch => "Search attachment text, notes and abstracts",
            Route::Search => "Search library items",
            Route::Collections => "List collections",
            Route::CollectionSearch => "Search collections by name",
            Route::CollectionItems => "Items in a collection",
            Route::CollectionDetails => "Collection details",
            Route::ItemPdfContent => "Text of an item's PDF attachments",
            Route::ItemFulltext => "Abstract, attachment text, notes and webpage of an item",
            Route::ItemNotes => "Child notes of an item",
            Route::ItemAnnotations => "Annotations on an item's attachments",
            Route::ItemAbstract => "Abstract of an item",
            Route::ItemDetails => "Item metadata",
            Route::AttachmentContent => "Extracted text of one attachment",
            Route::AnnotationSearch => "Search annotations and notes",
            Route::AnnotationBatch => "Fetch annotations by id list",
            Route::AnnotationById => "Fetch one annotation",
            Route::Mcp => "MCP JSON-RPC endpoint",
            Route::McpStatus => "MCP engine status",
            Route::McpCapabilities => "MCP tools and server info",
            Route::Capabilities => "Server capabilities and endpoints",
            Route::Help => "This endpoint list",
        }
    }
}

/// One row of the endpoint listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    pub description: &'static str,
}

enum Matcher {
    Exact(&'static str),
    Pattern(Regex),
    Prefix(&'static str),
}

struct RouteEntry {
    methods: &'static [&'static str],
    matcher: Matcher,
    route: Route,
}

/// Positional captures from a pattern route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<String>);

impl PathParams {
    /// Capture by position, 1-based like regex groups
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
    }

    /// First capture, empty when absent
    pub fn key(&self) -> &str {
        self.get(1).unwrap_or("")
    }
}

const GET: &[&str] = &["GET"];
const POST: &[&str] = &["POST"];
const GET_POST: &[&str] = &["GET", "POST"];

fn pattern(re: &str) -> Matcher {
    Matcher::Pattern(Regex::new(re).unwrap())
}

static ROUTES: Lazy<Vec<RouteEntry>> = Lazy::new(|| {
    use Route::*;
    let entry = |methods, matcher, route| RouteEntry {
        methods,
        matcher,
        route,
    };
    vec![
        entry(GET, Matcher::Exact("/ping"), Ping),
        entry(GET, Matcher::Exact("/search/fulltext"), FulltextSearch),
        entry(GET, Matcher::Prefix("/search"), Search),
        entry(GET, Matcher::Exact("/collections"), Collections),
        entry(GET, Matcher::Exact("/collections/search"), CollectionSearch),
        entry(GET, pattern(r"^/collections/([A-Za-z0-9]+)/items$"), CollectionItems),
        entry(GET, pattern(r"^/collections/([A-Za-z0-9]+)$"), CollectionDetails),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)/pdf-content$"), ItemPdfContent),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)/fulltext$"), ItemFulltext),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)/notes$"), ItemNotes),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)/annotations$"), ItemAnnotations),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)/abstract$"), ItemAbstract),
        entry(GET, pattern(r"^/items/([A-Za-z0-9]+)$"), ItemDetails),
        entry(GET, pattern(r"^/attachments/([A-Za-z0-9]+)/content$"), AttachmentContent),
        entry(GET_POST, Matcher::Exact("/annotations/search"), AnnotationSearch),
        entry(POST, Matcher::Exact("/annotations/batch"), AnnotationBatch),
        entry(GET, pattern(r"^/annotations/([A-Za-z0-9]+)$"), AnnotationById),
        entry(POST, Matcher::Exact("/mcp"), Mcp),
        entry(GET, Matcher::Exact("/mcp/status"), McpStatus),
        entry(GET, Matcher::Exact("/mcp/capabilities"), McpCapabilities),
        entry(GET, Matcher::Exact("/capabilities"), Capabilities),
        entry(GET, Matcher::Exact("/help"), Help),
    ]
});

/// First route accepting `method` and `path`
pub fn resolve(method: &str, path: &str) -> Option<(Route, PathParams)> {
    ROUTES
        .iter()
        .filter(|entry| entry.methods.iter().any(|m| *m == method))
        .find_map(|entry| {
            let params = match &entry.matcher {
                Matcher::Exact(p) => (*p == path).then(PathParams::default),
                Matcher::Prefix(p) => path.starts_with(p).then(PathParams::default),
                Matcher::Pattern(re) => re.captures(path).map(|caps| {
                    PathParams(
                        caps.iter()
                            .skip(1)
                            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                            .collect(),
                    )
                }),
            };
            params.map(|params| (entry.route, params))
        })
}

/// Methods and path template of every route, for introspection
pub fn endpoints() -> Vec<Endpoint> {
    ROUTES
        .iter()
        .map(|entry| {
            let path = match &entry.matcher {
                Matcher::Exact(p) | Matcher::Prefix(p) => p.to_string(),
                Matcher::Pattern(re) => re
                    .as_str()
                    .trim_start_matches('^')
                    .trim_end_matches('$')
                    .replace("([A-Za-z0-9]+)", ":key"),
            };
            Endpoint {
                method: entry.methods.join("/"),
                path,
                description: entry.route.description(),
            }
        })
        .collect()
}
