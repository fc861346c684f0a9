//! End-to-end tests against a live server on an ephemeral port
//!
//! Run with: cargo test --test http_integration

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zotero_bridge::config::ServerConfig;
use zotero_bridge::http::{AppState, HttpServer, BAD_REQUEST_RESPONSE, NOT_FOUND_RESPONSE};
use zotero_bridge::mcp::ToolName;
use zotero_bridge::storage::MemoryLibrary;
use zotero_bridge::Services;

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    raw: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|e| panic!("{}: {}", e, self.body))
    }
}

async fn start_server() -> (HttpServer, SocketAddr) {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/library.json");
    let library = MemoryLibrary::load(Path::new(path)).unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    let server = HttpServer::new(
        config,
        AppState::new(Services::with_file_extractor(Arc::new(library))),
    );
    let addr = server.start().await.unwrap();
    (server, addr)
}

async fn send(addr: SocketAddr, raw: &str) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    let raw = String::from_utf8(bytes).unwrap();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Reply {
        status,
        headers,
        body: body.to_string(),
        raw: raw.clone(),
    }
}

async fn get(addr: SocketAddr, target: &str) -> Reply {
    send(addr, &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target)).await
}

async fn post_json(addr: SocketAddr, target: &str, body: &Value) -> Reply {
    let body = body.to_string();
    send(
        addr,
        &format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            target,
            body.len(),
            body
        ),
    )
    .await
}

async fn call_tool(addr: SocketAddr, name: &str, arguments: Value) -> Value {
    let reply = post_json(
        addr,
        "/mcp",
        &json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }),
    )
    .await;
    assert_eq!(reply.status, 200, "{}", reply.body);
    reply.json()["result"].clone()
}

fn tool_payload(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_search_over_the_wire() {
    let (server, addr) = start_server().await;

    let reply = get(addr, "/search?q=transformers&sort=title&direction=asc").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("Connection"), Some("close"));
    assert_eq!(
        reply.header("Content-Length"),
        Some(reply.body.len().to_string().as_str())
    );
    let body = reply.json();
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["results"][0]["key"], "PAPER001");
    assert_eq!(body["results"][1]["key"], "PAPER003");

    let reply = get(addr, "/search?sort=relevance").await;
    assert_eq!(reply.status, 400);
    assert!(reply.json()["error"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported sort field"));

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_routes_and_bad_requests() {
    let (server, addr) = start_server().await;

    for method in ["GET", "POST", "DELETE", "PATCH"] {
        let reply = send(addr, &format!("{} /no/such/path HTTP/1.1\r\n\r\n", method)).await;
        assert_eq!(reply.raw, NOT_FOUND_RESPONSE, "{}", method);
    }

    let reply = send(addr, "NOT-HTTP\r\n\r\n").await;
    assert_eq!(reply.raw, BAD_REQUEST_RESPONSE);

    let reply = get(addr, "/items/PAPER001").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()["notes"].as_array().unwrap().len(), 1);

    let reply = get(addr, "/items/NOPE0000").await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.json()["error"], "Item with key NOPE0000 not found");

    server.stop().await;
}

#[tokio::test]
async fn test_collection_headers() {
    let (server, addr) = start_server().await;

    let reply = get(addr, "/collections?limit=1").await;
    assert_eq!(reply.header("X-Total-Count"), Some("3"));
    assert_eq!(reply.json().as_array().unwrap().len(), 1);

    let reply = get(addr, "/collections/COLLML01/items").await;
    assert_eq!(reply.header("X-Total-Count"), Some("2"));

    let reply = get(addr, "/collections/search?q=vision").await;
    assert_eq!(reply.header("X-Total-Count"), Some("1"));
    assert_eq!(reply.json()[0]["key"], "COLLVIS1");

    server.stop().await;
}

#[tokio::test]
async fn test_text_formats() {
    let (server, addr) = start_server().await;

    let reply = get(addr, "/items/PAPER001/abstract?format=text").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("Content-Type"), Some("text/plain; charset=utf-8"));
    assert!(reply.body.starts_with("The dominant sequence transduction models"));

    let reply = get(addr, "/attachments/ATTACH01/content").await;
    assert_eq!(reply.status, 200);
    assert!(reply.json()["content"]
        .as_str()
        .unwrap()
        .contains("1 Introduction"));

    server.stop().await;
}

#[tokio::test]
async fn test_annotations_endpoints() {
    let (server, addr) = start_server().await;

    let reply = get(addr, "/annotations/ANNO0001").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()["content"], "dominant sequence transduction models");

    let reply = post_json(addr, "/annotations/search", &json!({"q": "ResNet"})).await;
    assert_eq!(reply.status, 200);
    assert!(reply.body.contains("ANNO0002"));

    let reply = send(
        addr,
        "POST /annotations/search HTTP/1.1\r\nContent-Length: 5\r\n\r\n{bad}",
    )
    .await;
    assert_eq!(reply.status, 400);

    server.stop().await;
}

#[tokio::test]
async fn test_mcp_handshake_and_tools() {
    let (server, addr) = start_server().await;

    let reply = post_json(
        addr,
        "/mcp",
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;
    let body = reply.json();
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "zotero-integrated-mcp");

    let reply = get(addr, "/mcp/status").await;
    assert_eq!(reply.json()["isInitialized"], false);

    post_json(
        addr,
        "/mcp",
        &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    let reply = get(addr, "/mcp/status").await;
    assert_eq!(reply.json()["isInitialized"], true);

    let reply = post_json(
        addr,
        "/mcp",
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await;
    let tools = reply.json()["result"]["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), ToolName::ALL.len());
    for tool in &tools {
        let name = tool["name"].as_str().unwrap();
        assert!(name.parse::<ToolName>().is_ok(), "{} does not resolve", name);
        assert!(tool["inputSchema"].is_object());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_mcp_tool_calls() {
    let (server, addr) = start_server().await;

    let result = call_tool(addr, "search_library", json!({"q": "transformers", "limit": 1})).await;
    assert_eq!(result["isError"], false);
    let payload = tool_payload(&result);
    assert_eq!(payload["data"]["pagination"]["total"], 2);
    assert_eq!(payload["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(payload["metadata"]["toolName"], "search_library");

    let result = call_tool(addr, "search_library", json!({})).await;
    assert_eq!(result["isError"], false);
    assert_eq!(tool_payload(&result)["data"]["pagination"]["total"], 4);

    let result = call_tool(addr, "get_item_details", json!({"itemKey": "PAPER001"})).await;
    assert_eq!(result["isError"], false);
    let details = tool_payload(&result);
    assert_eq!(
        details["data"]["notes"],
        json!(["<p>Key idea: self-attention replaces recurrence</p>"])
    );
    assert!(details["data"]["attachments"].is_array());

    let result = call_tool(addr, "get_collection_items", json!({"collectionKey": "NOSUCHCO"})).await;
    assert_eq!(result["isError"], true);

    let result = call_tool(addr, "get_collections", json!({})).await;
    let payload = tool_payload(&result);
    assert_eq!(payload["metadata"]["count"], 3);

    let result = call_tool(addr, "get_item_abstract", json!({"itemKey": "PAPER001", "format": "text"})).await;
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("The dominant sequence"));

    let result = call_tool(addr, "no_such_tool", json!({})).await;
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Unknown tool: no_such_tool"));

    server.stop().await;
}

#[tokio::test]
async fn test_mcp_parse_error() {
    let (server, addr) = start_server().await;

    let reply = send(
        addr,
        "POST /mcp HTTP/1.1\r\nContent-Length: 8\r\n\r\nnot json",
    )
    .await;
    assert_eq!(reply.status, 400);
    let body = reply.json();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], "unknown");

    let reply = post_json(
        addr,
        "/mcp",
        &json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
    )
    .await;
    assert_eq!(reply.json()["error"]["code"], -32601);

    server.stop().await;
}

#[tokio::test]
async fn test_help_and_capabilities() {
    let (server, addr) = start_server().await;

    let help = get(addr, "/help").await.json();
    let paths: Vec<&str> = help["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/search"));
    assert!(paths.contains(&"/mcp"));

    let capabilities = get(addr, "/capabilities").await.json();
    assert_eq!(
        capabilities["tools"].as_array().unwrap().len(),
        ToolName::ALL.len()
    );

    server.stop().await;
}
