//! Zotero Bridge - HTTP and MCP access to a reference library
//!
//! Serves a read-only view of a Zotero-style library over a small HTTP/1.1
//! server: REST endpoints for search, items, collections, notes,
//! annotations and extracted text, plus an MCP JSON-RPC endpoint exposing
//! the same operations as tools for AI clients.

pub mod config;
pub mod content;
pub mod error;
pub mod http;
pub mod mcp;
pub mod search;
pub mod services;
pub mod storage;
pub mod types;

pub use error::{BridgeError, Result};
pub use services::Services;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
