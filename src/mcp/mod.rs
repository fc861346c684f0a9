//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC 2.0 over HTTP POST for AI tool integration. Protocol failures
//! come back as JSON-RPC errors; tool failures come back as successful
//! responses whose result carries `isError: true`.

mod engine;
pub mod envelope;
pub mod protocol;
pub mod tools;

pub use engine::McpEngine;
pub use protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, ServerInfo, ToolCallResult,
    ToolContent, ToolDefinition, PROTOCOL_VERSION,
};
pub use tools::{get_tool_definitions, validate_arguments, ToolName, TOOL_DEFINITIONS};
