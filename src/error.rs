//! Error types for the Zotero bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed HTTP request line or unparseable JSON-RPC envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Bad query parameter or missing required argument
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BridgeError::NotFound(message.into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Parse(_) | BridgeError::Validation(_) => 400,
            BridgeError::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// HTTP reason phrase matching [`status_code`](Self::status_code)
    pub fn status_text(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            404 => "Not Found",
            _ => "Internal Server Error",
        }
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            BridgeError::Parse(_) => -32700,
            BridgeError::Validation(_) => -32602,
            BridgeError::NotFound(_) => -32001,
            _ => -32603,
        }
    }

    /// Whether the error stems from the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
