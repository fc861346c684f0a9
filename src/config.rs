//! Server configuration
//!
//! Values are layered: built-in defaults, then an optional TOML preference
//! file, then command-line flags and environment variables (applied by the
//! binary). Preference getters never fail; invalid values fall back to the
//! defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 23120;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime configuration for [`crate::http::HttpServer`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Listening port; 0 binds an ephemeral port
    pub port: u16,
    pub enabled: bool,
    /// Hard cap on buffered request bytes (headers plus body)
    pub max_request_bytes: usize,
    /// Upper bound on each individual socket read
    pub read_timeout: Duration,
    /// JSON library snapshot loaded at startup
    pub library_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            enabled: true,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            library_path: None,
        }
    }
}

impl ServerConfig {
    /// Apply preference-file values on top of the current config
    pub fn with_preferences(mut self, prefs: &ServerPreferences) -> Self {
        self.port = prefs.port();
        self.enabled = prefs.enabled();
        if let Some(host) = prefs.server.host.as_deref().filter(|h| !h.is_empty()) {
            self.host = host.to_string();
        }
        if let Some(max) = prefs.server.max_request_bytes.filter(|m| *m > 0) {
            self.max_request_bytes = max;
        }
        if let Some(ms) = prefs.server.read_timeout_ms.filter(|ms| *ms > 0) {
            self.read_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = prefs.library.path.as_deref() {
            self.library_path = Some(expand_path(path));
        }
        self
    }

    /// Socket address string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Kept loose so a malformed value degrades to the default instead of failing the load
    pub port: Option<toml::Value>,
    pub enabled: Option<toml::Value>,
    pub host: Option<String>,
    pub max_request_bytes: Option<usize>,
    pub read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    pub path: Option<String>,
}

/// Persisted preferences, read from a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerPreferences {
    pub server: ServerSection,
    pub library: LibrarySection,
}

impl ServerPreferences {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Configured port, or the default when missing or outside 1..=65535
    pub fn port(&self) -> u16 {
        let parsed = match &self.server.port {
            Some(toml::Value::Integer(n)) => Some(*n),
            Some(toml::Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if (1..=65535).contains(&n) => n as u16,
            _ => DEFAULT_PORT,
        }
    }

    /// Whether the server should run; defaults to true
    pub fn enabled(&self) -> bool {
        match &self.server.enabled {
            Some(toml::Value::Boolean(b)) => *b,
            Some(toml::Value::String(s)) => !matches!(s.trim(), "false" | "0" | "no" | "off"),
            _ => true,
        }
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// Validate a user-supplied port at the binary boundary
pub fn validate_port(port: u32) -> Result<u16> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(BridgeError::Config(format!(
            "Invalid port {}: must be between 1 and 65535",
            port
        )))
    }
}
