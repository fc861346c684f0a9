//! Zotero Bridge HTTP/MCP server
//!
//! Run with: zotero-bridge-server --library ~/zotero-library.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zotero_bridge::config::{expand_path, validate_port, ServerConfig, ServerPreferences};
use zotero_bridge::http::{AppState, HttpServer};
use zotero_bridge::storage::MemoryLibrary;
use zotero_bridge::Services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "zotero-bridge-server")]
#[command(about = "Serve a reference library over HTTP and MCP")]
struct Args {
    /// TOML preference file
    #[arg(long, env = "ZOTERO_MCP_CONFIG")]
    config: Option<String>,

    /// Listening port (1-65535)
    #[arg(long, env = "ZOTERO_MCP_PORT")]
    port: Option<u32>,

    /// Interface to bind
    #[arg(long, env = "ZOTERO_MCP_HOST")]
    host: Option<String>,

    /// Set to false to exit without serving
    #[arg(long, env = "ZOTERO_MCP_ENABLED")]
    enabled: Option<bool>,

    /// JSON library snapshot
    #[arg(long, env = "ZOTERO_LIBRARY_PATH")]
    library: Option<String>,

    /// Count items in subcollections as members of their ancestors
    #[arg(long, env = "ZOTERO_RECURSIVE_COLLECTIONS")]
    recursive_collections: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Defaults, then the preference file, then flags and environment
fn build_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();
    if let Some(path) = &args.config {
        let path = expand_path(path);
        let prefs = ServerPreferences::load(&path)
            .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
        config = config.with_preferences(&prefs);
    }
    if let Some(port) = args.port {
        config.port = validate_port(port)?;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(enabled) = args.enabled {
        config.enabled = enabled;
    }
    if let Some(library) = &args.library {
        config.library_path = Some(expand_path(library));
    }
    Ok(config)
}

fn load_library(path: Option<&PathBuf>, recursive: bool) -> anyhow::Result<MemoryLibrary> {
    let library = match path {
        Some(path) => {
            let library = MemoryLibrary::load(path)
                .with_context(|| format!("Failed to load library from {}", path.display()))?;
            info!(path = %path.display(), items = library.item_count(), "Library loaded");
            library
        }
        None => {
            warn!("No library snapshot configured, serving an empty library");
            MemoryLibrary::empty()
        }
    };
    Ok(library.with_recursive_collections(recursive))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let config = build_config(&args)?;
    if !config.enabled {
        info!("Server disabled by configuration, exiting");
        return Ok(());
    }

    let library = load_library(config.library_path.as_ref(), args.recursive_collections)?;
    let services = Services::with_file_extractor(Arc::new(library));
    let server = HttpServer::new(config, AppState::new(services));

    let addr = server.start().await?;
    info!(%addr, version = zotero_bridge::VERSION, "Zotero bridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    server.stop().await;
    Ok(())
}
