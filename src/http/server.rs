//! TCP listener and per-connection lifecycle

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::handlers::{self, AppState, Reply};
use super::request::{parse_request, read_request, BAD_REQUEST_RESPONSE};
use super::response::{HttpResponse, NOT_FOUND_RESPONSE};
use crate::config::ServerConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct ReadLimits {
    max_bytes: usize,
    timeout: Duration,
}

struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_loop: JoinHandle<()>,
}

/// HTTP server with an explicit start/stop lifecycle
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
    running: Arc<AtomicBool>,
    inner: Mutex<Option<Running>>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
            running: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(None),
        }
    }

    /// Bind and spawn the accept loop
    ///
    /// Returns once the socket is listening. Starting a running server is a
    /// no-op that reports the existing address.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            warn!(%addr, "Server is already running");
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let limits = ReadLimits {
            max_bytes: self.config.max_request_bytes,
            timeout: self.config.read_timeout,
        };

        self.running.store(true, Ordering::SeqCst);
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            self.state.clone(),
            limits,
            shutdown_rx,
            self.running.clone(),
        ));
        *self.inner.lock() = Some(Running {
            addr,
            shutdown,
            accept_loop,
        });

        info!(%addr, "HTTP server listening");
        Ok(addr)
    }

    /// Signal the accept loop to exit and wait for it
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn stop(&self) {
        let Some(running) = self.inner.lock().take() else {
            debug!("Stop requested but server is not running");
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.accept_loop.await {
            error!(error = %e, "Accept loop ended abnormally");
        }
        self.running.store(false, Ordering::SeqCst);
        info!(addr = %running.addr, "HTTP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().as_ref().map(|r| r.addr)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    limits: ReadLimits,
    mut shutdown: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let span = info_span!("connection", id = %Uuid::new_v4(), %peer);
                    tokio::spawn(handle_connection(stream, state.clone(), limits).instrument(span));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!("Accept loop exited");
}

/// One request, one response, then close
async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>, limits: ReadLimits) {
    let text = read_request(&mut stream, limits.max_bytes, limits.timeout).await;
    let request_line = text.split("\r\n").next().unwrap_or_default();
    info!(request_line, bytes = text.len(), "Received request");

    let written = match parse_request(&text) {
        Err(e) => {
            warn!(error = %e, "Invalid request");
            stream.write_all(BAD_REQUEST_RESPONSE.as_bytes()).await
        }
        Ok(request) => {
            let state = state.clone();
            match tokio::task::spawn_blocking(move || handlers::handle(&state, &request)).await {
                Ok(Reply::Response(response)) => {
                    debug!(status = response.status, bytes = response.body.len(), "Responding");
                    response.write_to(&mut stream).await
                }
                Ok(Reply::NotFound) => stream.write_all(NOT_FOUND_RESPONSE.as_bytes()).await,
                Err(e) => {
                    error!(error = %e, "Handler task failed");
                    HttpResponse::text(500, "Internal Server Error")
                        .write_to(&mut stream)
                        .await
                }
            }
        }
    };

    if let Err(e) = written {
        debug!(error = %e, "Failed to write response");
    }
    let _ = stream.shutdown().await;
}
