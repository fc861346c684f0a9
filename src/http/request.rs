//! Reading and parsing one HTTP/1.1 request from a socket

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use url::Url;

use crate::error::{BridgeError, Result};
use crate::types::QueryParams;

const HEADER_TERMINATOR: &str = "\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// Sent for a request line that cannot be parsed; written as-is
pub const BAD_REQUEST_RESPONSE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 11\r\nConnection: close\r\n\r\nBad Request";

/// Stand-in request text for a connection whose first read failed
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-case method
    pub method: String,
    /// Percent-decoded path without the query string
    pub path: String,
    pub query: QueryParams,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == HEADER_TERMINATOR.as_bytes())
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Read a request off the stream as text
///
/// Reading stops at end of headers plus `Content-Length` body bytes, at
/// `max_bytes`, at end of stream, or when a single read waits longer than
/// `read_timeout`. A failed or timed-out read keeps what was buffered; if
/// nothing was read the result is [`INVALID_REQUEST`]. Bytes that are not
/// valid UTF-8 are decoded lossily.
pub async fn read_request<S>(stream: &mut S, max_bytes: usize, read_timeout: Duration) -> String
where
    S: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < max_bytes {
        let read = tokio::time::timeout(read_timeout, stream.read(&mut chunk)).await;
        match read {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = header_end(&buf) {
                    let wanted = (end + HEADER_TERMINATOR.len())
                        .saturating_add(content_length(&buf[..end]))
                        .min(max_bytes);
                    if buf.len() >= wanted {
                        break;
                    }
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, buffered = buf.len(), "Read failed");
                break;
            }
            Err(_) => {
                debug!(buffered = buf.len(), "Read timed out");
                break;
            }
        }
    }

    if buf.is_empty() {
        return INVALID_REQUEST.to_string();
    }
    buf.truncate(max_bytes);
    match String::from_utf8(buf) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Percent-decode one component, keeping it raw when decoding fails
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Decode a query string pair by pair
pub fn parse_query(raw: &str) -> QueryParams {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Parse the request text produced by [`read_request`]
///
/// Fails with [`BridgeError::Parse`] when the request line is missing or
/// does not carry an `HTTP/` version token.
pub fn parse_request(text: &str) -> Result<Request> {
    let (head, body) = match text.find(HEADER_TERMINATOR) {
        Some(end) => (&text[..end], &text[end + HEADER_TERMINATOR.len()..]),
        None => (text, ""),
    };
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("").trim();

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(BridgeError::Parse(format!("Invalid request line: {:?}", request_line)));
    };
    if !version.starts_with("HTTP/") {
        return Err(BridgeError::Parse(format!("Missing HTTP version in {:?}", request_line)));
    }

    let base = Url::parse("http://localhost/")
        .map_err(|e| BridgeError::Internal(format!("Invalid base URL: {}", e)))?;
    let url = base
        .join(target)
        .map_err(|e| BridgeError::Parse(format!("Invalid request target {:?}: {}", target, e)))?;

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Ok(Request {
        method: method.to_ascii_uppercase(),
        path: urlencoding::decode(url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| url.path().to_string()),
        query: url.query().map(parse_query).unwrap_or_default(),
        headers,
        body: body.to_string(),
    })
}
