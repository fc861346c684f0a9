//! HTTP/1.1 surface
//!
//! One request per connection: bytes are read until the headers and
//! `Content-Length` body are buffered, the request line is parsed, an
//! ordered route table picks a handler, and the response is written with a
//! byte-exact `Content-Length` before the socket is closed.

mod handlers;
mod request;
mod response;
pub mod router;
mod server;

pub use handlers::{handle, AppState, Reply};
pub use request::{parse_query, parse_request, read_request, Request, BAD_REQUEST_RESPONSE, INVALID_REQUEST};
pub use response::{
    reason_phrase, HttpResponse, JSON_CONTENT_TYPE, NOT_FOUND_RESPONSE, TEXT_CONTENT_TYPE,
};
pub use router::{Endpoint, PathParams, Route};
pub use server::HttpServer;
