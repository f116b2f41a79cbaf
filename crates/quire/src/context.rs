// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Per-request context.
//!
//! A [`Context`] is the normalized view of one inbound request. Adapters build
//! it, the kernel fills in [`Context::params`] after matching, and handlers
//! read it and use its builder methods to produce a [`Response`].
//!
//! # Example
//!
//! ```rust
//! use quire::Context;
//!
//! let ctx = Context::new("GET", "/search").with_query_string("q=rust&page=1");
//! assert_eq!(ctx.query_value("q"), Some("rust"));
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, Uri, Version};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::body::{parse_query, Query, RequestBody};
use crate::matcher::Params;
use crate::response::Response;

/// Engine-level details of the request the context was built from.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// HTTP version
    pub version: Version,
    /// The full request URI
    pub uri: Uri,
    /// Peer address, when the adapter knows it
    pub remote_addr: Option<SocketAddr>,
    /// Name of the adapter that accepted the request
    pub adapter: &'static str,
}

impl Default for RawRequest {
    fn default() -> Self {
        Self {
            version: Version::HTTP_11,
            uri: Uri::from_static("/"),
            remote_addr: None,
            adapter: "none",
        }
    }
}

/// The normalized per-request input bundle.
#[derive(Debug, Clone)]
pub struct Context {
    /// Upper-cased HTTP method (e.g., "GET")
    pub method: String,
    /// The request path, without query string
    pub path: String,
    /// Parsed query parameters
    pub query: Query,
    /// Request headers (case-insensitive)
    pub headers: HeaderMap,
    /// Parsed body; `None` for GET/HEAD and empty bodies
    pub body: Option<RequestBody>,
    /// Route parameters, filled in by the kernel after matching
    pub params: Params,
    /// Engine-level request details
    pub raw: RawRequest,
}

impl Context {
    /// Creates a context with the given method and path.
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
            query: Query::new(),
            headers: HeaderMap::new(),
            body: None,
            params: Params::new(),
            raw: RawRequest::default(),
        }
    }

    /// Sets the parsed query.
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// Parses and sets the query from a raw query string.
    pub fn with_query_string(self, query: &str) -> Self {
        self.with_query(parse_query(query))
    }

    /// Sets the request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the parsed body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the raw request details.
    pub fn with_raw(mut self, raw: RawRequest) -> Self {
        self.raw = raw;
        self
    }

    /// Returns a route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the first value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(|v| v.first())
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the body as JSON, if it was sent as JSON.
    pub fn body_json(&self) -> Option<&JsonValue> {
        self.body.as_ref().and_then(RequestBody::as_json)
    }

    /// Returns true for HEAD requests.
    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// Builds a JSON response.
    pub fn json(&self, body: JsonValue) -> Response {
        Response::json(body)
    }

    /// Builds a plain text response.
    pub fn text(&self, body: impl Into<String>) -> Response {
        Response::text(body)
    }

    /// Builds an HTML response.
    pub fn html(&self, body: impl Into<String>) -> Response {
        Response::html(body)
    }

    /// Builds a file response.
    pub fn file(&self, path: impl Into<PathBuf>) -> Response {
        Response::file(path)
    }

    /// Builds a redirect response.
    pub fn redirect(&self, location: impl Into<String>) -> Response {
        Response::redirect(location)
    }

    /// Builds a channel-fed streaming response.
    pub fn stream(&self, rx: mpsc::Receiver<Bytes>) -> Response {
        Response::stream(rx)
    }

    /// Builds a streaming response pulled from `stream`.
    pub fn stream_from(&self, stream: BoxStream<'static, io::Result<Bytes>>) -> Response {
        Response::stream_from(stream)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("GET", "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::QueryValue;

    #[test]
    fn test_new_context() {
        let ctx = Context::new("get", "/blog/hello");
        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.path, "/blog/hello");
        assert!(ctx.params.is_empty());
        assert!(ctx.body.is_none());
    }

    #[test]
    fn test_query_helpers() {
        let ctx = Context::new("GET", "/search").with_query_string("q=rust&tag=a&tag=b");
        assert_eq!(ctx.query_value("q"), Some("rust"));
        assert_eq!(ctx.query_value("tag"), Some("a"));
        assert_eq!(
            ctx.query.get("tag"),
            Some(&QueryValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(ctx.query_value("missing"), None);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let ctx = Context::new("POST", "/api").with_headers(headers);
        assert_eq!(ctx.header("Content-Type"), Some("application/json"));
        assert_eq!(ctx.content_type(), Some("application/json"));
    }

    #[test]
    fn test_response_builders() {
        let ctx = Context::default();
        assert_eq!(ctx.json(serde_json::json!({})).status, 200);
        assert_eq!(ctx.redirect("/x").status, 302);
        assert_eq!(ctx.text("hi").with_status(418).status, 418);
    }
}
