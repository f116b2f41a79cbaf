// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Declarative response descriptors.
//!
//! Handlers return a [`Response`] describing what to send; adapters are the
//! only place where it is turned into bytes on the wire.
//!
//! # Example
//!
//! ```rust
//! use quire::Response;
//!
//! // HTML response
//! let html = Response::html("<h1>Hello</h1>");
//!
//! // JSON response with a custom status
//! let created = Response::json(serde_json::json!({"id": 7})).with_status(201);
//!
//! // Redirect
//! let redirect = Response::redirect("/login");
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// Default content type for JSON payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Default content type for text payloads.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Default content type for HTML payloads.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// A streamed response body.
pub enum BodyStream {
    /// Chunks pushed by a producer through a bounded channel.
    ///
    /// The producer waits whenever the channel is full, so it never runs
    /// ahead of the peer by more than the channel capacity.
    Push(mpsc::Receiver<Bytes>),

    /// Chunks pulled from an asynchronous sequence as the peer drains.
    Pull(BoxStream<'static, io::Result<Bytes>>),
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyStream::Push(_) => f.write_str("BodyStream::Push"),
            BodyStream::Pull(_) => f.write_str("BodyStream::Pull"),
        }
    }
}

/// The payload of a response, one variant per kind.
#[derive(Debug)]
pub enum Payload {
    /// No body
    Empty,
    /// JSON body
    Json(JsonValue),
    /// Plain text body
    Text(String),
    /// HTML body
    Html(String),
    /// A file streamed from disk
    File(PathBuf),
    /// A streamed body
    Stream(BodyStream),
    /// A redirect to the given location
    Redirect(String),
}

/// Response kind, mirroring the [`Payload`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// No body
    Empty,
    /// JSON body
    Json,
    /// Plain text body
    Text,
    /// HTML body
    Html,
    /// File body
    File,
    /// Streamed body
    Stream,
    /// Redirect
    Redirect,
}

/// A response produced by a handler or hook.
#[derive(Debug)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Headers with lower-cased keys, in insertion order
    pub headers: Vec<(String, String)>,
    /// The body
    pub body: Payload,
}

impl Response {
    fn with_payload(status: u16, body: Payload) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Creates a 200 JSON response.
    pub fn json(body: JsonValue) -> Self {
        Self::with_payload(200, Payload::Json(body))
    }

    /// Creates a 200 plain text response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_payload(200, Payload::Text(body.into()))
    }

    /// Creates a 200 HTML response.
    pub fn html(body: impl Into<String>) -> Self {
        Self::with_payload(200, Payload::Html(body.into()))
    }

    /// Creates a 200 response streaming the file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_payload(200, Payload::File(path.into()))
    }

    /// Creates a 200 response streamed from a channel.
    pub fn stream(rx: mpsc::Receiver<Bytes>) -> Self {
        Self::with_payload(200, Payload::Stream(BodyStream::Push(rx)))
    }

    /// Creates a 200 response pulled from an asynchronous sequence.
    pub fn stream_from(stream: BoxStream<'static, io::Result<Bytes>>) -> Self {
        Self::with_payload(200, Payload::Stream(BodyStream::Pull(stream)))
    }

    /// Creates a redirect response (HTTP 302 by default).
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::with_payload(302, Payload::Redirect(location.into()))
    }

    /// Creates an empty 204 No Content response.
    pub fn no_content() -> Self {
        Self::with_payload(204, Payload::Empty)
    }

    /// Creates the generic 404 Not Found text response.
    pub fn not_found() -> Self {
        Self::text("Not Found").with_status(404)
    }

    /// Creates the generic 500 Internal Server Error text response.
    pub fn internal_error() -> Self {
        Self::text("Internal Server Error").with_status(500)
    }

    /// Sets the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Adds a header. The key is lower-cased; an existing value is replaced.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Sets a header in place. The key is lower-cased; an existing value is replaced.
    pub fn set_header(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    /// Returns a header value by (case-insensitive) name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the response kind.
    pub fn kind(&self) -> ResponseKind {
        match self.body {
            Payload::Empty => ResponseKind::Empty,
            Payload::Json(_) => ResponseKind::Json,
            Payload::Text(_) => ResponseKind::Text,
            Payload::Html(_) => ResponseKind::Html,
            Payload::File(_) => ResponseKind::File,
            Payload::Stream(_) => ResponseKind::Stream,
            Payload::Redirect(_) => ResponseKind::Redirect,
        }
    }

    /// Default content type for this kind, if it has one.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self.body {
            Payload::Json(_) => Some(JSON_CONTENT_TYPE),
            Payload::Text(_) => Some(TEXT_CONTENT_TYPE),
            Payload::Html(_) => Some(HTML_CONTENT_TYPE),
            _ => None,
        }
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true if this is an error response (4xx or 5xx).
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::no_content()
    }
}
