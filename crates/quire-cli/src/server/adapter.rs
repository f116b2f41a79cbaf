// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The boundary between HTTP engines and the kernel.
//!
//! Every adapter funnels requests through [`handle_request`], which turns an
//! `http::Request` into a [`Context`], runs the kernel and serializes the
//! resulting [`Response`]. Keeping this in one place is what makes the two
//! engines indistinguishable from the kernel's point of view.

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{stream, TryStreamExt};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame};
use quire::{parse_query, parse_request_body, BodyStream, Context, Kernel, Payload, RawRequest, Response};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use super::listener::RunningServer;
use super::static_files::mime_type;
use super::ServerError;

/// Response body type produced by serialization.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Size of the chunks files are streamed in.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Where to listen.
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// Port; 0 picks an ephemeral port.
    pub port: u16,
    /// Host or IP (default: "127.0.0.1").
    pub host: Option<String>,
}

impl ListenOptions {
    /// Listen on `port` at the default host.
    pub fn port(port: u16) -> Self {
        Self { port, host: None }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// The host, defaulting to loopback.
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("127.0.0.1")
    }
}

/// Per-adapter request handling limits.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Largest accepted request body; larger bodies get 413.
    pub max_body_bytes: usize,
    /// How long `stop()` waits for open connections before aborting them.
    pub shutdown_timeout: Duration,
    /// Permissive CORS headers (axum adapter).
    pub cors: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
            shutdown_timeout: Duration::from_secs(2),
            cors: false,
        }
    }
}

/// Binds an HTTP engine to a kernel.
pub trait Adapter: Send + Sync {
    /// Short engine name, reported in [`RawRequest::adapter`].
    fn name(&self) -> &'static str;

    /// Binds the listener and starts serving `kernel`.
    fn start<'a>(
        &'a self,
        kernel: Arc<Kernel>,
        options: &'a ListenOptions,
    ) -> BoxFuture<'a, Result<RunningServer, ServerError>>;
}

/// Peer address, attached to each request as an extension.
#[derive(Debug, Clone, Copy)]
pub struct RemoteAddr(pub SocketAddr);

/// Binds a TCP listener for `options`.
pub async fn bind(options: &ListenOptions) -> Result<TcpListener, ServerError> {
    let host = options.host();
    if host.is_empty() {
        return Err(ServerError::InvalidAddress(format!(":{}", options.port)));
    }

    let addr = format!("{}:{}", host, options.port);
    TcpListener::bind((host, options.port))
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Runs one request through the kernel.
pub async fn handle_request<B>(
    kernel: &Kernel,
    req: Request<B>,
    adapter: &'static str,
    config: &AdapterConfig,
) -> http::Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let is_head = req.method() == Method::HEAD;

    let mut ctx = match to_context(req, adapter, config.max_body_bytes).await {
        Ok(ctx) => ctx,
        Err(rejection) => return to_http_response(rejection, is_head).await,
    };

    let response = kernel.handle(&mut ctx).await;
    to_http_response(response, is_head).await
}

/// Normalizes an `http::Request` into a [`Context`].
///
/// Fails with a ready-made response when the body is too large or unreadable.
pub async fn to_context<B>(req: Request<B>, adapter: &'static str, max_body_bytes: usize) -> Result<Context, Response>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let query = parts.uri.query().map(parse_query).unwrap_or_default();
    let remote_addr = parts.extensions.get::<RemoteAddr>().map(|r| r.0);

    let body = if parts.method == Method::GET || parts.method == Method::HEAD {
        None
    } else {
        let collected = match Limited::new(body, max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(Response::text("Payload Too Large").with_status(413));
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read request body");
                return Err(Response::text("Bad Request").with_status(400));
            }
        };
        let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        parse_request_body(collected, content_type)
    };

    let mut ctx = Context::new(parts.method.as_str(), parts.uri.path())
        .with_query(query)
        .with_raw(RawRequest {
            version: parts.version,
            uri: parts.uri.clone(),
            remote_addr,
            adapter,
        })
        .with_headers(parts.headers);
    ctx.body = body;

    Ok(ctx)
}

/// Serializes a [`Response`] for the wire.
///
/// Handler headers win over the default content type. HEAD responses keep
/// their headers, including content-length, and drop the body.
pub async fn to_http_response(response: Response, is_head: bool) -> http::Response<ResponseBody> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let default_content_type = response.default_content_type();
    let mut headers = to_header_map(&response.headers);

    let body = match response.body {
        Payload::Empty => empty(),
        Payload::Json(value) => {
            let bytes = match serde_json::to_vec(&value) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize JSON response");
                    return plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", is_head);
                }
            };
            full(Bytes::from(bytes), &mut headers, is_head)
        }
        Payload::Text(text) | Payload::Html(text) => full(Bytes::from(text), &mut headers, is_head),
        Payload::Redirect(location) => {
            match HeaderValue::from_str(&location) {
                Ok(value) => {
                    headers.insert(LOCATION, value);
                }
                Err(_) => tracing::warn!(%location, "Dropping invalid redirect location"),
            }
            empty()
        }
        Payload::File(path) => match file_body(&path, &mut headers, is_head).await {
            Some(body) => body,
            None => return plain_text(StatusCode::NOT_FOUND, "Not Found", is_head),
        },
        Payload::Stream(stream) => {
            if is_head {
                empty()
            } else {
                stream_body(stream)
            }
        }
    };

    if let Some(content_type) = default_content_type {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    let mut http_response = http::Response::new(body);
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}

fn plain_text(status: StatusCode, text: &'static str, is_head: bool) -> http::Response<ResponseBody> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(quire::response::TEXT_CONTENT_TYPE));
    let body = full(Bytes::from_static(text.as_bytes()), &mut headers, is_head);

    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn to_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %key, "Dropping invalid response header"),
        }
    }
    map
}

fn empty() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

fn full(bytes: Bytes, headers: &mut HeaderMap, is_head: bool) -> ResponseBody {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    if is_head {
        return empty();
    }
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

async fn file_body(path: &Path, headers: &mut HeaderMap, is_head: bool) -> Option<ResponseBody> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot open response file");
            return None;
        }
    };

    let metadata = file.metadata().await.ok()?;
    if !metadata.is_file() {
        return None;
    }

    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime_type(path)));
    }

    if is_head {
        return Some(empty());
    }

    let chunks = stream::unfold(Some(file), |file| async move {
        let mut file = file?;
        let mut buf = vec![0u8; FILE_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Frame::data(Bytes::from(buf))), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });

    Some(StreamBody::new(chunks).boxed_unsync())
}

fn stream_body(stream: BodyStream) -> ResponseBody {
    match stream {
        BodyStream::Push(rx) => {
            let chunks = stream::unfold(rx, |mut rx| async move {
                let chunk = rx.recv().await?;
                Some((Ok::<_, io::Error>(Frame::data(chunk)), rx))
            });
            StreamBody::new(chunks).boxed_unsync()
        }
        BodyStream::Pull(chunks) => StreamBody::new(chunks.map_ok(Frame::data)).boxed_unsync(),
    }
}

/// Turns body errors into log lines; the peer already has the response head.
pub(crate) fn log_connection_error(err: hyper::Error, peer: SocketAddr) {
    if err.is_incomplete_message() || err.is_canceled() || err.is_closed() {
        tracing::debug!(%peer, error = %err, "Connection closed early");
    } else {
        tracing::debug!(%peer, error = %err, "Connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use quire::kernel::handler;
    use tempfile::TempDir;

    async fn body_bytes(response: http::Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn request(method: &str, uri: &str, body: &'static str, content_type: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("Content-Type", ct);
        }
        builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
    }

    #[tokio::test]
    async fn test_to_context() {
        let ctx = to_context(
            request("post", "/users/42?active=true&tag=a&tag=b", r#"{"name":"Ada"}"#, Some("application/json")),
            "native",
            1024,
        )
        .await
        .unwrap();

        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.path, "/users/42");
        assert_eq!(ctx.query_value("active"), Some("true"));
        assert_eq!(ctx.query["tag"].values(), vec!["a", "b"]);
        assert_eq!(ctx.header("content-type"), Some("application/json"));
        assert_eq!(ctx.body_json().unwrap()["name"], "Ada");
        assert_eq!(ctx.raw.adapter, "native");
    }

    #[tokio::test]
    async fn test_get_body_is_ignored() {
        let ctx = to_context(request("GET", "/", "ignored", Some("text/plain")), "native", 1024)
            .await
            .unwrap();
        assert!(ctx.body.is_none());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let rejection = to_context(request("POST", "/", "0123456789", None), "native", 4)
            .await
            .unwrap_err();
        assert_eq!(rejection.status, 413);
    }

    #[tokio::test]
    async fn test_default_content_type_and_override() {
        let response = to_http_response(Response::json(serde_json::json!({"ok": true})), false).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(body_bytes(response).await, Bytes::from_static(br#"{"ok":true}"#));

        let response = to_http_response(
            Response::json(serde_json::json!({})).with_header("Content-Type", "application/vnd.api+json"),
            false,
        )
        .await;
        assert_eq!(response.headers()[CONTENT_TYPE], "application/vnd.api+json");
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_head_keeps_length_drops_body() {
        let response = to_http_response(Response::text("hello"), true).await;
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_redirect() {
        let response = to_http_response(Response::redirect("/login").with_status(301), false).await;
        assert_eq!(response.status(), 301);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_file_streams_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.css");
        let content = "a".repeat(FILE_CHUNK_SIZE * 2 + 10);
        std::fs::write(&path, &content).unwrap();

        let response = to_http_response(Response::file(&path), false).await;
        assert_eq!(response.headers()[CONTENT_TYPE], "text/css; charset=utf-8");
        assert_eq!(response.headers()[CONTENT_LENGTH], content.len().to_string().as_str());

        let mut body = response.into_body();
        let mut frames = 0;
        let mut total = 0;
        while let Some(frame) = body.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= FILE_CHUNK_SIZE);
            total += data.len();
            frames += 1;
        }
        assert_eq!(total, content.len());
        assert!(frames >= 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let response = to_http_response(Response::file("/definitely/not/here.txt"), false).await;
        assert_eq!(response.status(), 404);
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"Not Found"));
    }

    #[tokio::test]
    async fn test_push_stream() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        tokio::spawn(async move {
            for chunk in ["one ", "two ", "three"] {
                tx.send(Bytes::from_static(chunk.as_bytes())).await.unwrap();
            }
        });

        let response = to_http_response(Response::stream(rx), false).await;
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"one two three"));
    }

    #[tokio::test]
    async fn test_pull_stream() {
        let chunks = futures_util::stream::iter(vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))]);
        let response = to_http_response(Response::stream_from(chunks.boxed()), false).await;
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"ab"));
    }

    #[tokio::test]
    async fn test_handle_request_runs_kernel() {
        let mut kernel = Kernel::new();
        kernel.add_route(
            quire::Route::new(
                "GET",
                "/users/:id",
                handler(|ctx: &Context| {
                    Box::pin(async move {
                        Ok(Some(ctx.json(serde_json::json!({
                            "id": ctx.param("id"),
                            "active": ctx.query_value("active"),
                        }))))
                    })
                }),
                None,
            )
            .unwrap(),
        );

        let response = handle_request(
            &kernel,
            request("GET", "/users/42?active=true", "", None),
            "native",
            &AdapterConfig::default(),
        )
        .await;
        assert_eq!(response.status(), 200);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json, serde_json::json!({"id": "42", "active": "true"}));
    }
}
