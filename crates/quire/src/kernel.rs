// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The request kernel: route table, lifecycle hooks and static fallback.
//!
//! A [`Kernel`] resolves one [`Context`] to one [`Response`]:
//!
//! ```text
//! on_request ─┬─ Some(resp) ──────────────────────────────┐
//!             └─ match route ─┬─ none → fallback / 404 ───┤
//!                             └─ pre_handler ─┬─ Some ────┤
//!                                             └─ handler ─┤
//!                  any Err / panic → on_error / 500 ──────┤
//!                                                         └─ on_send → returned
//! ```
//!
//! Routes are matched first-hit in registration order. Once a kernel is
//! shared behind an `Arc` it is read-only, so requests never contend on it.
//!
//! # Example
//!
//! ```rust
//! use quire::{Context, Kernel};
//!
//! # async fn demo() -> quire::Result<()> {
//! let mut kernel = Kernel::new();
//! kernel.add("GET", "/users/:id", |ctx: &Context| {
//!     Box::pin(async move {
//!         Ok(Some(ctx.json(serde_json::json!({ "id": ctx.param("id") }))))
//!     })
//! })?;
//!
//! let mut ctx = Context::new("GET", "/users/42");
//! let response = kernel.handle(&mut ctx).await;
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::context::Context;
use crate::error::{QuireError, Result};
use crate::matcher::{Params, PathMatcher};
use crate::response::Response;

/// What handlers and short-circuiting hooks return.
///
/// `Ok(None)` means "no response": for hooks the pipeline continues, for a
/// route handler the request ends with an empty 204.
pub type HandlerResult = anyhow::Result<Option<Response>>;

/// A route handler (also the shape of `on_request` and the static fallback).
pub type Handler = Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// The `pre_handler` hook, called with the matched route.
pub type PreHandlerHook =
    Arc<dyn for<'a> Fn(&'a Context, &'a Route) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// The `on_send` hook; observes the final response.
pub type OnSendHook = Arc<dyn for<'a> Fn(&'a Context, &'a Response) -> BoxFuture<'a, ()> + Send + Sync>;

/// The `on_error` hook; may turn an error into a response.
pub type OnErrorHook =
    Arc<dyn for<'a> Fn(&'a Context, &'a anyhow::Error) -> BoxFuture<'a, Option<Response>> + Send + Sync>;

/// Wraps a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The four optional lifecycle hooks.
///
/// Built with chained setters and merged into a kernel with [`Kernel::hooks`];
/// only the hooks that are set replace the kernel's current ones.
#[derive(Clone, Default)]
pub struct HookSet {
    on_request: Option<Handler>,
    pre_handler: Option<PreHandlerHook>,
    on_send: Option<OnSendHook>,
    on_error: Option<OnErrorHook>,
}

impl HookSet {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before matching. `Some(response)` short-circuits the request.
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(f));
        self
    }

    /// Runs after matching, before the handler. `Some(response)` short-circuits.
    pub fn pre_handler<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a Context, &'a Route) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.pre_handler = Some(Arc::new(f));
        self
    }

    /// Runs exactly once per request with the final response.
    pub fn on_send<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a Context, &'a Response) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Runs when a hook or handler fails. `None` falls back to a generic 500.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a Context, &'a anyhow::Error) -> BoxFuture<'a, Option<Response>>
            + Send
            + Sync
            + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Overlays the hooks set in `other` onto `self`.
    pub fn merge(&mut self, other: HookSet) {
        if other.on_request.is_some() {
            self.on_request = other.on_request;
        }
        if other.pre_handler.is_some() {
            self.pre_handler = other.pre_handler;
        }
        if other.on_send.is_some() {
            self.on_send = other.on_send;
        }
        if other.on_error.is_some() {
            self.on_error = other.on_error;
        }
    }

    /// Returns true if no hook is set.
    pub fn is_empty(&self) -> bool {
        self.on_request.is_none()
            && self.pre_handler.is_none()
            && self.on_send.is_none()
            && self.on_error.is_none()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("on_request", &self.on_request.is_some())
            .field("pre_handler", &self.pre_handler.is_some())
            .field("on_send", &self.on_send.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// A registered route with its compiled matcher.
pub struct Route {
    method: String,
    matcher: PathMatcher,
    handler: Handler,
    metadata: Option<JsonValue>,
}

impl Route {
    /// Compiles a route. The method is upper-cased.
    pub fn new(method: &str, path: &str, handler: Handler, metadata: Option<JsonValue>) -> Result<Self> {
        let method = method.to_ascii_uppercase();
        if http::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(QuireError::InvalidMethod(method));
        }

        Ok(Self {
            method,
            matcher: PathMatcher::compile(path)?,
            handler,
            metadata,
        })
    }

    /// The upper-cased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The path pattern as registered.
    pub fn path(&self) -> &str {
        self.matcher.pattern()
    }

    /// Metadata attached at registration.
    pub fn metadata(&self) -> Option<&JsonValue> {
        self.metadata.as_ref()
    }

    /// Parameter names captured by the pattern.
    pub fn param_names(&self) -> Vec<String> {
        self.matcher.param_names()
    }

    /// The handler, for re-registration into another kernel.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Matches method and path.
    pub fn matches(&self, method: &str, path: &str) -> Option<Params> {
        if self.method != method {
            return None;
        }
        self.matcher.matches(path)
    }

    /// A serializable summary of this route.
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            method: self.method.clone(),
            path: self.path().to_string(),
            param_names: self.param_names(),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Route listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    /// HTTP method
    pub method: String,
    /// Path pattern
    pub path: String,
    /// Captured parameter names
    pub param_names: Vec<String>,
}

/// Route table plus hooks; turns contexts into responses.
#[derive(Default)]
pub struct Kernel {
    routes: Vec<Route>,
    hooks: HookSet,
    fallback: Option<Handler>,
}

impl Kernel {
    /// Creates an empty kernel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route. Earlier registrations win on overlapping patterns.
    pub fn add<F>(&mut self, method: &str, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add_route(Route::new(method, path, Arc::new(handler), None)?);
        Ok(self)
    }

    /// Registers a route carrying metadata, visible to `pre_handler`.
    pub fn add_with_meta<F>(&mut self, method: &str, path: &str, handler: F, metadata: JsonValue) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add_route(Route::new(method, path, Arc::new(handler), Some(metadata))?);
        Ok(self)
    }

    /// Appends an already compiled route.
    pub fn add_route(&mut self, route: Route) -> &mut Self {
        tracing::debug!(method = %route.method(), path = %route.path(), "Route registered");
        self.routes.push(route);
        self
    }

    /// Merges hooks into the current hook set.
    pub fn hooks(&mut self, hooks: HookSet) -> &mut Self {
        self.hooks.merge(hooks);
        self
    }

    /// Sets the handler used when no route matches.
    ///
    /// A fallback response with status 404 is replaced by the generic 404.
    pub fn set_fallback(&mut self, fallback: Handler) -> &mut Self {
        self.fallback = Some(fallback);
        self
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Summaries of all registered routes.
    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(Route::summary).collect()
    }

    /// Finds the first route matching method and path.
    ///
    /// A HEAD request with no HEAD route is answered by the matching GET
    /// route; the adapter drops the body.
    pub fn find(&self, method: &str, path: &str) -> Option<(&Route, Params)> {
        self.find_exact(method, path).or_else(|| match method {
            "HEAD" => self.find_exact("GET", path),
            _ => None,
        })
    }

    fn find_exact(&self, method: &str, path: &str) -> Option<(&Route, Params)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(method, path).map(|params| (route, params)))
    }

    /// Resolves a context to its final response.
    ///
    /// Never fails: errors and panics from hooks or handlers are routed
    /// through `on_error`, and `on_send` always runs once before returning.
    pub async fn handle(&self, ctx: &mut Context) -> Response {
        let outcome = AssertUnwindSafe(self.run(ctx)).catch_unwind().await;
        let result = outcome.unwrap_or_else(|panic| Err(panic_error(panic)));
        let ctx: &Context = ctx;

        let response = match result {
            Ok(response) => response,
            Err(err) => self.recover(ctx, err).await,
        };

        if let Some(on_send) = &self.hooks.on_send {
            if AssertUnwindSafe(on_send(ctx, &response)).catch_unwind().await.is_err() {
                tracing::warn!(path = %ctx.path, "on_send hook panicked");
            }
        }

        tracing::debug!(
            method = %ctx.method,
            path = %ctx.path,
            status = response.status,
            "Request handled"
        );

        response
    }

    async fn run(&self, ctx: &mut Context) -> anyhow::Result<Response> {
        if let Some(on_request) = &self.hooks.on_request {
            if let Some(response) = on_request(&*ctx).await? {
                return Ok(response);
            }
        }

        let Some((route, params)) = self.find(&ctx.method, &ctx.path) else {
            return self.run_fallback(ctx).await;
        };
        ctx.params = params;

        if let Some(pre_handler) = &self.hooks.pre_handler {
            if let Some(response) = pre_handler(&*ctx, route).await? {
                return Ok(response);
            }
        }

        let response = (route.handler)(&*ctx).await?;
        Ok(response.unwrap_or_else(Response::no_content))
    }

    async fn run_fallback(&self, ctx: &Context) -> anyhow::Result<Response> {
        let Some(fallback) = &self.fallback else {
            return Ok(Response::not_found());
        };

        match fallback(ctx).await? {
            Some(response) if response.status != 404 => Ok(response),
            _ => Ok(Response::not_found()),
        }
    }

    async fn recover(&self, ctx: &Context, err: anyhow::Error) -> Response {
        tracing::warn!(
            method = %ctx.method,
            path = %ctx.path,
            error = %format!("{err:#}"),
            "Request failed"
        );

        let Some(on_error) = &self.hooks.on_error else {
            return Response::internal_error();
        };

        match AssertUnwindSafe(on_error(ctx, &err)).catch_unwind().await {
            Ok(Some(response)) => response,
            Ok(None) => Response::internal_error(),
            Err(_) => {
                tracing::warn!(path = %ctx.path, "on_error hook panicked");
                Response::internal_error()
            }
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("routes", &self.routes)
            .field("hooks", &self.hooks)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    anyhow::anyhow!("handler panicked: {message}")
}
