// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! # quire
//!
//! The request-serving kernel behind the `quire` build-and-serve tool.
//!
//! quire resolves normalized requests to declarative responses. HTTP engines
//! live outside this crate: an adapter turns wire requests into a
//! [`Context`], hands it to a [`Kernel`], and writes back the [`Response`].
//!
//! ## Features
//!
//! - `:param` and trailing `*` route patterns, first match wins
//! - Four lifecycle hooks with explicit short-circuiting
//! - Panics and errors in handlers become responses, never crashes
//! - On-demand page rendering with a bounded cache and reactive invalidation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quire::{Context, HookSet, Kernel, Response};
//!
//! let mut kernel = Kernel::new();
//! kernel.add("GET", "/hello/:name", |ctx: &Context| {
//!     Box::pin(async move {
//!         Ok(Some(Response::text(format!("Hello, {}!", ctx.param("name").unwrap_or("world")))))
//!     })
//! })?;
//!
//! kernel.hooks(HookSet::new().on_send(|ctx: &Context, resp: &Response| {
//!     let line = format!("{} {} {}", ctx.method, ctx.path, resp.status);
//!     Box::pin(async move { tracing::info!("{line}") })
//! }));
//!
//! let response = kernel.handle(&mut Context::new("GET", "/hello/ada")).await;
//! ```

/// Query string and request body parsing.
pub mod body;
/// Per-request context.
pub mod context;
/// Error types.
pub mod error;
/// Route table, hooks and the request pipeline.
pub mod kernel;
/// Route pattern matching.
pub mod matcher;
/// Generation-counter dependency tracking.
pub mod reactive;
/// Page rendering and the page-instance cache.
pub mod render;
/// Response descriptors.
pub mod response;

pub use body::{parse_query, parse_request_body, Query, QueryValue, RequestBody};
pub use context::{Context, RawRequest};
pub use error::{QuireError, Result};
pub use kernel::{handler, Handler, HandlerResult, HookSet, Kernel, Route, RouteSummary};
pub use matcher::{Params, PathMatcher, WILDCARD_PARAM};
pub use reactive::{supplier, DataCell, Dependency, Signal};
pub use response::{BodyStream, Payload, Response, ResponseKind};

/// Boxed future returned by handlers and hooks.
pub use futures_util::future::BoxFuture;
