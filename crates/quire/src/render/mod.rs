// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! On-demand page rendering with a bounded instance cache.
//!
//! Each distinct request (path, route params, query) gets one
//! [`PageInstance`] in a [`PageCache`]. An instance renders its template with
//! data from a [`DataCell`](crate::reactive::DataCell), persists the HTML under
//! the output directory, and serves the persisted file until something
//! changes:
//!
//! - a dependency of its data cell moves to a new generation,
//! - its template watch fires (development mode),
//! - or the output file disappears.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quire::render::{page_handler, PageCache, PageRoute, RenderEnv};
//! use quire::Kernel;
//!
//! # fn demo() -> quire::Result<()> {
//! let cache = Arc::new(PageCache::new(256, RenderEnv::new("dist")));
//! let route = PageRoute::new("templates/post.html")
//!     .with_data(serde_json::json!({ "title": "Hello" }));
//!
//! let mut kernel = Kernel::new();
//! kernel.add_route(quire::Route::new("GET", "/posts/:slug", page_handler(cache, route), None)?);
//! # Ok(())
//! # }
//! ```

mod cache;
mod instance;
mod key;
mod page;
mod template;
mod watch;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use cache::{PageCache, DEFAULT_CACHE_SIZE};
pub use instance::{output_path_for, PageInstance, PageSource, RenderEnv};
pub use key::CacheKey;
pub use page::{page_handler, Loader, PageRequest, PageRoute};
pub use template::{inject_livereload_script, SimpleRenderer, TemplateRenderer, LIVERELOAD_PATH};
pub use watch::{ChangeCallback, TemplateWatch, WatchHandle};

/// Errors raised while rendering a page.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The route's template file does not exist.
    #[error("Template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    /// The template could not be rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// The data loader failed.
    #[error("Data loader failed: {0:#}")]
    Data(anyhow::Error),

    /// Reading the template or persisting the output failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
