// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Page routes and the handler that serves them from a [`PageCache`](super::PageCache).

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;

use super::cache::PageCache;
use super::instance::PageSource;
use super::key::CacheKey;
use crate::body::Query;
use crate::context::Context;
use crate::kernel::{handler, Handler};
use crate::matcher::Params;
use crate::reactive::{supplier, DataCell, Dependency};
use crate::response::Response;

/// What a data loader sees about the request it loads for.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Request path
    pub path: String,
    /// Route parameters
    pub params: Params,
    /// Query parameters
    pub query: Query,
}

impl PageRequest {
    /// Captures the parts of `ctx` that identify a page.
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            path: ctx.path.clone(),
            params: ctx.params.clone(),
            query: ctx.query.clone(),
        }
    }
}

/// Loads route data for one page.
pub type Loader = Arc<dyn Fn(PageRequest) -> BoxFuture<'static, anyhow::Result<JsonValue>> + Send + Sync>;

/// A page route: template, optional data loader and the signals it depends on.
#[derive(Clone)]
pub struct PageRoute {
    template: PathBuf,
    loader: Option<Loader>,
    deps: Vec<Arc<dyn Dependency>>,
}

impl PageRoute {
    /// A page rendering `template` with global data only.
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            loader: None,
            deps: Vec::new(),
        }
    }

    /// Sets an async data loader.
    pub fn with_loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(PageRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<JsonValue>> + Send + 'static,
    {
        self.loader = Some(Arc::new(move |request| Box::pin(loader(request)) as BoxFuture<'static, _>));
        self
    }

    /// Uses fixed route data.
    pub fn with_data(self, data: JsonValue) -> Self {
        self.with_loader(move |_request| {
            let data = data.clone();
            async move { Ok(data) }
        })
    }

    /// Re-renders cached pages whenever `dep` changes.
    pub fn depends_on(mut self, dep: Arc<dyn Dependency>) -> Self {
        self.deps.push(dep);
        self
    }

    /// Template file rendered for this route.
    pub fn template(&self) -> &std::path::Path {
        &self.template
    }

    fn source(&self, request: PageRequest) -> PageSource {
        let data = match &self.loader {
            Some(loader) => {
                let loader = loader.clone();
                DataCell::new(Arc::new(move || loader(request.clone())), self.deps.clone())
            }
            None => DataCell::new(supplier(|| async { Ok(JsonValue::Null) }), self.deps.clone()),
        };

        PageSource {
            template: self.template.clone(),
            data,
        }
    }
}

impl fmt::Debug for PageRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRoute")
            .field("template", &self.template)
            .field("loader", &self.loader.is_some())
            .field("deps", &self.deps.len())
            .finish()
    }
}

/// Builds a kernel handler serving `route` through `cache`.
pub fn page_handler(cache: Arc<PageCache>, route: PageRoute) -> Handler {
    handler(move |ctx: &Context| {
        let cache = cache.clone();
        let route = route.clone();
        Box::pin(async move {
            let key = CacheKey::from_context(ctx);
            let request = PageRequest::from_context(ctx);
            let page = cache.get_or_create(key, move |_key: &CacheKey| route.source(request));
            let html = page.compile().await?;
            Ok(Some(Response::html(html)))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, Route};
    use crate::reactive::Signal;
    use crate::render::RenderEnv;
    use crate::response::Payload;
    use serde_json::json;
    use tempfile::TempDir;

    fn html(response: &Response) -> &str {
        match &response.body {
            Payload::Html(s) => s,
            other => panic!("Expected html, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_page_route_end_to_end() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("post.html");
        std::fs::write(&template, "<h1>{{ title }}</h1><p>{{ slug }} by {{ author }}</p>").unwrap();

        let cache = Arc::new(PageCache::new(
            8,
            RenderEnv::new(dir.path().join("out")).with_global_data(json!({"author": "site"})),
        ));
        let route = PageRoute::new(&template).with_loader(|request: PageRequest| async move {
            let slug = request.params.get("slug").cloned().unwrap_or_default();
            Ok(json!({ "title": slug.to_uppercase(), "slug": slug }))
        });

        let mut kernel = Kernel::new();
        kernel.add_route(Route::new("GET", "/posts/:slug", page_handler(cache.clone(), route), None).unwrap());

        let response = kernel.handle(&mut Context::new("GET", "/posts/hello")).await;
        assert_eq!(response.status, 200);
        assert_eq!(html(&response), "<h1>HELLO</h1><p>hello by site</p>");
        assert!(dir.path().join("out/posts/hello.html").exists());
        assert_eq!(cache.len(), 1);

        kernel.handle(&mut Context::new("GET", "/posts/other")).await;
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_dependency_change_rerenders() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("count.html");
        std::fs::write(&template, "{{ count }}").unwrap();

        let counter = Arc::new(Signal::new(1));
        let source = counter.clone();
        let route = PageRoute::new(&template)
            .with_loader(move |_request: PageRequest| {
                let source = source.clone();
                async move { Ok(json!({ "count": source.get() })) }
            })
            .depends_on(counter.clone());

        let cache = Arc::new(PageCache::new(8, RenderEnv::new(dir.path().join("out"))));
        let mut kernel = Kernel::new();
        kernel.add_route(Route::new("GET", "/count", page_handler(cache, route), None).unwrap());

        let response = kernel.handle(&mut Context::new("GET", "/count")).await;
        assert_eq!(html(&response), "1");

        counter.set(2);
        let response = kernel.handle(&mut Context::new("GET", "/count")).await;
        assert_eq!(html(&response), "2");
    }

    #[tokio::test]
    async fn test_missing_template_is_handler_error() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(PageCache::new(8, RenderEnv::new(dir.path().join("out"))));
        let mut kernel = Kernel::new();
        kernel.add_route(
            Route::new("GET", "/", page_handler(cache, PageRoute::new(dir.path().join("missing.html"))), None).unwrap(),
        );

        let response = kernel.handle(&mut Context::new("GET", "/")).await;
        assert_eq!(response.status, 500);
    }
}
