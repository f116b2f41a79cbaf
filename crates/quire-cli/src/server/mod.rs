// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server orchestration.
//!
//! A [`Server`] owns the registered routes and hooks and builds a fresh
//! [`Kernel`] on every `listen`, so a stopped server can be started again
//! without duplicating routes.
//!
//! # Components
//!
//! - `adapter`: request/response conversion shared by every engine
//! - `native`, `axum_adapter`: the two engines
//! - `listener`: tracked accept loop with graceful shutdown
//! - `livereload`: server-sent-events reload channel
//! - `static_files`: output directory fallback
//! - `system`: `/health` and `/_info`

/// Request/response conversion and the adapter trait.
pub mod adapter;
/// axum engine.
pub mod axum_adapter;
/// Tracked accept loop.
pub mod listener;
/// Live reload over server-sent events.
pub mod livereload;
/// hyper engine.
pub mod native;
/// Static file fallback.
pub mod static_files;
/// Built-in routes.
pub mod system;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quire::render::{page_handler, PageCache, PageRoute, RenderEnv, DEFAULT_CACHE_SIZE, LIVERELOAD_PATH};
use quire::{BoxFuture, Context, HandlerResult, HookSet, Kernel, QuireError, Route, RouteSummary};
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{AdapterKind, Config};

pub use adapter::{Adapter, AdapterConfig, ListenOptions, RemoteAddr};
pub use axum_adapter::AxumAdapter;
pub use listener::RunningServer;
pub use livereload::LiveReload;
pub use native::NativeAdapter;
pub use static_files::static_fallback;

/// Errors raised while starting or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: io::Error,
    },

    /// `listen` was called on a running server.
    #[error("Server is already running")]
    AlreadyRunning,

    /// The listen address is malformed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A route could not be registered.
    #[error(transparent)]
    Kernel(#[from] QuireError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Development or production behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Live reload, template watches.
    Development,
    /// No watches, no reload channel.
    #[default]
    Production,
}

impl Mode {
    /// Lower-case name, as reported by `/health` and `/_info`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    /// Returns true in development mode.
    pub fn is_development(&self) -> bool {
        matches!(self, Mode::Development)
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Reported by `/_info`.
    pub name: String,
    /// Reported by `/_info`.
    pub version: String,
    /// Development or production.
    pub mode: Mode,
    /// Served by the static fallback; also where pages are persisted.
    pub output_dir: Option<PathBuf>,
    /// HTTP engine.
    pub adapter: AdapterKind,
    /// Grace period for open connections on stop.
    pub shutdown_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Permissive CORS (axum only).
    pub cors: bool,
    /// Live-reload coalescing window.
    pub reload_window: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "quire".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: Mode::default(),
            output_dir: None,
            adapter: AdapterKind::default(),
            shutdown_timeout: Duration::from_secs(2),
            max_body_bytes: 2 * 1024 * 1024,
            cors: false,
            reload_window: Duration::from_millis(100),
        }
    }
}

impl ServerOptions {
    /// Options derived from `quire.toml`.
    pub fn from_config(config: &Config, mode: Mode) -> Self {
        Self {
            name: config.project.name.clone(),
            version: config.project.version.clone(),
            mode,
            output_dir: Some(PathBuf::from(&config.build.output_dir)),
            adapter: config.server.adapter,
            shutdown_timeout: config.server.shutdown_timeout(),
            max_body_bytes: config.server.max_body_bytes,
            cors: config.server.cors,
            reload_window: config.pages.reload_window(),
        }
    }

    fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            max_body_bytes: self.max_body_bytes,
            shutdown_timeout: self.shutdown_timeout,
            cors: self.cors,
        }
    }
}

struct Running {
    server: RunningServer,
    sse_shutdown: watch::Sender<bool>,
}

/// Route registry plus a running adapter.
pub struct Server {
    options: ServerOptions,
    adapter: Box<dyn Adapter>,
    routes: Vec<Route>,
    hooks: HookSet,
    livereload: Option<LiveReload>,
    page_cache: Option<Arc<PageCache>>,
    running: Option<Running>,
}

impl Server {
    /// Creates a server using the adapter named in `options`.
    pub fn new(options: ServerOptions) -> Self {
        let config = options.adapter_config();
        let adapter: Box<dyn Adapter> = match options.adapter {
            AdapterKind::Native => Box::new(NativeAdapter::new(config)),
            AdapterKind::Axum => Box::new(AxumAdapter::new(config)),
        };
        Self::with_adapter(options, adapter)
    }

    /// Creates a server with an explicit adapter.
    pub fn with_adapter(options: ServerOptions, adapter: Box<dyn Adapter>) -> Self {
        let livereload = options
            .mode
            .is_development()
            .then(|| LiveReload::new(options.reload_window));

        Self {
            options,
            adapter,
            routes: Vec::new(),
            hooks: HookSet::new(),
            livereload,
            page_cache: None,
            running: None,
        }
    }

    /// The server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Registers a route. Routes registered first win on overlap.
    pub fn route<F>(&mut self, method: &str, path: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add_route(Route::new(method, path, Arc::new(handler), None)?)
    }

    /// Registers a route carrying metadata for `pre_handler`.
    pub fn route_with_meta<F>(
        &mut self,
        method: &str,
        path: &str,
        handler: F,
        metadata: serde_json::Value,
    ) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add_route(Route::new(method, path, Arc::new(handler), Some(metadata))?)
    }

    /// Registers a compiled route.
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self, ServerError> {
        self.routes.push(route);
        Ok(self)
    }

    /// Registers a GET route rendered through the page cache.
    pub fn page(&mut self, path: &str, page: PageRoute) -> Result<&mut Self, ServerError> {
        let cache = self.page_cache();
        self.add_route(Route::new("GET", path, page_handler(cache, page), None)?)
    }

    /// Uses `cache` for pages registered after this call.
    pub fn with_page_cache(&mut self, cache: Arc<PageCache>) -> &mut Self {
        self.page_cache = Some(cache);
        self
    }

    /// The page cache, created with defaults on first use.
    pub fn page_cache(&mut self) -> Arc<PageCache> {
        if let Some(cache) = &self.page_cache {
            return cache.clone();
        }

        let output_dir = self.options.output_dir.clone().unwrap_or_else(|| PathBuf::from("dist"));
        let env = RenderEnv::new(output_dir).with_livereload(self.options.mode.is_development());
        let cache = Arc::new(PageCache::new(DEFAULT_CACHE_SIZE, env));
        self.page_cache = Some(cache.clone());
        cache
    }

    /// Merges lifecycle hooks.
    pub fn hooks(&mut self, hooks: HookSet) -> &mut Self {
        self.hooks.merge(hooks);
        self
    }

    /// Handle for triggering live reloads; `None` in production.
    pub fn reload_handle(&self) -> Option<LiveReload> {
        self.livereload.clone()
    }

    /// Builds the kernel and starts the adapter.
    ///
    /// Returns the bound address, which differs from the requested one when
    /// port 0 was asked for.
    pub async fn listen(&mut self, options: ListenOptions) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let (sse_shutdown, sse_closed) = watch::channel(false);
        let kernel = Arc::new(self.build_kernel(sse_closed)?);
        let server = self.adapter.start(kernel, &options).await?;
        let addr = server.local_addr();

        tracing::info!(
            address = %addr,
            adapter = self.adapter.name(),
            mode = self.options.mode.as_str(),
            "Server listening"
        );

        self.running = Some(Running { server, sse_shutdown });
        Ok(addr)
    }

    /// Stops the adapter and releases the socket. Does nothing when stopped.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.sse_shutdown.send(true);
        running.server.stop().await;
    }

    /// Returns true between `listen` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.server.local_addr())
    }

    /// User routes followed by system routes.
    pub fn routes(&self) -> Vec<RouteSummary> {
        let (_tx, closed) = watch::channel(false);
        let system = self.system_routes(closed).unwrap_or_default();
        self.routes.iter().chain(system.iter()).map(Route::summary).collect()
    }

    fn system_route_count(&self) -> usize {
        if self.livereload.is_some() {
            3
        } else {
            2
        }
    }

    fn system_routes(&self, sse_closed: watch::Receiver<bool>) -> Result<Vec<Route>, QuireError> {
        let mode = self.options.mode;
        let route_count = self.routes.len() + self.system_route_count();

        let mut routes = vec![
            Route::new("GET", system::HEALTH_PATH, system::health(mode), None)?,
            Route::new(
                "GET",
                system::INFO_PATH,
                system::info(&self.options.name, &self.options.version, mode, route_count),
                None,
            )?,
        ];

        if let Some(reload) = &self.livereload {
            routes.push(Route::new("GET", LIVERELOAD_PATH, reload.handler(sse_closed), None)?);
        }

        Ok(routes)
    }

    fn build_kernel(&self, sse_closed: watch::Receiver<bool>) -> Result<Kernel, QuireError> {
        let mut kernel = Kernel::new();

        for route in &self.routes {
            kernel.add_route(Route::new(
                route.method(),
                route.path(),
                route.handler().clone(),
                route.metadata().cloned(),
            )?);
        }
        for route in self.system_routes(sse_closed)? {
            kernel.add_route(route);
        }

        if let Some(output_dir) = &self.options.output_dir {
            kernel.set_fallback(static_fallback(output_dir.clone()));
        }

        kernel.hooks(self.hooks.clone());
        Ok(kernel)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            let _ = running.sse_shutdown.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire::Response;

    fn hello(_ctx: &Context) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async { Ok(Some(Response::text("hello"))) })
    }

    #[test]
    fn test_routes_lists_user_then_system() {
        let mut server = Server::new(ServerOptions::default());
        server.route("GET", "/users/:id", hello).unwrap();

        let routes = server.routes();
        let paths: Vec<_> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/users/:id", "/health", "/_info"]);
        assert_eq!(routes[0].param_names, vec!["id".to_string()]);
    }

    #[test]
    fn test_development_adds_livereload_route() {
        let mut server = Server::new(ServerOptions {
            mode: Mode::Development,
            ..ServerOptions::default()
        });
        server.route("GET", "/", hello).unwrap();

        assert!(server.reload_handle().is_some());
        let paths: Vec<_> = server.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/", "/health", "/_info", "/__livereload"]);
    }

    #[test]
    fn test_invalid_route_is_rejected() {
        let mut server = Server::new(ServerOptions::default());
        assert!(matches!(
            server.route("NOT A METHOD", "/", hello),
            Err(ServerError::Kernel(_))
        ));
    }

    #[tokio::test]
    async fn test_listen_twice_then_restart() {
        let mut server = Server::new(ServerOptions::default());
        server.route("GET", "/", hello).unwrap();

        let addr = server.listen(ListenOptions::port(0)).await.unwrap();
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));
        assert!(matches!(
            server.listen(ListenOptions::port(0)).await,
            Err(ServerError::AlreadyRunning)
        ));

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());

        server.listen(ListenOptions::port(0)).await.unwrap();
        assert_eq!(server.routes().len(), 3);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_propagates() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut server = Server::new(ServerOptions::default());
        let err = server.listen(ListenOptions::port(port)).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(!server.is_running());
    }

    #[test]
    fn test_from_config() {
        let config = Config::parse("[project]\nname = \"site\"\n[server]\nadapter = \"axum\"\n").unwrap();
        let options = ServerOptions::from_config(&config, Mode::Development);
        assert_eq!(options.name, "site");
        assert_eq!(options.adapter, AdapterKind::Axum);
        assert_eq!(options.output_dir, Some(PathBuf::from("dist")));
        assert_eq!(options.mode.as_str(), "development");
    }
}
