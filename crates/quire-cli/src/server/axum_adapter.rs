// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Adapter mounting the kernel as an axum fallback.
//!
//! Routing stays in the kernel; axum contributes the tower middleware stack
//! (request tracing and optional permissive CORS).

use std::sync::Arc;

use axum::body::Body as AxumBody;
use axum::extract::Request as AxumRequest;
use axum::Router;
use futures_util::future::BoxFuture;
use http::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use quire::Kernel;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::adapter::{bind, handle_request, Adapter, AdapterConfig, ListenOptions, RemoteAddr};
use super::listener::RunningServer;
use super::ServerError;

/// axum engine with tower-http middleware.
#[derive(Debug, Clone, Default)]
pub struct AxumAdapter {
    config: Arc<AdapterConfig>,
}

impl AxumAdapter {
    /// Creates the adapter with the given limits.
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Builds the router delegating every request to `kernel`.
    pub fn router(&self, kernel: Arc<Kernel>) -> Router {
        let config = self.config.clone();

        let router = Router::new()
            .fallback(move |req: AxumRequest| {
                let kernel = kernel.clone();
                let config = config.clone();
                async move {
                    handle_request(&kernel, req, "axum", &config)
                        .await
                        .map(AxumBody::new)
                }
            })
            .layer(TraceLayer::new_for_http());

        if self.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }
}

impl Adapter for AxumAdapter {
    fn name(&self) -> &'static str {
        "axum"
    }

    fn start<'a>(
        &'a self,
        kernel: Arc<Kernel>,
        options: &'a ListenOptions,
    ) -> BoxFuture<'a, Result<RunningServer, ServerError>> {
        Box::pin(async move {
            let listener = bind(options).await?;
            let router = self.router(kernel);

            let running = RunningServer::spawn(listener, self.name(), self.config.shutdown_timeout, move |peer| {
                let router = router.clone();
                service_fn(move |mut req: Request<Incoming>| {
                    req.extensions_mut().insert(RemoteAddr(peer));
                    router.clone().oneshot(req)
                })
            })?;

            Ok(running)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use quire::{handler, Context, Response, Route};

    fn kernel() -> Arc<Kernel> {
        let mut kernel = Kernel::new();
        kernel.add_route(
            Route::new(
                "GET",
                "/hello/:name",
                handler(|ctx: &Context| {
                    Box::pin(async move {
                        let adapter = ctx.raw.adapter;
                        Ok(Some(Response::text(format!("{} via {}", ctx.param("name").unwrap_or(""), adapter))))
                    })
                }),
                None,
            )
            .unwrap(),
        );
        Arc::new(kernel)
    }

    #[tokio::test]
    async fn test_router_delegates_to_kernel() {
        let router = AxumAdapter::default().router(kernel());

        let response = router
            .oneshot(Request::builder().uri("/hello/ada").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ada via axum");
    }

    #[tokio::test]
    async fn test_unmatched_is_generic_404() {
        let router = AxumAdapter::default().router(kernel());

        let response = router
            .oneshot(Request::builder().uri("/nope").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Not Found");
    }

    #[tokio::test]
    async fn test_cors_layer() {
        let adapter = AxumAdapter::new(AdapterConfig {
            cors: true,
            ..AdapterConfig::default()
        });
        let response = adapter
            .router(kernel())
            .oneshot(
                Request::builder()
                    .uri("/hello/x")
                    .header("Origin", "http://example.com")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
