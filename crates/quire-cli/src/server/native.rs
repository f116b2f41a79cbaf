// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Adapter serving the kernel straight from hyper connections.

use std::convert::Infallible;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use quire::Kernel;

use super::adapter::{bind, handle_request, Adapter, AdapterConfig, ListenOptions, RemoteAddr};
use super::listener::RunningServer;
use super::ServerError;

/// Plain hyper engine with no middleware.
#[derive(Debug, Clone, Default)]
pub struct NativeAdapter {
    config: Arc<AdapterConfig>,
}

impl NativeAdapter {
    /// Creates the adapter with the given limits.
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Adapter for NativeAdapter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn start<'a>(
        &'a self,
        kernel: Arc<Kernel>,
        options: &'a ListenOptions,
    ) -> BoxFuture<'a, Result<RunningServer, ServerError>> {
        Box::pin(async move {
            let listener = bind(options).await?;
            let config = self.config.clone();
            let timeout = config.shutdown_timeout;

            let running = RunningServer::spawn(listener, self.name(), timeout, move |peer| {
                let kernel = kernel.clone();
                let config = config.clone();
                service_fn(move |mut req: Request<Incoming>| {
                    let kernel = kernel.clone();
                    let config = config.clone();
                    req.extensions_mut().insert(RemoteAddr(peer));
                    async move { Ok::<_, Infallible>(handle_request(&kernel, req, "native", &config).await) }
                })
            })?;

            Ok(running)
        })
    }
}
