// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `dev`: development server with template watches and live reload
//! - `serve`: production server

/// Development server command.
pub mod dev;
/// Production server command.
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use console::style;
use quire::render::{PageCache, PageRoute, RenderEnv, TemplateWatch, WatchHandle};
use quire::Signal;
use serde_json::Value as JsonValue;

use crate::config::{Config, PageConfig};
use crate::server::{ListenOptions, LiveReload, Server};
use crate::watcher::NotifyWatcher;

/// Host, port and adapter overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Overrides `server.host`.
    pub host: Option<String>,
    /// Overrides `server.port`.
    pub port: Option<u16>,
    /// Overrides `server.adapter`.
    pub adapter: Option<crate::config::AdapterKind>,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(adapter) = self.adapter {
            config.server.adapter = adapter;
        }
    }

    fn listen_options(config: &Config) -> ListenOptions {
        ListenOptions::port(config.server.port).with_host(config.server.host.clone())
    }
}

/// Live-reload wiring for development mode.
pub(crate) struct DevWatch {
    pub watcher: NotifyWatcher,
    pub reload: LiveReload,
}

/// Builds the page cache and registers every configured page route.
///
/// In development mode templates are watched through the cache and data
/// files through the returned handles, which must be kept alive.
pub(crate) fn register_pages(
    server: &mut Server,
    config: &Config,
    dev: Option<&DevWatch>,
) -> anyhow::Result<Vec<WatchHandle>> {
    let output_dir = PathBuf::from(&config.build.output_dir);
    let mut env = RenderEnv::new(output_dir)
        .with_global_data(config.global_data())
        .with_livereload(dev.is_some());

    if let Some(dev) = dev {
        let reload = dev.reload.clone();
        env = env.with_watcher(Arc::new(dev.watcher.clone()), Arc::new(move || reload.notify()));
    }

    server.with_page_cache(Arc::new(PageCache::new(config.pages.cache_size, env)));

    let mut handles = Vec::new();
    for page in &config.pages.routes {
        let route = page_route(config, page, dev, &mut handles)?;
        server
            .page(&page.path, route)
            .with_context(|| format!("Invalid page route {}", page.path))?;
        tracing::debug!(path = %page.path, template = %page.template, "Page registered");
    }

    Ok(handles)
}

fn page_route(
    config: &Config,
    page: &PageConfig,
    dev: Option<&DevWatch>,
    handles: &mut Vec<WatchHandle>,
) -> anyhow::Result<PageRoute> {
    let route = PageRoute::new(config.pages.template_path(page));
    let Some(data) = &page.data else {
        return Ok(route);
    };

    let data_path = PathBuf::from(data);
    let signal = Arc::new(Signal::new(()));

    if let Some(dev) = dev {
        let touched = signal.clone();
        let reload = dev.reload.clone();
        let handle = dev.watcher.watch(
            &data_path,
            Box::new(move || {
                touched.touch();
                reload.notify();
            }),
        )?;
        handles.push(handle);
    }

    let route = route
        .with_loader(move |_request| {
            let path = data_path.clone();
            async move { load_json(&path).await }
        })
        .depends_on(signal);

    Ok(route)
}

async fn load_json(path: &std::path::Path) -> anyhow::Result<JsonValue> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Starts `server`, prints the banner and runs until Ctrl+C.
pub(crate) async fn run_until_ctrl_c(server: &mut Server, config: &Config, label: &str) -> anyhow::Result<()> {
    let addr = server.listen(ServeArgs::listen_options(config)).await?;

    println!(
        "{} {} {}",
        style("quire").cyan().bold(),
        style(label).dim(),
        style(format!("({} adapter)", config.server.adapter)).dim()
    );
    println!("{} {}", style("Server:").cyan(), style(format!("http://{}", addr)).cyan().underlined());
    println!(
        "{} {}",
        style("Pages:").cyan(),
        style(format!("{} route(s), output in {}", config.pages.routes.len(), config.build.output_dir)).dim()
    );
    println!();

    tokio::signal::ctrl_c().await?;
    println!("{}", style("Shutting down...").dim());
    server.stop().await;
    Ok(())
}
