// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with live reload.

use console::style;

use super::{register_pages, run_until_ctrl_c, DevWatch, ServeArgs};
use crate::config::Config;
use crate::server::{Mode, Server, ServerOptions};
use crate::watcher::NotifyWatcher;

/// Runs the development server until Ctrl+C.
///
/// Templates and data files of every configured page are watched; a change
/// marks the affected pages dirty and tells connected browsers to reload.
pub async fn run(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    args.apply(&mut config);

    let mut server = Server::new(ServerOptions::from_config(&config, Mode::Development));
    let Some(reload) = server.reload_handle() else {
        anyhow::bail!("live reload is unavailable outside development mode");
    };

    let dev = DevWatch {
        watcher: NotifyWatcher::new()?,
        reload,
    };
    let _handles = register_pages(&mut server, &config, Some(&dev))?;

    println!(
        "{} {}",
        style("Status:").cyan(),
        style("Watching templates and data files...").dim()
    );

    run_until_ctrl_c(&mut server, &config, "dev").await
}
