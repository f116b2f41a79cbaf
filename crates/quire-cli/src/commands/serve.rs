// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production server command.
//!
//! Pages are rendered on first request and served from the output directory
//! afterwards. No watches, no live reload.

use super::{register_pages, run_until_ctrl_c, ServeArgs};
use crate::config::Config;
use crate::server::{Mode, Server, ServerOptions};

/// Runs the production server until Ctrl+C.
pub async fn run(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    args.apply(&mut config);

    let mut server = Server::new(ServerOptions::from_config(&config, Mode::Production));
    register_pages(&mut server, &config, None)?;

    run_until_ctrl_c(&mut server, &config, "serve").await
}
