// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Built-in routes registered after user routes.

use std::sync::Arc;

use quire::{handler, Context, Handler};
use serde::Serialize;

use super::Mode;

/// Health check path.
pub const HEALTH_PATH: &str = "/health";
/// Server info path.
pub const INFO_PATH: &str = "/_info";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Info {
    name: String,
    version: String,
    mode: &'static str,
    route_count: usize,
}

/// `GET /health`: liveness with a timestamp.
pub fn health(mode: Mode) -> Handler {
    handler(move |ctx: &Context| {
        Box::pin(async move {
            Ok(Some(ctx.json(serde_json::json!({
                "status": "ok",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "mode": mode.as_str(),
            }))))
        })
    })
}

/// `GET /_info`: name, version, mode and the number of registered routes.
pub fn info(name: &str, version: &str, mode: Mode, route_count: usize) -> Handler {
    let info = Arc::new(Info {
        name: name.to_string(),
        version: version.to_string(),
        mode: mode.as_str(),
        route_count,
    });
    handler(move |ctx: &Context| {
        let info = info.clone();
        Box::pin(async move { Ok(Some(ctx.json(serde_json::to_value(&*info)?))) })
    })
}
