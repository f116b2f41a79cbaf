// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! quire CLI library.
//!
//! HTTP engines, server orchestration, live reload and file watching around
//! the [`quire`] kernel.
//!
//! # Features
//!
//! - **Two adapters**: bare hyper or axum with tower-http middleware
//! - **Graceful shutdown** with a deadline for open connections
//! - **Live reload** over server-sent events
//! - **On-demand pages** rendered through the kernel's page cache
//!
//! # Usage
//!
//! ```bash
//! quire dev      # Development server with live reload
//! quire serve    # Production server
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `quire.toml` at the project root.

/// CLI commands (dev, serve).
pub mod commands;
/// Project configuration from `quire.toml`.
pub mod config;
/// Adapters, orchestrator and built-in routes.
pub mod server;
/// File system watching for templates and data files.
pub mod watcher;
