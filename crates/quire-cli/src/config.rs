// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! quire project configuration.
//!
//! Configuration is loaded from `quire.toml` at the project root (or the path
//! given with `--config`). Every field has a default, so an empty or missing
//! file is a valid configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "my-site"
//! version = "1.0.0"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! adapter = "axum"
//! cors = true
//!
//! [build]
//! output_dir = "dist"
//!
//! [pages]
//! templates_dir = "templates"
//! cache_size = 256
//!
//! [[pages.routes]]
//! path = "/blog/:slug"
//! template = "post.html"
//! data = "data/posts.json"
//!
//! [data]
//! site_name = "My Site"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "quire.toml";

/// Main configuration structure loaded from `quire.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Project metadata (name, version).
    #[serde(default)]
    pub project: ProjectConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Output settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Page routes and render cache settings.
    #[serde(default)]
    pub pages: PagesConfig,
    /// Global template data, visible to every page.
    #[serde(default)]
    pub data: Map<String, JsonValue>,
}

/// Project metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Project name (default: "unnamed").
    #[serde(default = "default_name")]
    pub name: String,
    /// Project version (default: "0.1.0").
    #[serde(default = "default_version")]
    pub version: String,
}

/// Which HTTP engine serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Bare hyper connections.
    #[default]
    Native,
    /// axum router with tower-http middleware.
    Axum,
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(AdapterKind::Native),
            "axum" => Ok(AdapterKind::Axum),
            other => Err(format!("unknown adapter '{other}' (expected 'native' or 'axum')")),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Native => f.write_str("native"),
            AdapterKind::Axum => f.write_str("axum"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Grace period for open connections on stop, in milliseconds (default: 2000).
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Largest accepted request body in bytes (default: 2 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Send permissive CORS headers (axum adapter only).
    #[serde(default)]
    pub cors: bool,
    /// HTTP engine (default: native).
    #[serde(default)]
    pub adapter: AdapterKind,
}

/// Output configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Directory rendered pages and static files are served from (default: "dist").
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

/// Page rendering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PagesConfig {
    /// Directory templates are resolved against (default: "templates").
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    /// Maximum number of cached page instances (default: 256).
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Live-reload coalescing window in milliseconds (default: 100).
    #[serde(default = "default_reload_window_ms")]
    pub reload_window_ms: u64,
    /// Page routes.
    #[serde(default)]
    pub routes: Vec<PageConfig>,
}

/// One page route.
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    /// Route pattern (e.g. "/blog/:slug").
    pub path: String,
    /// Template file, relative to `templates_dir`.
    pub template: String,
    /// Optional JSON data file, relative to the project root.
    #[serde(default)]
    pub data: Option<String>,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_cache_size() -> usize {
    quire::render::DEFAULT_CACHE_SIZE
}

fn default_reload_window_ms() -> u64 {
    100
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            cors: false,
            adapter: AdapterKind::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            cache_size: default_cache_size(),
            reload_window_ms: default_reload_window_ms(),
            routes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// The shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl PagesConfig {
    /// The live-reload coalescing window.
    pub fn reload_window(&self) -> Duration {
        Duration::from_millis(self.reload_window_ms)
    }

    /// Full path of a route template.
    pub fn template_path(&self, page: &PageConfig) -> PathBuf {
        Path::new(&self.templates_dir).join(&page.template)
    }
}

impl Config {
    /// Loads configuration from `quire.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Loads configuration from `path`, falling back to defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| anyhow::anyhow!("Invalid {}: {}", path.display(), e))
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Global template data as a JSON object.
    pub fn global_data(&self) -> JsonValue {
        JsonValue::Object(self.data.clone())
    }
}
