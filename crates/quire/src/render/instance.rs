// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Page instances: render, persist and re-serve one page.
//!
//! Output files live under the render environment's output directory. Every
//! write goes to a temp file first and is renamed into place, so readers
//! never see a partially written page even when two compiles race.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use super::key::CacheKey;
use super::template::{inject_livereload_script, SimpleRenderer, TemplateRenderer};
use super::watch::{TemplateWatch, WatchHandle};
use super::RenderError;
use crate::reactive::DataCell;

/// Settings shared by every page instance of one cache.
pub struct RenderEnv {
    output_dir: PathBuf,
    global_data: JsonValue,
    renderer: Arc<dyn TemplateRenderer>,
    livereload: bool,
    watcher: Option<Arc<dyn TemplateWatch>>,
    on_change: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl RenderEnv {
    /// Production defaults: [`SimpleRenderer`], no global data, no watching.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            global_data: JsonValue::Null,
            renderer: Arc::new(SimpleRenderer),
            livereload: false,
            watcher: None,
            on_change: None,
        }
    }

    /// Data every page sees, overridden key by key by route data.
    pub fn with_global_data(mut self, data: JsonValue) -> Self {
        self.global_data = data;
        self
    }

    /// Replaces the template renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Injects the live-reload client into rendered pages.
    pub fn with_livereload(mut self, enabled: bool) -> Self {
        self.livereload = enabled;
        self
    }

    /// Watches each page's template; `on_change` runs after a page is marked dirty.
    pub fn with_watcher(mut self, watcher: Arc<dyn TemplateWatch>, on_change: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.watcher = Some(watcher);
        self.on_change = Some(on_change);
        self
    }

    /// Directory rendered pages are persisted under.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl fmt::Debug for RenderEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEnv")
            .field("output_dir", &self.output_dir)
            .field("livereload", &self.livereload)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

/// What a cache miss needs to build a page instance.
pub struct PageSource {
    /// Template file rendered for the page
    pub template: PathBuf,
    /// Route data for the page
    pub data: DataCell,
}

/// One cached page: its output file, data cell and template watch.
pub struct PageInstance {
    key: CacheKey,
    template: PathBuf,
    output_path: PathBuf,
    dirty: Arc<AtomicBool>,
    data: DataCell,
    env: Arc<RenderEnv>,
    watch: Mutex<Option<WatchHandle>>,
}

impl PageInstance {
    pub(crate) fn new(key: CacheKey, source: PageSource, env: Arc<RenderEnv>) -> Self {
        let output_path = output_path_for(&env.output_dir, &key);
        let dirty = Arc::new(AtomicBool::new(false));

        let watch = env.watcher.as_ref().and_then(|watcher| {
            let flag = dirty.clone();
            let on_change = env.on_change.clone();
            let callback = Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                if let Some(notify) = &on_change {
                    notify();
                }
            });

            match watcher.watch(&source.template, callback) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(template = %source.template.display(), error = %e, "Failed to watch template");
                    None
                }
            }
        });

        Self {
            key,
            template: source.template,
            output_path,
            dirty,
            data: source.data,
            env,
            watch: Mutex::new(watch),
        }
    }

    /// The key this instance is cached under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Template file this page renders.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Where the rendered page is persisted.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// True if the next compile must re-render.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Forces a re-render on the next compile.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// True while a template watch is registered.
    pub fn is_watched(&self) -> bool {
        self.watch.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Returns the page HTML, re-rendering only when something changed.
    ///
    /// A page is re-rendered when its data is stale, it was marked dirty, or
    /// its output file is gone. Otherwise the persisted file is returned.
    pub async fn compile(&self) -> Result<String, RenderError> {
        if !self.data.is_stale() && !self.is_dirty() {
            match tokio::fs::read_to_string(&self.output_path).await {
                Ok(html) => return Ok(html),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Cleared up front so a change that lands mid-render is kept.
        self.dirty.store(false, Ordering::SeqCst);
        match self.render().await {
            Ok(html) => Ok(html),
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }

    async fn render(&self) -> Result<String, RenderError> {
        let source = match tokio::fs::read_to_string(&self.template).await {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RenderError::TemplateMissing(self.template.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let data = self.data.get().await.map_err(RenderError::Data)?;
        let merged = merge_data(&self.env.global_data, data);

        let mut html = self.env.renderer.render(&source, &merged)?;
        if self.env.livereload {
            html = inject_livereload_script(&html);
        }

        persist(&self.output_path, &html).await?;
        tracing::debug!(key = %self.key, output = %self.output_path.display(), "Page rendered");
        Ok(html)
    }
}

impl fmt::Debug for PageInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageInstance")
            .field("key", &self.key)
            .field("template", &self.template)
            .field("output_path", &self.output_path)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Maps a cache key to its file under `output_dir`.
///
/// `/` becomes `index.html`, a trailing slash gets `index.html`, an
/// extensionless path gets `.html`. Keys whose natural file name could also
/// be produced by another key (a query, an explicit `.html` or `index` name,
/// dot or empty segments) get a short hash of the whole key added to the file
/// stem, so distinct keys never share a file.
pub fn output_path_for(output_dir: &Path, key: &CacheKey) -> PathBuf {
    let segments: Vec<&str> = key.path().split('/').filter(|s| !s.is_empty()).collect();
    let canonical = segments.iter().all(|s| *s != "." && *s != "..") && rebuild(&segments, key.path()) == key.path();
    let segments: Vec<&str> = segments.into_iter().filter(|s| *s != "." && *s != "..").collect();

    let as_dir = segments.is_empty() || key.path().ends_with('/');
    let mut relative: PathBuf = segments.iter().collect();
    let mut ambiguous = !canonical || !key.query().is_empty();

    if as_dir {
        relative.push("index.html");
    } else {
        let explicit_html = relative
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        let index_name = relative.file_name().is_some_and(|name| name == "index");
        ambiguous |= explicit_html || index_name;
        if relative.extension().is_none() {
            relative.set_extension("html");
        }
    }

    let stem = relative.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    if ambiguous || has_key_suffix(&stem) {
        let digest = Sha256::digest(key.to_string().as_bytes());
        let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
        let file_name = match relative.extension() {
            Some(ext) => format!("{stem}-{suffix}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{suffix}"),
        };
        relative.set_file_name(file_name);
    }

    output_dir.join(relative)
}

/// The path `segments` describe in its one canonical spelling.
fn rebuild(segments: &[&str], original: &str) -> String {
    let mut path = format!("/{}", segments.join("/"));
    if !segments.is_empty() && original.ends_with('/') {
        path.push('/');
    }
    path
}

/// True if `stem` ends like a hashed file stem (`-` plus 8 hex digits).
fn has_key_suffix(stem: &str) -> bool {
    match stem.len().checked_sub(9).and_then(|at| stem.get(at..)) {
        Some(tail) => tail.starts_with('-') && tail[1..].bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Route data overrides global data key by key when both are objects.
fn merge_data(global: &JsonValue, data: JsonValue) -> JsonValue {
    match (global, data) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            let mut merged = base.clone();
            merged.extend(overlay);
            JsonValue::Object(merged)
        }
        (global, JsonValue::Null) => global.clone(),
        (_, data) => data,
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes to a unique temp file next to `path`, then renames it into place.
async fn persist(path: &Path, contents: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let temp = dir.join(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    tokio::fs::write(&temp, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}
