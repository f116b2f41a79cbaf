// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File system watching for templates and data files.
//!
//! `NotifyWatcher` implements [`TemplateWatch`] on top of a debounced
//! `notify` watcher. Individual files are watched through their parent
//! directory, so editors that save by writing a temp file and renaming it
//! over the original still trigger callbacks.
//!
//! # Features
//!
//! - Debounced file change events (750ms by default)
//! - One directory watch shared by every file in it
//! - Dropping the returned [`WatchHandle`] unregisters the callback

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use anyhow::Context as _;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use quire::render::{ChangeCallback, TemplateWatch, WatchHandle};

/// Default debounce timeout.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

type Callbacks = Vec<(u64, Arc<ChangeCallback>)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    files: HashMap<PathBuf, Callbacks>,
    dirs: HashMap<PathBuf, usize>,
}

impl Registry {
    fn callbacks_for<'a>(&self, paths: impl Iterator<Item = &'a PathBuf>) -> Vec<Arc<ChangeCallback>> {
        let mut seen = Vec::new();
        let mut callbacks = Vec::new();
        for path in paths {
            let Some(entries) = self.files.get(path) else {
                continue;
            };
            for (id, callback) in entries {
                if !seen.contains(id) {
                    seen.push(*id);
                    callbacks.push(callback.clone());
                }
            }
        }
        callbacks
    }
}

struct Inner {
    debouncer: Mutex<Debouncer<RecommendedWatcher, RecommendedCache>>,
    registry: Arc<Mutex<Registry>>,
}

/// Debounced watcher dispatching changes to per-file callbacks.
#[derive(Clone)]
pub struct NotifyWatcher {
    inner: Arc<Inner>,
}

impl NotifyWatcher {
    /// Creates a watcher with the default debounce timeout.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    /// Creates a watcher that reports a burst of events once `timeout` passed quietly.
    pub fn with_debounce(timeout: Duration) -> anyhow::Result<Self> {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let dispatch = registry.clone();

        let debouncer = new_debouncer(timeout, None, move |result: DebounceEventResult| {
            let events = match result {
                Ok(events) => events,
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(error = %error, "File watch error");
                    }
                    return;
                }
            };

            let callbacks = match dispatch.lock() {
                Ok(registry) => registry.callbacks_for(events.iter().flat_map(|e| e.paths.iter())),
                Err(_) => return,
            };

            if !callbacks.is_empty() {
                tracing::debug!(count = callbacks.len(), "Watched files changed");
            }
            for callback in callbacks {
                callback();
            }
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                debouncer: Mutex::new(debouncer),
                registry,
            }),
        })
    }

    /// Number of directories currently watched.
    pub fn watched_dirs(&self) -> usize {
        self.inner.registry.lock().map(|r| r.dirs.len()).unwrap_or(0)
    }
}

impl TemplateWatch for NotifyWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> anyhow::Result<WatchHandle> {
        let (dir, file) = normalize(path)?;

        let mut registry = self
            .inner
            .registry
            .lock()
            .map_err(|_| anyhow::anyhow!("watch registry poisoned"))?;

        if !registry.dirs.contains_key(&dir) {
            let mut debouncer = self
                .inner
                .debouncer
                .lock()
                .map_err(|_| anyhow::anyhow!("watcher poisoned"))?;
            debouncer
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
            tracing::debug!(dir = %dir.display(), "Watching directory");
        }
        *registry.dirs.entry(dir.clone()).or_insert(0) += 1;

        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .files
            .entry(file.clone())
            .or_default()
            .push((id, Arc::new(on_change)));

        let inner = Arc::downgrade(&self.inner);
        Ok(WatchHandle::new(move || unwatch(inner, dir, file, id)))
    }
}

fn unwatch(inner: Weak<Inner>, dir: PathBuf, file: PathBuf, id: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let Ok(mut registry) = inner.registry.lock() else {
        return;
    };

    if let Some(entries) = registry.files.get_mut(&file) {
        entries.retain(|(entry_id, _)| *entry_id != id);
        if entries.is_empty() {
            registry.files.remove(&file);
        }
    }

    let remaining = match registry.dirs.get_mut(&dir) {
        Some(count) => {
            *count = count.saturating_sub(1);
            *count
        }
        None => return,
    };

    if remaining == 0 {
        registry.dirs.remove(&dir);
        if let Ok(mut debouncer) = inner.debouncer.lock() {
            if let Err(e) = debouncer.unwatch(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "Failed to unwatch directory");
            }
        }
    }
}

/// Canonical parent directory and the file path inside it.
///
/// The file itself may not exist yet; its directory must.
fn normalize(path: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent
        .canonicalize()
        .with_context(|| format!("Cannot watch {}", path.display()))?;
    let file = dir.join(name);
    Ok((dir, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn sender_callback(tx: mpsc::Sender<&'static str>, tag: &'static str) -> ChangeCallback {
        let tx = Mutex::new(tx);
        Box::new(move || {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(tag);
            }
        })
    }

    #[test]
    fn test_change_fires_callback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "v1").unwrap();

        let watcher = NotifyWatcher::with_debounce(Duration::from_millis(50)).unwrap();
        let (tx, rx) = mpsc::channel();
        let _handle = watcher.watch(&path, sender_callback(tx, "page")).unwrap();

        std::fs::write(&path, "v2").unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "page");
    }

    #[test]
    fn test_directory_watch_is_shared_and_released() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.html");
        let b = dir.path().join("b.html");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let watcher = NotifyWatcher::with_debounce(Duration::from_millis(50)).unwrap();
        let (tx, rx) = mpsc::channel();
        let handle_a = watcher.watch(&a, sender_callback(tx.clone(), "a")).unwrap();
        let _handle_b = watcher.watch(&b, sender_callback(tx, "b")).unwrap();
        assert_eq!(watcher.watched_dirs(), 1);

        drop(handle_a);
        assert_eq!(watcher.watched_dirs(), 1);

        std::fs::write(&a, "a2").unwrap();
        std::fs::write(&b, "b2").unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "b");
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_dropping_last_handle_unwatches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "v1").unwrap();

        let watcher = NotifyWatcher::with_debounce(Duration::from_millis(50)).unwrap();
        let handle = watcher.watch(&path, Box::new(|| {})).unwrap();
        assert_eq!(watcher.watched_dirs(), 1);
        drop(handle);
        assert_eq!(watcher.watched_dirs(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let watcher = NotifyWatcher::new().unwrap();
        assert!(watcher.watch(Path::new("/definitely/not/here/page.html"), Box::new(|| {})).is_err());
    }
}
