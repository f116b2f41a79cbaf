// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template watch seam; the CLI implements it over `notify`.

use std::fmt;
use std::path::Path;

/// Callback run when a watched file changes.
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// Registers interest in a template file.
pub trait TemplateWatch: Send + Sync {
    /// Calls `on_change` whenever `path` changes until the handle is dropped.
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> anyhow::Result<WatchHandle>;
}

/// Keeps a watch registered; dropping it unregisters the watch.
pub struct WatchHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl WatchHandle {
    /// Creates a handle that runs `cancel` when dropped.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
