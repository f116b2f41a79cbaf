// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bounded cache of page instances.
//!
//! [`PageCache`] keeps one [`PageInstance`] per [`CacheKey`]. When the cache
//! is full the oldest inserted instance is evicted; dropping it also drops
//! its template watch.
//!
//! ```rust,no_run
//! use quire::render::{PageCache, RenderEnv};
//!
//! let cache = PageCache::new(128, RenderEnv::new("dist"));
//! assert!(cache.is_empty());
//! ```

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;

use super::instance::{PageInstance, PageSource, RenderEnv};
use super::key::CacheKey;

/// Default number of page instances kept.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Bounded registry of page instances.
///
/// Eviction is FIFO: lookups use `peek`, so a hit never refreshes an entry
/// and the entry inserted longest ago goes first.
// TODO: switch lookups to `get` for LRU once eviction order is made configurable.
pub struct PageCache {
    env: Arc<RenderEnv>,
    entries: Mutex<LruCache<CacheKey, Arc<PageInstance>>>,
}

impl PageCache {
    /// Creates a cache holding at most `capacity` pages (at least one).
    pub fn new(capacity: usize, env: RenderEnv) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            env: Arc::new(env),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Arc<PageInstance>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the instance for `key`, building it with `init` on a miss.
    pub fn get_or_create<F>(&self, key: CacheKey, init: F) -> Arc<PageInstance>
    where
        F: FnOnce(&CacheKey) -> PageSource,
    {
        if let Some(instance) = self.lock().peek(&key) {
            return instance.clone();
        }

        // Built outside the lock; registering a template watch may block.
        let source = init(&key);
        let instance = Arc::new(PageInstance::new(key.clone(), source, self.env.clone()));

        let evicted = {
            let mut entries = self.lock();
            if let Some(existing) = entries.peek(&key) {
                return existing.clone();
            }
            entries.push(key, instance.clone())
        };

        if let Some((evicted_key, _)) = evicted {
            tracing::debug!(key = %evicted_key, "Page evicted from cache");
        }

        instance
    }

    /// Returns the cached instance for `key` without creating one.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<PageInstance>> {
        self.lock().peek(key).cloned()
    }

    /// Drops the instance for `key`, unregistering its template watch.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<PageInstance>> {
        self.lock().pop(key)
    }

    /// Marks every cached page dirty.
    pub fn invalidate_all(&self) {
        let entries = self.lock();
        for (_, instance) in entries.iter() {
            instance.mark_dirty();
        }
        tracing::debug!(count = entries.len(), "Invalidated cached pages");
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no page is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of cached pages.
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Shared render settings.
    pub fn env(&self) -> &RenderEnv {
        &self.env
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("env", &self.env)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
