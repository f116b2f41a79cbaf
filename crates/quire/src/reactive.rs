// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Explicit dependency tracking with generation counters.
//!
//! A [`Signal`] is a value with a generation number that increases on every
//! write. A [`DataCell`] caches the result of an async supplier together with
//! the generations of the dependencies it was computed from; it is stale once
//! any of those generations moved on.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;

/// Something a [`DataCell`] can depend on.
pub trait Dependency: Send + Sync {
    /// Current generation. Any change must increase it.
    fn generation(&self) -> u64;
}

/// A shared value that bumps its generation on every write.
pub struct Signal<T> {
    value: RwLock<T>,
    generation: AtomicU64,
}

impl<T: Clone + Send + Sync> Signal<T> {
    /// Creates a signal at generation 0.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Mutates the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut guard = match self.value.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard);
        }
        self.touch();
    }

    /// Marks dependents stale without changing the value.
    pub fn touch(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: Clone + Send + Sync> Dependency for Signal<T> {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.value)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Async producer of a cell's value.
pub type Supplier = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<JsonValue>> + Send + Sync>;

/// Boxes an async closure into a [`Supplier`].
pub fn supplier<F, Fut>(f: F) -> Supplier
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<JsonValue>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture<'static, anyhow::Result<JsonValue>>)
}

#[derive(Default)]
struct CellState {
    value: Option<JsonValue>,
    seen: Vec<u64>,
}

/// A lazily computed value that is recomputed when a dependency changes.
pub struct DataCell {
    supplier: Supplier,
    deps: Vec<Arc<dyn Dependency>>,
    state: Mutex<CellState>,
}

impl DataCell {
    /// Creates a cell over `supplier`, tracking `deps`.
    pub fn new(supplier: Supplier, deps: Vec<Arc<dyn Dependency>>) -> Self {
        Self {
            supplier,
            deps,
            state: Mutex::new(CellState::default()),
        }
    }

    /// A cell that always yields `value` and is never stale after first read.
    pub fn constant(value: JsonValue) -> Self {
        Self::new(
            supplier(move || {
                let value = value.clone();
                async move { Ok(value) }
            }),
            Vec::new(),
        )
    }

    fn generations(&self) -> Vec<u64> {
        self.deps.iter().map(|d| d.generation()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CellState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// True if the cell has no value yet or a dependency changed since.
    pub fn is_stale(&self) -> bool {
        let state = self.lock();
        state.value.is_none() || state.seen != self.generations()
    }

    /// Returns the cached value, recomputing it first when stale.
    ///
    /// Generations are read before the supplier runs, so a change that lands
    /// while it runs leaves the cell stale for the next read.
    pub async fn get(&self) -> anyhow::Result<JsonValue> {
        if !self.is_stale() {
            if let Some(value) = self.peek() {
                return Ok(value);
            }
        }

        let seen = self.generations();
        let value = (self.supplier)().await?;

        let mut state = self.lock();
        state.value = Some(value.clone());
        state.seen = seen;
        Ok(value)
    }

    /// The cached value, without recomputing.
    pub fn peek(&self) -> Option<JsonValue> {
        self.lock().value.clone()
    }

    /// Drops the cached value so the next read recomputes.
    pub fn invalidate(&self) {
        self.lock().value = None;
    }
}

impl fmt::Debug for DataCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCell")
            .field("deps", &self.deps.len())
            .field("stale", &self.is_stale())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_cell(signal: Arc<Signal<i64>>, calls: Arc<AtomicUsize>) -> DataCell {
        let source = signal.clone();
        DataCell::new(
            supplier(move || {
                let source = source.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({ "count": source.get() }))
                }
            }),
            vec![signal as Arc<dyn Dependency>],
        )
    }

    #[test]
    fn test_signal_generation() {
        let signal = Signal::new(1);
        assert_eq!(signal.generation(), 0);
        signal.set(2);
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.generation(), 1);
        signal.update(|v| *v += 1);
        signal.touch();
        assert_eq!(signal.get(), 3);
        assert_eq!(signal.generation(), 3);
    }

    #[tokio::test]
    async fn test_cell_caches_until_dependency_changes() {
        let signal = Arc::new(Signal::new(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = counting_cell(signal.clone(), calls.clone());

        assert!(cell.is_stale());
        assert_eq!(cell.get().await.unwrap()["count"], 1);
        assert!(!cell.is_stale());
        cell.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        signal.set(5);
        assert!(cell.is_stale());
        assert_eq!(cell.get().await.unwrap()["count"], 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let signal = Arc::new(Signal::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = counting_cell(signal, calls.clone());

        cell.get().await.unwrap();
        cell.invalidate();
        assert!(cell.is_stale());
        cell.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_supplier_error_keeps_cell_stale() {
        let cell = DataCell::new(
            supplier(|| async { Err(anyhow::anyhow!("loader failed")) }),
            Vec::new(),
        );
        assert!(cell.get().await.is_err());
        assert!(cell.is_stale());
        assert!(cell.peek().is_none());
    }

    #[tokio::test]
    async fn test_constant_cell() {
        let cell = DataCell::constant(serde_json::json!({"title": "Home"}));
        assert_eq!(cell.get().await.unwrap()["title"], "Home");
        assert!(!cell.is_stale());
    }
}
