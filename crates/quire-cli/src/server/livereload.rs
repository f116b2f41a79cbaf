// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server-sent-events channel for live reload.
//!
//! Change notifications are coalesced: a burst of `notify()` calls within
//! the reload window produces a single `reload` event per client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;
use quire::{handler, Context, Handler, Response};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

/// Event sent to browsers when pages should reload.
pub const RELOAD_EVENT: &[u8] = b"data: reload\n\n";

/// Coalescing broadcaster for reload notifications. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LiveReload {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: broadcast::Sender<()>,
    pending: AtomicBool,
    window: Duration,
    runtime: Option<Handle>,
}

impl LiveReload {
    /// Creates a broadcaster that coalesces notifications within `window`.
    ///
    /// When created inside a tokio runtime, delayed sends are scheduled on it.
    pub fn new(window: Duration) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                tx,
                pending: AtomicBool::new(false),
                window,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    /// Schedules a reload for all connected clients.
    pub fn notify(&self) {
        if self.inner.window.is_zero() {
            self.send();
            return;
        }

        if self.inner.pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let runtime = self.inner.runtime.clone().or_else(|| Handle::try_current().ok());
        match runtime {
            Some(runtime) => {
                let this = self.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(this.inner.window).await;
                    this.send();
                });
            }
            None => self.send(),
        }
    }

    fn send(&self) {
        self.inner.pending.store(false, Ordering::Release);
        let clients = self.inner.tx.send(()).unwrap_or(0);
        tracing::debug!(clients, "Live reload triggered");
    }

    /// Subscribes to reload notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.tx.subscribe()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    /// Builds the `/__livereload` handler.
    ///
    /// Streams end when `closed` flips to true, so open event streams do not
    /// hold up a server stop.
    pub fn handler(&self, closed: watch::Receiver<bool>) -> Handler {
        let reload = self.clone();
        handler(move |_ctx: &Context| {
            let rx = reload.subscribe();
            let closed = closed.clone();
            Box::pin(async move {
                Ok(Some(
                    Response::stream_from(event_stream(rx, closed))
                        .with_header("Content-Type", "text/event-stream")
                        .with_header("Cache-Control", "no-cache"),
                ))
            })
        })
    }
}

fn event_stream(
    rx: broadcast::Receiver<()>,
    closed: watch::Receiver<bool>,
) -> futures_util::stream::BoxStream<'static, std::io::Result<Bytes>> {
    stream::unfold((rx, closed), |(mut rx, mut closed)| async move {
        loop {
            if *closed.borrow() {
                return None;
            }
            tokio::select! {
                changed = closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                received = rx.recv() => match received {
                    Ok(()) => return Some((Ok(Bytes::from_static(RELOAD_EVENT)), (rx, closed))),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire::{BodyStream, Payload};

    #[tokio::test]
    async fn test_notifications_are_coalesced() {
        let reload = LiveReload::new(Duration::from_millis(50));
        let mut rx = reload.subscribe();

        reload.notify();
        reload.notify();
        reload.notify();

        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));

        reload.notify();
        tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_zero_window_sends_immediately() {
        let reload = LiveReload::new(Duration::ZERO);
        let mut rx = reload.subscribe();
        reload.notify();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_handler_streams_events_until_closed() {
        let reload = LiveReload::new(Duration::ZERO);
        let (close_tx, close_rx) = watch::channel(false);
        let handler = reload.handler(close_rx);

        let response = handler(&Context::new("GET", "/__livereload")).await.unwrap().unwrap();
        assert_eq!(response.header("content-type"), Some("text/event-stream"));
        assert_eq!(reload.client_count(), 1);

        let Payload::Stream(BodyStream::Pull(mut events)) = response.body else {
            panic!("Expected a pull stream");
        };

        reload.notify();
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(&event[..], RELOAD_EVENT);

        close_tx.send(true).unwrap();
        assert!(events.next().await.is_none());
    }
}
