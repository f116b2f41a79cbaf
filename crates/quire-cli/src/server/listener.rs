// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tracked accept loop shared by both adapters.
//!
//! Every accepted connection runs in its own task inside a `JoinSet`, so a
//! stop can first ask each connection to finish gracefully and then abort
//! whatever is still open when the deadline passes.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::adapter::log_connection_error;

/// A listening server; stop it with [`RunningServer::stop`].
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    adapter: &'static str,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RunningServer {
    /// Starts accepting on `listener`, building one service per connection.
    pub fn spawn<F, S, B>(listener: TcpListener, adapter: &'static str, shutdown_timeout: Duration, make_service: F) -> std::io::Result<Self>
    where
        F: Fn(SocketAddr) -> S + Send + 'static,
        S: Service<Request<Incoming>, Response = Response<B>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<Box<dyn StdError + Send + Sync>>,
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(accept_loop(listener, adapter, shutdown_rx, shutdown_timeout, make_service));

        tracing::info!(address = %local_addr, adapter, "Listener bound");

        Ok(Self {
            local_addr,
            adapter,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Name of the adapter serving this listener.
    pub fn adapter(&self) -> &'static str {
        self.adapter
    }

    /// Returns true until [`stop`](Self::stop) was called.
    pub fn is_running(&self) -> bool {
        self.task.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Stops accepting, drains open connections, then aborts the rest.
    ///
    /// Resolves once the listener socket is released. Calling it again is a no-op.
    pub async fn stop(&self) {
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(task) = task else {
            return;
        };

        let _ = self.shutdown.send(true);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Accept loop ended abnormally");
        }
        tracing::info!(address = %self.local_addr, "Listener stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn accept_loop<F, S, B>(
    listener: TcpListener,
    adapter: &'static str,
    mut shutdown_rx: watch::Receiver<bool>,
    shutdown_timeout: Duration,
    make_service: F,
) where
    F: Fn(SocketAddr) -> S + Send + 'static,
    S: Service<Request<Incoming>, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn StdError + Send + Sync>>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };
                tracing::debug!(%peer, adapter, "Connection accepted");

                let service = make_service(peer);
                let mut conn_shutdown = shutdown_rx.clone();
                connections.spawn(async move {
                    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                    tokio::pin!(conn);

                    let result = tokio::select! {
                        result = conn.as_mut() => result,
                        _ = conn_shutdown.changed() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        log_connection_error(e, peer);
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);

    let open = connections.len();
    if open > 0 {
        tracing::debug!(open, "Waiting for open connections");
    }

    let drained = tokio::time::timeout(shutdown_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!(remaining = connections.len(), "Shutdown deadline passed, closing connections");
        connections.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Instant;

    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::service::service_fn;

    #[tokio::test]
    async fn test_stop_releases_port_and_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = RunningServer::spawn(listener, "test", Duration::from_millis(200), |_peer| {
            service_fn(|_req: Request<Incoming>| async move {
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"hi"))))
            })
        })
        .unwrap();
        let addr = server.local_addr();
        assert!(server.is_running());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).ends_with("hi"));

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());

        // The port can be bound again.
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_connection_is_aborted_after_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = RunningServer::spawn(listener, "test", Duration::from_millis(100), |_peer| {
            service_fn(|_req: Request<Incoming>| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
            })
        })
        .unwrap();

        let mut stream = tokio::net::TcpStream::connect(server.local_addr()).await.unwrap();
        use tokio::io::AsyncWriteExt;
        stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        server.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
