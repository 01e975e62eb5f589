//! HTTP server and graceful shutdown.
//!
//! Each connection gets its own task; each request on it runs the shared
//! [`MiddlewareChain`] to completion into a buffered
//! [`Response`](crate::Response), which is then written out.
//!
//! On SIGTERM or Ctrl-C (or the custom signal passed to
//! [`Server::serve_with_shutdown`]) the server:
//! 1. Immediately stops `listener.accept()`; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns, which lets `main` stop background tasks and exit.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::chain::MiddlewareChain;
use crate::error::Error;
use crate::middleware::panic_message;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    listener: Listener,
}

enum Listener {
    Addr(SocketAddr),
    Bound(TcpListener),
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { listener: Listener::Addr(addr) }
    }

    /// Serves on an already-bound listener, e.g. one on port 0 in tests.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener: Listener::Bound(listener) }
    }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, chain: MiddlewareChain) -> Result<(), Error> {
        self.serve_with_shutdown(chain, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains in-flight connections.
    pub async fn serve_with_shutdown<F>(self, chain: MiddlewareChain, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let listener = match self.listener {
            Listener::Addr(addr) => TcpListener::bind(addr).await?,
            Listener::Bound(listener) => listener,
        };
        let addr = listener.local_addr()?;

        // Shared read-only by every connection task.
        let chain = Arc::new(chain);

        info!(%addr, units = chain.len(), "websrv listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let chain = Arc::clone(&chain);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let chain = Arc::clone(&chain);
                            async move { dispatch(chain, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("websrv stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the chain and produces one response.
///
/// This is the transport's fault boundary: a panic no [`Recover`] unit caught
/// ends up here and is answered with a bare 500. Hyper never sees an error.
///
/// [`Recover`]: crate::middleware::Recover
async fn dispatch(
    chain: Arc<MiddlewareChain>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let req = match Request::from_hyper(req, remote_addr).await {
        Ok(req) => req,
        Err(e) => {
            warn!(peer = %remote_addr, error = %e, "could not read request");
            return Ok(Response::with_status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let mut response = Response::new();
    let outcome = AssertUnwindSafe(chain.execute(&req, &mut response))
        .catch_unwind()
        .await;

    match outcome {
        Ok(()) => Ok(response.into_inner()),
        Err(payload) => {
            error!(
                method = %req.method(),
                url = %req.uri(),
                panic = panic_message(&*payload),
                "unrecovered panic in middleware chain",
            );
            Ok(Response::with_status(StatusCode::INTERNAL_SERVER_ERROR).into_inner())
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C) the process receives.
///
/// If a handler cannot be installed, that signal is never reported and a
/// warning is logged; the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
