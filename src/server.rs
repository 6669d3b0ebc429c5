//! HTTP server and graceful shutdown.
//!
//! On **SIGTERM** (how Kubernetes and most supervisors stop a process) or
//! Ctrl-C the server:
//!
//! 1. stops accepting connections;
//! 2. lets every in-flight connection finish;
//! 3. returns from [`Server::serve`].
//!
//! Keep the supervisor's grace period longer than the slowest request.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::app::App;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

enum Listen {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server. Speaks HTTP/1.1 and HTTP/2, whichever the client
/// negotiates.
pub struct Server {
    listen: Listen,
    body_limit: usize,
}

impl Server {
    /// Largest request body buffered by default: 1 MiB.
    pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

    /// Binds to `addr` (`host:port`) when [`serve`](Server::serve) is called.
    ///
    /// ```rust,no_run
    /// use kura::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { listen: Listen::Addr(addr.into()), body_limit: Self::DEFAULT_BODY_LIMIT }
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listen: Listen::Listener(listener), body_limit: Self::DEFAULT_BODY_LIMIT }
    }

    /// Longest request body accepted, in bytes. Longer bodies get
    /// `413 Payload Too Large`.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves, then drains in-flight
    /// connections.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Listener(listener) => listener,
        };
        let app = Arc::new(app);
        let body_limit = self.body_limit;
        info!(addr = %listener.local_addr()?, "kura listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Checked first so a pending signal wins over queued accepts.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(&app, req, peer, body_limit).await }
                        });
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("kura stopped");
        Ok(())
    }
}

/// Buffers one request and runs it through the app. Failures are answered
/// in-band, so hyper never sees an error.
async fn dispatch(
    app: &App,
    req: hyper::Request<hyper::body::Incoming>,
    peer: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    let response = match Request::from_hyper(req, body_limit).await {
        Ok(request) => app.handle(request).await,
        Err(e @ Error::PayloadTooLarge { .. }) => {
            warn!(%peer, "{e}");
            Response::status(http::StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e) => {
            warn!(%peer, "unreadable request: {e}");
            Response::status(http::StatusCode::BAD_REQUEST)
        }
    };
    Ok(response.into_inner())
}

/// Resolves on SIGTERM or Ctrl-C. Only Ctrl-C exists off Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
