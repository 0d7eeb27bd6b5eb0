// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::proxy::ClientAddr;
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::{Service, ServiceExt};

/// Pause after a failed accept. Errors such as EMFILE repeat instantly.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Builder pattern so `main.rs` can inject its Proxy (or any handler).
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    /// Inject your request handler (usually wraps `proxy::Proxy`).
    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_tcp(self.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;

        tracing::info!("HTTP server listening on {}", listener.local_addr()?);
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            tracing::warn!(%err, "accept failed");
                            if back_off(ACCEPT_ERROR_BACKOFF, &mut signal).await {
                                tracing::info!("HTTP server stopped accepting connections");
                                break;
                            }
                            continue;
                        }
                    };

                    // Tag every request on this connection with its peer.
                    let svc = handler.clone().map_request(move |mut req: Request<Body>| {
                        req.extensions_mut().insert(ClientAddr(peer));
                        req
                    });

                    tokio::spawn(async move {
                        let http = Http::new();
                        if let Err(err) = http.serve_connection(stream, svc).await {
                            tracing::warn!(%peer, %err, "connection error");
                        }
                    });
                }
                _ = &mut signal => {
                    tracing::info!("HTTP server stopped accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Sleep for `delay` unless `signal` resolves first; returns true if it did.
async fn back_off<S>(delay: Duration, signal: &mut S) -> bool
where
    S: Future<Output = ()> + Unpin,
{
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = signal => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn back_off_waits_out_the_delay() {
        let mut never = std::future::pending::<()>();
        let start = Instant::now();

        assert!(!back_off(Duration::from_millis(50), &mut never).await);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn back_off_yields_to_shutdown() {
        let mut stop = std::future::ready(());

        let stopped = tokio::time::timeout(
            Duration::from_secs(1),
            back_off(Duration::from_secs(60), &mut stop),
        )
        .await
        .expect("shutdown should cut the pause short");
        assert!(stopped);
    }
}
