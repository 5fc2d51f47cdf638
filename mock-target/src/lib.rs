//! A small HTTP target for exercising the load generator.
//!
//! Routes:
//! - `/` returns a fixed page
//! - `/status/:code` answers with the given status
//! - `/echo` reports how many body bytes it received
//! - `/delay/:ms` answers after the given delay
//! - `/hang` never answers
//!
//! [`MockTarget::spawn_tls`] serves the same routes over TLS.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::any;
use axum::{Json, Router};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub use crate::tls::server_config;

mod tls;

pub const INDEX_BODY: &[u8] = b"<html><body>mock target</body></html>\n";

#[derive(Clone, Default)]
pub struct HitCounter {
    count: Arc<AtomicUsize>,
}

impl HitCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn hit(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct EchoResponse {
    pub received: usize,
}

pub fn router(hits: HitCounter) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/status/:code", any(status))
        .route("/echo", any(echo))
        .route("/delay/:ms", any(delay))
        .route("/hang", any(hang))
        .with_state(hits)
}

/// A server running on a background task. Aborted on drop.
pub struct MockTarget {
    addr: SocketAddr,
    scheme: &'static str,
    hits: HitCounter,
    handle: JoinHandle<()>,
}

impl MockTarget {
    /// Binds an ephemeral localhost port and starts serving HTTP/1.1 and h2c.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::bind("127.0.0.1:0").await
    }

    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let addr = listener.local_addr().context("Failed to get local addr")?;
        let hits = HitCounter::new();
        let app = router(hits.clone());
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(%err, "mock target stopped");
            }
        });
        Ok(Self {
            addr,
            scheme: "http",
            hits,
            handle,
        })
    }

    /// Binds an ephemeral localhost port and serves HTTP/1.1 and h2 over TLS.
    pub async fn spawn_tls(config: rustls::ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind tls listener")?;
        let addr = listener.local_addr().context("Failed to get local addr")?;
        let hits = HitCounter::new();
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let handle = tokio::spawn(tls::serve(listener, acceptor, router(hits.clone())));
        Ok(Self {
            addr,
            scheme: "https",
            hits,
            handle,
        })
    }

    #[inline]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{path}", self.scheme, self.addr)
    }

    #[inline]
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    /// Resolves when the server task exits.
    pub async fn join(mut self) -> anyhow::Result<()> {
        (&mut self.handle).await.context("Server task failed")
    }
}

impl Drop for MockTarget {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[inline]
async fn index(State(hits): State<HitCounter>) -> &'static [u8] {
    hits.hit();
    INDEX_BODY
}

async fn status(State(hits): State<HitCounter>, Path(code): Path<u16>) -> StatusCode {
    hits.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn echo(State(hits): State<HitCounter>, body: Bytes) -> Json<EchoResponse> {
    hits.hit();
    Json(EchoResponse {
        received: body.len(),
    })
}

async fn delay(State(hits): State<HitCounter>, Path(ms): Path<u64>) -> &'static [u8] {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    hits.hit();
    INDEX_BODY
}

async fn hang(State(hits): State<HitCounter>) -> StatusCode {
    hits.hit();
    std::future::pending::<()>().await;
    StatusCode::OK
}
