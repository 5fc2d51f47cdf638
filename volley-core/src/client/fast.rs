//! Low-overhead backend: each worker owns one raw HTTP/1.1 connection.
//!
//! Addresses are resolved once per run and there is no pool, no ALPN and no
//! per-request routing. A connection is replaced only when it has closed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{Target, UriForm};
use crate::body::RequestBody;
use crate::drain::CountBodyFuture;
use crate::error::RequestError;
use crate::outcome::Completed;

trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

struct TlsTarget {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

/// Dials new connections for fast clients, round-robin over the resolved
/// addresses.
pub struct FastConnector {
    addrs: Vec<SocketAddr>,
    next: AtomicUsize,
    tls: Option<TlsTarget>,
}

impl FastConnector {
    #[must_use]
    pub fn new(
        addrs: Vec<SocketAddr>,
        tls: Option<(Arc<ClientConfig>, ServerName<'static>)>,
    ) -> Self {
        Self {
            addrs,
            next: AtomicUsize::new(0),
            tls: tls.map(|(config, server_name)| TlsTarget {
                connector: TlsConnector::from(config),
                server_name,
            }),
        }
    }

    async fn handshake(&self) -> Result<SendRequest<RequestBody>, RequestError> {
        let addr = self.addrs[self.next.fetch_add(1, Ordering::Relaxed) % self.addrs.len()];
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(RequestError::connection)?;
        tcp.set_nodelay(true).map_err(RequestError::connection)?;
        let io: Box<dyn Io> = match &self.tls {
            Some(tls) => Box::new(
                tls.connector
                    .connect(tls.server_name.clone(), tcp)
                    .await
                    .map_err(RequestError::connection)?,
            ),
            None => Box::new(tcp),
        };
        let (sender, conn) = http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| RequestError::from_hyper(&e))?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                tracing::debug!(%err, %addr, "connection closed with error");
            }
        });
        Ok(sender)
    }
}

pub struct FastClient {
    connector: Arc<FastConnector>,
    sender: Option<SendRequest<RequestBody>>,
    keep_alive: bool,
}

impl FastClient {
    #[must_use]
    pub fn new(connector: Arc<FastConnector>, keep_alive: bool) -> Self {
        Self {
            connector,
            sender: None,
            keep_alive,
        }
    }

    /// Reuses the idle connection if it is still usable, dials otherwise. A
    /// stale connection is replaced before the request is written, so this is
    /// not a retry.
    async fn ready_sender(&mut self) -> Result<SendRequest<RequestBody>, RequestError> {
        if let Some(mut sender) = self.sender.take() {
            if !sender.is_closed() && sender.ready().await.is_ok() {
                return Ok(sender);
            }
            tracing::debug!("replacing closed connection");
        }
        let mut sender = self.connector.handshake().await?;
        sender
            .ready()
            .await
            .map_err(|e| RequestError::from_hyper(&e))?;
        Ok(sender)
    }

    pub async fn send(&mut self, target: &Target) -> Result<Completed, RequestError> {
        let mut sender = self.ready_sender().await?;
        let req = target
            .request(UriForm::Origin)
            .await
            .map_err(|e| RequestError::Protocol(format!("request body: {e}")))?;
        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| RequestError::from_hyper(&e))?;
        let status = resp.status();
        let bytes_read = CountBodyFuture::new(resp.into_body())
            .await
            .map_err(|e| RequestError::from_hyper(&e))?;
        // Dropped senders close their connection once the exchange is done.
        if self.keep_alive {
            self.sender = Some(sender);
        }
        Ok(Completed { status, bytes_read })
    }

    pub fn close(mut self) {
        self.sender.take();
    }
}
