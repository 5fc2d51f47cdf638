//! Transport backends behind one request/outcome contract.
//!
//! A [`Transport`] is chosen once per run from [`ClientKind`] and hands out
//! per-worker [`Client`]s. The worker loop only ever calls [`Client::send`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderValue, HOST};
use hyper::http::uri::PathAndQuery;
use hyper::{HeaderMap, Method, Request, Uri};
use rustls::pki_types::ServerName;
use serde::Serialize;

use crate::body::{BodyFactory, RequestBody};
use crate::error::{FatalError, RequestError};
use crate::outcome::Completed;
use crate::spec::RunSpec;

pub mod fast;
pub mod pooled;
pub mod tls;

use self::fast::{FastClient, FastConnector};
use self::pooled::{PooledClient, Protocol};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// One dedicated HTTP/1.1 connection per worker, no pool.
    #[default]
    Fast,
    /// Pooled HTTP/1.1 with keep-alive.
    Http1,
    /// HTTP/2, multiplexed over a shared pool (h2c for plain http).
    Http2,
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ClientKind::Fast => "fasthttp",
            ClientKind::Http1 => "net/http v1.x",
            ClientKind::Http2 => "net/http v2.0",
        })
    }
}

/// How the request target is written on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum UriForm {
    /// `/path?query` plus an explicit Host header, for raw connections.
    Origin,
    /// Full URL, for the pooled client which routes on it.
    Absolute,
}

/// The request every worker repeats, prepared once per run.
#[derive(Debug)]
pub struct Target {
    method: Method,
    url: Uri,
    origin: Uri,
    host: HeaderValue,
    headers: HeaderMap,
    body: BodyFactory,
}

impl Target {
    pub async fn prepare(spec: &RunSpec) -> Result<Self, FatalError> {
        let template = &spec.request;
        let url = template.url.clone();
        let authority = url
            .authority()
            .ok_or_else(|| FatalError::InvalidUrl(format!("{url}: missing host")))?;
        let host = HeaderValue::from_str(authority.as_str())
            .map_err(|e| FatalError::InvalidUrl(format!("{url}: {e}")))?;
        let origin = Uri::from(
            url.path_and_query()
                .cloned()
                .unwrap_or_else(|| PathAndQuery::from_static("/")),
        );
        let body = BodyFactory::prepare(&template.body, spec.stream).await?;
        Ok(Self {
            method: template.method.clone(),
            url,
            origin,
            host,
            headers: template.headers.clone(),
            body,
        })
    }

    pub(crate) async fn request(&self, form: UriForm) -> io::Result<Request<RequestBody>> {
        let mut req = Request::new(self.body.make().await?);
        *req.method_mut() = self.method.clone();
        *req.headers_mut() = self.headers.clone();
        match form {
            UriForm::Origin => {
                *req.uri_mut() = self.origin.clone();
                if !req.headers().contains_key(HOST) {
                    req.headers_mut().insert(HOST, self.host.clone());
                }
            }
            UriForm::Absolute => *req.uri_mut() = self.url.clone(),
        }
        Ok(req)
    }

    #[inline]
    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.url
    }
}

/// Run-scoped transport state: resolved addresses, TLS setup, pools.
pub enum Transport {
    Fast(Arc<FastConnector>),
    Http1(PooledClient),
    Http2(PooledClient),
}

impl Transport {
    /// Resolves the target and builds the selected backend. Any failure here is
    /// fatal for the run.
    pub async fn connect(spec: &RunSpec) -> Result<Self, FatalError> {
        let url = &spec.request.url;
        let host = url
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
            .ok_or_else(|| FatalError::InvalidUrl(format!("{url}: missing host")))?;
        let port = url
            .port_u16()
            .unwrap_or(if spec.is_https() { 443 } else { 80 });
        let addrs = resolve(&host, port).await?;
        tracing::debug!(%host, port, addrs = addrs.len(), client = %spec.client, "target resolved");

        let tls = self::tls::client_config(&spec.tls)?;
        Ok(match spec.client {
            ClientKind::Fast => {
                let tls = if spec.is_https() {
                    let server_name = ServerName::try_from(host.clone())
                        .map_err(|e| FatalError::InvalidUrl(format!("{url}: {e}")))?;
                    Some((Arc::new(tls), server_name))
                } else {
                    None
                };
                Transport::Fast(Arc::new(FastConnector::new(addrs, tls)))
            }
            ClientKind::Http1 => Transport::Http1(PooledClient::new(
                Protocol::Http1,
                tls,
                spec.keep_alive,
                spec.workers,
            )),
            ClientKind::Http2 => Transport::Http2(PooledClient::new(
                Protocol::Http2,
                tls,
                spec.keep_alive,
                spec.workers,
            )),
        })
    }

    /// A client for one worker. Fast clients own their connection, pooled
    /// clients share the run's pool.
    #[must_use]
    pub fn client(&self, timeout: Duration, keep_alive: bool) -> Client {
        let conn = match self {
            Transport::Fast(connector) => {
                Conn::Fast(FastClient::new(Arc::clone(connector), keep_alive))
            }
            Transport::Http1(pool) | Transport::Http2(pool) => Conn::Pooled(pool.clone()),
        };
        Client { conn, timeout }
    }

    #[must_use]
    pub fn kind(&self) -> ClientKind {
        match self {
            Transport::Fast(_) => ClientKind::Fast,
            Transport::Http1(_) => ClientKind::Http1,
            Transport::Http2(_) => ClientKind::Http2,
        }
    }

    /// Releases pooled connections. Workers' clients must already be dropped.
    pub fn teardown(self) {
        let kind = self.kind();
        drop(self);
        tracing::debug!(client = %kind, "transport released");
    }
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, FatalError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| FatalError::Resolve {
            host: host.to_owned(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(FatalError::NoAddress(host.to_owned()));
    }
    Ok(addrs)
}

enum Conn {
    Fast(FastClient),
    Pooled(PooledClient),
}

/// One worker's handle onto the transport.
pub struct Client {
    conn: Conn,
    timeout: Duration,
}

impl Client {
    /// Issues one request and drains its response. Exceeding the per-request
    /// deadline yields [`RequestError::Timeout`]; the attempt is never retried.
    pub async fn send(&mut self, target: &Target) -> Result<Completed, RequestError> {
        let timeout = self.timeout;
        let conn = &mut self.conn;
        let exchange = async move {
            match conn {
                Conn::Fast(client) => client.send(target).await,
                Conn::Pooled(client) => client.send(target).await,
            }
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RequestError::Timeout),
        }
    }

    pub fn teardown(self) {
        if let Conn::Fast(client) = self.conn {
            client.close();
        }
    }
}
