use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;

use super::{Target, UriForm};
use crate::body::RequestBody;
use crate::drain::CountBodyFuture;
use crate::error::RequestError;
use crate::outcome::Completed;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

/// Standard pooled client. HTTP/1 keeps up to one idle connection per worker,
/// HTTP/2 multiplexes every worker's requests over the shared connection.
#[derive(Clone)]
pub struct PooledClient {
    client: Client<HttpsConnector<HttpConnector>, RequestBody>,
}

impl PooledClient {
    #[must_use]
    pub fn new(protocol: Protocol, tls: ClientConfig, keep_alive: bool, workers: usize) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        let builder = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http();
        let https = match protocol {
            Protocol::Http1 => builder.enable_http1().wrap_connector(http),
            Protocol::Http2 => builder.enable_http2().wrap_connector(http),
        };
        let client = Client::builder(TokioExecutor::new())
            .http2_only(protocol == Protocol::Http2)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(if keep_alive { workers } else { 0 })
            .pool_timer(TokioTimer::new())
            .timer(TokioTimer::new())
            .build(https);
        Self { client }
    }

    pub async fn send(&self, target: &Target) -> Result<Completed, RequestError> {
        let req = target
            .request(UriForm::Absolute)
            .await
            .map_err(|e| RequestError::Protocol(format!("request body: {e}")))?;
        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| RequestError::from_client(&e))?;
        let status = resp.status();
        let bytes_read = CountBodyFuture::new(resp.into_body())
            .await
            .map_err(|e| RequestError::from_hyper(&e))?;
        Ok(Completed { status, bytes_read })
    }
}
