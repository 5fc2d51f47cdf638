use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::client::ClientKind;
use crate::error::FatalError;

pub const DEFAULT_CONNECTIONS: usize = 125;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Immutable configuration of a single run.
///
/// `requests` and `duration` are mutually exclusive. When neither is set the
/// run continues until the stop handle is cancelled.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub workers: usize,
    pub requests: Option<u64>,
    pub duration: Option<Duration>,
    /// Aggregate requests per second across all workers.
    pub rate: Option<u64>,
    pub timeout: Duration,
    pub request: RequestTemplate,
    /// Send the body as a chunked stream instead of a sized buffer.
    pub stream: bool,
    pub tls: TlsOptions,
    pub client: ClientKind,
    pub keep_alive: bool,
    /// Also feed latencies of failed attempts into the distribution.
    pub record_failed_latencies: bool,
    pub progress_interval: Duration,
}

impl RunSpec {
    #[must_use]
    pub fn new(url: Uri) -> Self {
        Self {
            workers: DEFAULT_CONNECTIONS,
            requests: None,
            duration: None,
            rate: None,
            timeout: DEFAULT_TIMEOUT,
            request: RequestTemplate::get(url),
            stream: false,
            tls: TlsOptions::default(),
            client: ClientKind::default(),
            keep_alive: true,
            record_failed_latencies: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn validate(&self) -> Result<(), FatalError> {
        let invalid = |msg: &str| Err(FatalError::InvalidSpec(msg.to_owned()));
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.requests.is_some() && self.duration.is_some() {
            return invalid("request count and duration are mutually exclusive");
        }
        if self.requests == Some(0) {
            return invalid("request count must be positive");
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return invalid("duration must be positive");
        }
        if self.rate == Some(0) {
            return invalid("rate must be positive");
        }
        if self.timeout.is_zero() {
            return invalid("timeout must be positive");
        }
        if self.progress_interval.is_zero() {
            return invalid("progress interval must be positive");
        }
        let url = &self.request.url;
        match url.scheme_str() {
            Some("http" | "https") => {}
            _ => {
                return Err(FatalError::InvalidUrl(format!(
                    "{url}: scheme must be http or https"
                )))
            }
        }
        if url.host().is_none() {
            return Err(FatalError::InvalidUrl(format!("{url}: missing host")));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.request.url.scheme_str() == Some("https")
    }
}

#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: Method,
    pub url: Uri,
    pub headers: HeaderMap,
    pub body: BodySource,
}

impl RequestTemplate {
    #[must_use]
    pub fn get(url: Uri) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: BodySource::Empty,
        }
    }
}

/// Where request bodies come from.
///
/// `File` is read once at run start unless the run streams, in which case the
/// file is reopened and read incrementally for every request.
#[derive(Debug, Clone, Default)]
pub enum BodySource {
    #[default]
    Empty,
    Bytes(Bytes),
    File(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip server certificate verification.
    pub insecure: bool,
    pub identity: Option<ClientIdentity>,
}

/// Client certificate chain and key, already decoded from PEM by the caller.
#[derive(Debug)]
pub struct ClientIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: Arc<PrivateKeyDer<'static>>,
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self {
            certs: self.certs.clone(),
            key: Arc::clone(&self.key),
        }
    }
}
