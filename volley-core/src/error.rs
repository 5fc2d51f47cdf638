use std::fmt;

use thiserror::Error;

/// Errors that abort a run before any worker starts.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("invalid run spec: {0}")]
    InvalidSpec(String),

    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no addresses found for {0}")]
    NoAddress(String),

    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to prepare request body: {0}")]
    Body(#[source] std::io::Error),

    #[error("failed to create latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Classification of a failed request attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
        })
    }
}

/// A single failed request. Recorded as an outcome, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Protocol(String),
}

impl RequestError {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Timeout => ErrorKind::Timeout,
            RequestError::Connection(_) => ErrorKind::Connection,
            RequestError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    pub(crate) fn connection(err: impl std::error::Error) -> Self {
        RequestError::Connection(chain(&err))
    }

    pub(crate) fn from_hyper(err: &hyper::Error) -> Self {
        if err.is_timeout() {
            return RequestError::Timeout;
        }
        if err.is_closed()
            || err.is_canceled()
            || err.is_incomplete_message()
            || err.is_body_write_aborted()
        {
            return RequestError::Connection(chain(err));
        }
        let io_source = std::error::Error::source(err)
            .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
        if io_source {
            RequestError::Connection(chain(err))
        } else {
            RequestError::Protocol(chain(err))
        }
    }

    pub(crate) fn from_client(err: &hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            return RequestError::Connection(chain(err));
        }
        match std::error::Error::source(err).and_then(|s| s.downcast_ref::<hyper::Error>()) {
            Some(inner) => RequestError::from_hyper(inner),
            None => RequestError::Protocol(chain(err)),
        }
    }
}

/// Joins an error and its sources into one line, hyper's top level messages
/// alone are too terse to tell failures apart.
fn chain(err: &(dyn std::error::Error + '_)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !msg.ends_with(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = cause.source();
    }
    msg
}
