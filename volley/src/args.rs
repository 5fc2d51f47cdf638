use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Uri};
use volley_core::spec::DEFAULT_CONNECTIONS;
use volley_core::{BodySource, ClientKind, RunSpec};

use crate::tls_files;

/// Applied when neither a request count nor a duration is given.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
const MAX_PRINT_PARTS: usize = 3;

/// Fast HTTP(S) benchmarking tool
#[derive(Debug, Clone, Parser)]
#[command(name = "volley", bin_name = "volley")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Target url, `http://` is assumed when the scheme is missing
    #[arg(value_name = "URL")]
    pub url: String,

    /// Maximum number of concurrent connections
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONNECTIONS)]
    pub connections: usize,

    /// Number of requests
    #[arg(short = 'n', long, conflicts_with = "duration")]
    pub requests: Option<u64>,

    /// Duration of test, e.g. `10s` or `1m30s`
    #[arg(short = 'd', long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Socket/request timeout
    #[arg(short = 't', long, value_parser = humantime::parse_duration, default_value = "2s")]
    pub timeout: Duration,

    /// Rate limit in requests per second
    #[arg(short = 'r', long)]
    pub rate: Option<u64>,

    /// Request method
    #[arg(short = 'm', long, default_value = "GET")]
    pub method: Method,

    /// HTTP headers to use, `Name: value` (can be repeated)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Request body
    #[arg(short = 'b', long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// File to use as request body
    #[arg(short = 'f', long = "body-file", value_name = "PATH")]
    pub body_file: Option<PathBuf>,

    /// Stream the body instead of sending it as one buffer
    #[arg(short = 's', long)]
    pub stream: bool,

    /// Controls whether the client verifies the server's certificate chain
    /// and host name
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Path to the client's TLS certificate
    #[arg(long, value_name = "PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the client's TLS certificate private key
    #[arg(long, value_name = "PATH", requires = "cert")]
    pub key: Option<PathBuf>,

    /// Use one raw connection per worker (default)
    #[arg(long, conflicts_with_all = ["http1", "http2"])]
    pub fasthttp: bool,

    /// Use the pooled HTTP/1.x client
    #[arg(long, conflicts_with = "http2")]
    pub http1: bool,

    /// Use the pooled HTTP/2 client
    #[arg(long)]
    pub http2: bool,

    /// Open a new connection for every request
    #[arg(short = 'a', long = "disable-keep-alives")]
    pub disable_keep_alives: bool,

    /// Print latency statistics
    #[arg(short = 'l', long)]
    pub latencies: bool,

    /// Specifies what to output. Comma-separated list of values `intro`
    /// (short: `i`), `progress` (short: `p`), `result` (short: `r`)
    #[arg(
        short = 'p',
        long = "print",
        value_name = "SPEC",
        value_parser = PrintSpec::parse,
        default_value = "intro,progress,result",
    )]
    pub print: PrintSpec,

    /// Don't output anything
    #[arg(short = 'q', long = "no-print")]
    pub no_print: bool,

    /// Result output format
    #[arg(short = 'o', long, value_enum, default_value_t = Format::PlainText)]
    pub format: Format,

    /// Debug logging; use RUST_LOG for finer control
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    #[must_use]
    pub fn client_kind(&self) -> ClientKind {
        if self.http1 {
            ClientKind::Http1
        } else if self.http2 {
            ClientKind::Http2
        } else {
            ClientKind::Fast
        }
    }

    /// What to print once `--no-print` is taken into account.
    #[must_use]
    pub fn effective_print(&self) -> PrintSpec {
        if self.no_print {
            PrintSpec::NONE
        } else {
            self.print
        }
    }

    pub fn to_run_spec(&self) -> anyhow::Result<RunSpec> {
        let url = parse_url(&self.url)?;
        let mut spec = RunSpec::new(url);
        spec.workers = self.connections;
        spec.requests = self.requests;
        spec.duration = self.duration;
        if spec.requests.is_none() && spec.duration.is_none() {
            spec.duration = Some(DEFAULT_DURATION);
        }
        spec.rate = self.rate;
        spec.timeout = self.timeout;
        spec.request.method = self.method.clone();
        for (name, value) in &self.headers {
            spec.request.headers.append(name.clone(), value.clone());
        }
        spec.request.body = match (&self.body, &self.body_file) {
            (Some(body), _) => BodySource::Bytes(Bytes::from(body.clone())),
            (None, Some(path)) => BodySource::File(path.clone()),
            (None, None) => BodySource::Empty,
        };
        spec.stream = self.stream;
        spec.tls.insecure = self.insecure;
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            spec.tls.identity = Some(tls_files::load_identity(cert, key)?);
        }
        spec.client = self.client_kind();
        spec.keep_alive = !self.disable_keep_alives;
        Ok(spec)
    }
}

fn parse_url(raw: &str) -> anyhow::Result<Uri> {
    let owned;
    let raw = if raw.contains("://") {
        raw
    } else {
        owned = format!("http://{raw}");
        &owned
    };
    raw.parse::<Uri>()
        .with_context(|| format!("Invalid url {raw:?}"))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("{0:?} is not a valid header, expected `Name: value`")]
    MissingColon(String),
    #[error("invalid header name {0:?}")]
    Name(String),
    #[error("invalid header value for {0:?}")]
    Value(String),
}

pub fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), HeaderError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| HeaderError::MissingColon(raw.to_owned()))?;
    let name = name.trim();
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| HeaderError::Name(name.to_owned()))?;
    let header_value =
        HeaderValue::from_str(value.trim()).map_err(|_| HeaderError::Value(name.to_owned()))?;
    Ok((header_name, header_value))
}

/// Which report sections to write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrintSpec {
    pub intro: bool,
    pub progress: bool,
    pub result: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrintSpecError {
    #[error("empty print spec is not a valid print spec")]
    Empty,
    #[error("{0:?} is not a valid part of print spec")]
    InvalidPart(String),
    #[error("Spec {0:?} has too many parts, at most 3 are allowed")]
    TooManyParts(String),
}

impl PrintSpec {
    pub const NONE: Self = Self {
        intro: false,
        progress: false,
        result: false,
    };

    pub fn parse(raw: &str) -> Result<Self, PrintSpecError> {
        if raw.is_empty() {
            return Err(PrintSpecError::Empty);
        }
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() > MAX_PRINT_PARTS {
            return Err(PrintSpecError::TooManyParts(raw.to_owned()));
        }
        let mut spec = Self::NONE;
        for part in parts {
            match part.trim() {
                "i" | "intro" => spec.intro = true,
                "p" | "progress" => spec.progress = true,
                "r" | "result" => spec.result = true,
                other => return Err(PrintSpecError::InvalidPart(other.to_owned())),
            }
        }
        Ok(spec)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Format {
    PlainText,
    Json,
}
