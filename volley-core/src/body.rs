use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Body, Frame};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::FatalError;
use crate::spec::BodySource;

pub type RequestBody = BoxBody<Bytes, io::Error>;

const CHUNK_SIZE: usize = 16 * 1024;

#[inline]
pub fn empty_body() -> RequestBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> RequestBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Produces a fresh body for every request from a [`BodySource`].
///
/// Buffered sources share one `Bytes` allocation across all requests. Streamed
/// files are reopened per request and never fully buffered.
#[derive(Debug, Clone)]
pub enum BodyFactory {
    Empty,
    Full(Bytes),
    Chunked(Bytes),
    File(Arc<Path>),
}

impl BodyFactory {
    pub async fn prepare(source: &BodySource, stream: bool) -> Result<Self, FatalError> {
        Ok(match (source, stream) {
            (BodySource::Empty, false) => BodyFactory::Empty,
            (BodySource::Empty, true) => BodyFactory::Chunked(Bytes::new()),
            (BodySource::Bytes(bytes), false) => BodyFactory::Full(bytes.clone()),
            (BodySource::Bytes(bytes), true) => BodyFactory::Chunked(bytes.clone()),
            (BodySource::File(path), false) => {
                let bytes = tokio::fs::read(path).await.map_err(FatalError::Body)?;
                BodyFactory::Full(Bytes::from(bytes))
            }
            (BodySource::File(path), true) => {
                // A missing file fails the run, not every request.
                tokio::fs::metadata(path).await.map_err(FatalError::Body)?;
                BodyFactory::File(Arc::from(path.as_path()))
            }
        })
    }

    pub async fn make(&self) -> io::Result<RequestBody> {
        Ok(match self {
            BodyFactory::Empty => empty_body(),
            BodyFactory::Full(bytes) => byte_body(bytes.clone()),
            BodyFactory::Chunked(bytes) => ChunkedBody::new(bytes.clone()).boxed(),
            BodyFactory::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                ReaderBody::new(file).boxed()
            }
        })
    }
}

pin_project! {
    /// Streams any reader as data frames without a known length.
    pub struct ReaderBody<R> {
        #[pin]
        reader: R,
        chunk: Box<[u8]>,
        done: bool,
    }
}

impl<R: AsyncRead> ReaderBody<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk: vec![0; CHUNK_SIZE].into_boxed_slice(),
            done: false,
        }
    }
}

impl<R: AsyncRead> Body for ReaderBody<R> {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let slf = self.project();
        if *slf.done {
            return Poll::Ready(None);
        }
        let mut buf = ReadBuf::new(&mut slf.chunk[..]);
        if let Err(e) = ready!(slf.reader.poll_read(cx, &mut buf)) {
            *slf.done = true;
            return Poll::Ready(Some(Err(e)));
        }
        let filled = buf.filled();
        if filled.is_empty() {
            *slf.done = true;
            return Poll::Ready(None);
        }
        Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(filled)))))
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }
}

/// Sends an in-memory payload in fixed-size frames with no length hint, so
/// HTTP/1 falls back to chunked transfer encoding.
pub struct ChunkedBody {
    remaining: Bytes,
}

impl ChunkedBody {
    #[inline]
    #[must_use]
    pub fn new(bytes: Bytes) -> Self {
        Self { remaining: bytes }
    }
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let slf = self.get_mut();
        if slf.remaining.is_empty() {
            return Poll::Ready(None);
        }
        let at = slf.remaining.len().min(CHUNK_SIZE);
        Poll::Ready(Some(Ok(Frame::data(slf.remaining.split_to(at)))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining.is_empty()
    }
}
