use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Reads a response body to the end, keeping only the byte count.
    pub struct CountBodyFuture<B: Body> {
        #[pin]
        body: B,
        read: u64,
    }
}

impl<B> CountBodyFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, read: 0 }
    }
}

impl<B> Future for CountBodyFuture<B>
where
    B: Body,
{
    type Output = Result<u64, B::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.read));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(e) => return Poll::Ready(Err(e)),
            };
            // Trailers carry no payload.
            if let Some(data) = frame.data_ref() {
                *slf.read += data.remaining() as u64;
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.read));
            }
        }
    }
}
