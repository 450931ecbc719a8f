use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Polls a body to its end, discarding the data and counting the bytes seen.
    ///
    /// A response body has to be read to completion before its connection can go
    /// back to the client pool, the load generator has no use for the content.
    pub struct DrainBodyFuture<B: Body> {
        #[pin]
        body: B,
        drained: usize,
    }
}

impl<B> DrainBodyFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, drained: 0 }
    }
}

impl<B> Future for DrainBodyFuture<B>
where
    B: Body,
{
    type Output = Result<usize, B::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.drained));
            };
            let frame = match next {
                Ok(frame) => frame,
                Err(e) => return Poll::Ready(Err(e)),
            };
            // Trailers carry no payload.
            if let Some(data) = frame.data_ref() {
                *slf.drained += data.remaining();
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.drained));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DrainBodyFuture;
    use crate::{byte_body, empty_body};

    #[tokio::test]
    async fn drains_full_body() {
        let drained = DrainBodyFuture::new(byte_body(&b"{\"ok\":true}"[..]))
            .await
            .unwrap();
        assert_eq!(drained, 11);
    }

    #[tokio::test]
    async fn drains_empty_body() {
        let drained = DrainBodyFuture::new(empty_body()).await.unwrap();
        assert_eq!(drained, 0);
    }
}
