//! Bridges from a [`ConcurrentStream`] back into the `futures` ecosystem.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use async_stream::stream;
use futures_core::Stream;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use pin_project_lite::pin_project;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

type NextFuture<S> = BoxFuture<
    'static,
    (
        S,
        Result<Option<<S as ConcurrentStream>::Item>, <S as ConcurrentStream>::Error>,
    ),
>;

struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pin_project! {
    /// A `futures_core::Stream` view of a [`ConcurrentStream`], yielding
    /// `Result` items.
    ///
    /// Dropping it cancels the wrapped chain. Because the `Stream` trait has
    /// no cancellation surface, [`cancel_handle`](IntoStream::cancel_handle)
    /// is exposed directly for consumers that need to cancel from elsewhere.
    ///
    /// Returned by [`into_stream`](crate::ConcurrentStreamExt::into_stream).
    pub struct IntoStream<S>
    where
        S: ConcurrentStream,
    {
        stream: Option<S>,
        in_flight: Option<NextFuture<S>>,
        done: bool,
        guard: CancelOnDrop,
    }
}

impl<S> IntoStream<S>
where
    S: ConcurrentStream,
{
    pub(crate) fn new(stream: S) -> Self {
        let guard = CancelOnDrop(stream.cancel_handle());
        IntoStream {
            stream: Some(stream),
            in_flight: None,
            done: false,
            guard,
        }
    }

    /// A clone of the wrapped chain's cancel handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.guard.0.clone()
    }
}

impl<S> Stream for IntoStream<S>
where
    S: ConcurrentStream + 'static,
{
    type Item = Result<S::Item, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        loop {
            if *this.done {
                return Poll::Ready(None);
            }
            if let Some(in_flight) = this.in_flight.as_mut() {
                let (stream, result) = ready!(in_flight.as_mut().poll(cx));
                *this.in_flight = None;
                *this.stream = Some(stream);
                return Poll::Ready(match result {
                    Ok(Some(item)) => Some(Ok(item)),
                    Ok(None) => {
                        *this.done = true;
                        None
                    }
                    Err(e) => {
                        *this.done = true;
                        Some(Err(e))
                    }
                });
            }
            // The stream round-trips through the in-flight future so the
            // borrow lives inside it.
            let mut stream = match this.stream.take() {
                Some(stream) => stream,
                None => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
            };
            *this.in_flight = Some(Box::pin(async move {
                let result = stream.next().await;
                (stream, result)
            }));
        }
    }
}

/// Bridge an infallible chain to a plain stream of items.
pub(crate) fn item_stream<S>(mut source: S) -> futures_util::stream::BoxStream<'static, S::Item>
where
    S: ConcurrentStream<Error = Infallible> + 'static,
{
    stream! {
        loop {
            match source.next().await {
                Ok(Some(item)) => yield item,
                Ok(None) => break,
                Err(e) => match e {},
            }
        }
    }
    .boxed()
}
