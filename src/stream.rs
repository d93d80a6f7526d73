//! The core stream contract.
//!
//! A [`ConcurrentStream`] is a singly-consumed, pull-based pipeline: one
//! element per `next()` call, in a fixed order, until end-of-stream. It is
//! deliberately minimal — three required items — so that sources, operators,
//! and bridges all meet at the same seam.

use async_trait::async_trait;

use crate::cancel::CancelHandle;

/// A pull-based, single-consumer, cancellable stream of elements.
///
/// # Contract
///
/// - `next()` produces elements strictly in stream order. Taking `&mut self`
///   makes concurrent `next()` calls on one stream unrepresentable; the
///   stream is *fragile* — an element returned once is gone.
/// - After end-of-stream (`Ok(None)`) or a surfaced error, every later
///   `next()` returns `Ok(None)`.
/// - [`cancel`](ConcurrentStream::cancel) (or invoking any clone of the
///   [`CancelHandle`]) stops upstream work. Cancellation is quiet: `next()`
///   may still deliver results that were already buffered, then reports
///   end-of-stream. It is never surfaced as an error.
/// - Errors surface exactly once, and the chain cancels itself before the
///   error reaches the caller.
///
/// Infallible streams use `Error = Infallible`, so `match` on the error arm
/// is statically dead and `collect()` style terminals cannot fail.
#[async_trait]
pub trait ConcurrentStream: Send {
    /// The element type.
    type Item: Send + 'static;
    /// The failure type; [`std::convert::Infallible`] for chains that cannot
    /// fail.
    type Error: Send + 'static;

    /// Pull the next element.
    ///
    /// Returns `Ok(Some(item))`, `Ok(None)` once drained or cancelled, or
    /// `Err(e)` exactly once if the chain failed.
    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error>;

    /// A clone of this stream's shared cancel handle.
    ///
    /// The handle stays valid after the stream is dropped, so it can be
    /// stashed in shutdown paths that no longer own the stream.
    fn cancel_handle(&self) -> CancelHandle;

    /// Request cancellation of this stream and everything upstream of it.
    fn cancel(&self) {
        self.cancel_handle().cancel();
    }
}

/// An owned, type-erased stream.
pub type BoxConcurrentStream<T, E> = Box<dyn ConcurrentStream<Item = T, Error = E>>;

#[async_trait]
impl<S> ConcurrentStream for Box<S>
where
    S: ConcurrentStream + ?Sized,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        (**self).next().await
    }

    fn cancel_handle(&self) -> CancelHandle {
        (**self).cancel_handle()
    }
}
