//! Failure-type adapters.
//!
//! These keep the failure type of a chain honest: infallible chains stay
//! infallible, a single fallible layer keeps its concrete type, and widening
//! to [`BoxError`](crate::error::BoxError) happens only where the caller asks
//! for it.

use std::convert::Infallible;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::error::BoxError;
use crate::stream::ConcurrentStream;

/// Lifts an infallible stream into any failure type.
///
/// The error arm is statically unreachable; this only changes the type so an
/// infallible source can feed a fallible transform.
///
/// Returned by [`fallible`](crate::ConcurrentStreamExt::fallible).
pub struct Fallible<S, E> {
    upstream: S,
    _error: PhantomData<fn() -> E>,
}

impl<S, E> Fallible<S, E> {
    pub(crate) fn new(upstream: S) -> Self {
        Fallible {
            upstream,
            _error: PhantomData,
        }
    }
}

#[async_trait]
impl<S, E> ConcurrentStream for Fallible<S, E>
where
    S: ConcurrentStream<Error = Infallible>,
    E: Send + 'static,
{
    type Item = S::Item;
    type Error = E;

    async fn next(&mut self) -> Result<Option<S::Item>, E> {
        match self.upstream.next().await {
            Ok(item) => Ok(item),
            Err(e) => match e {},
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Maps the failure type with a conversion function.
///
/// Returned by [`map_err`](crate::ConcurrentStreamExt::map_err).
pub struct MapErr<S, F> {
    upstream: S,
    convert: F,
    done: bool,
}

impl<S, F> MapErr<S, F> {
    pub(crate) fn new(upstream: S, convert: F) -> Self {
        MapErr {
            upstream,
            convert,
            done: false,
        }
    }
}

#[async_trait]
impl<S, F, E2> ConcurrentStream for MapErr<S, F>
where
    S: ConcurrentStream,
    F: FnMut(S::Error) -> E2 + Send,
    E2: Send + 'static,
{
    type Item = S::Item;
    type Error = E2;

    async fn next(&mut self) -> Result<Option<S::Item>, E2> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.next().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.upstream.cancel();
                Err((self.convert)(e))
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Widens the failure type to [`BoxError`].
///
/// This is the crate's only lossy type erasure; use it where two chains with
/// different concrete failure types have to meet.
///
/// Returned by [`boxed_err`](crate::ConcurrentStreamExt::boxed_err).
pub struct BoxErr<S> {
    upstream: S,
    done: bool,
}

impl<S> BoxErr<S> {
    pub(crate) fn new(upstream: S) -> Self {
        BoxErr {
            upstream,
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for BoxErr<S>
where
    S: ConcurrentStream,
    S::Error: Into<BoxError>,
{
    type Item = S::Item;
    type Error = BoxError;

    async fn next(&mut self) -> Result<Option<S::Item>, BoxError> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.next().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.upstream.cancel();
                Err(e.into())
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}
