//! Source adapters: the entry points that turn existing values and streams
//! into a [`ConcurrentStream`].
//!
//! All sources are serial pull-throughs. None of them spawns a task, and
//! cancelling one simply makes the following `next()` report end-of-stream.

use std::any::Any;
use std::convert::Infallible;
use std::marker::PhantomData;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;

use crate::cancel::CancelHandle;
use crate::error::TypeMismatch;
use crate::stream::ConcurrentStream;

/// Create an infallible stream from anything iterable.
///
/// ```ignore
/// let doubled = from_iter(0..10).map(|x| async move { x * 2 });
/// ```
pub fn from_iter<I>(into: I) -> Iter<I::IntoIter>
where
    I: IntoIterator,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    Iter {
        iter: into.into_iter(),
        handle: CancelHandle::new(),
        done: false,
    }
}

/// An empty stream that reports end-of-stream on the first `next()`.
pub fn empty<T>() -> Iter<std::iter::Empty<T>>
where
    T: Send + 'static,
{
    from_iter(std::iter::empty())
}

/// A single-element stream.
pub fn once<T>(item: T) -> Iter<std::iter::Once<T>>
where
    T: Send + 'static,
{
    from_iter(std::iter::once(item))
}

/// Stream over a synchronous iterator. Never fails.
pub struct Iter<I> {
    iter: I,
    handle: CancelHandle,
    done: bool,
}

#[async_trait]
impl<I> ConcurrentStream for Iter<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;
    type Error = Infallible;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.done || self.handle.is_cancelled() {
            self.done = true;
            return Ok(None);
        }
        let item = self.iter.next();
        if item.is_none() {
            self.done = true;
        }
        Ok(item)
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

/// Adapt a host async iterator (a [`futures_core::Stream`]) into an
/// infallible stream.
pub fn from_stream<S>(stream: S) -> FromStream<S>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    FromStream {
        inner: Box::pin(stream),
        handle: CancelHandle::new(),
        done: false,
    }
}

/// Stream over a host async iterator. Never fails; the iterator's own
/// suspension points are the only awaits.
pub struct FromStream<S> {
    inner: Pin<Box<S>>,
    handle: CancelHandle,
    done: bool,
}

#[async_trait]
impl<S> ConcurrentStream for FromStream<S>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    type Item = S::Item;
    type Error = Infallible;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.done || self.handle.is_cancelled() {
            self.done = true;
            return Ok(None);
        }
        let item = self.inner.next().await;
        if item.is_none() {
            self.done = true;
        }
        Ok(item)
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

/// Adapt a host async iterator of `Result`s; the `Err` arm becomes the
/// stream's failure type.
pub fn from_try_stream<S, T, E>(stream: S) -> FromTryStream<S>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    FromTryStream {
        inner: Box::pin(stream),
        handle: CancelHandle::new(),
        done: false,
    }
}

/// Stream over a fallible host async iterator.
pub struct FromTryStream<S> {
    inner: Pin<Box<S>>,
    handle: CancelHandle,
    done: bool,
}

#[async_trait]
impl<S, T, E> ConcurrentStream for FromTryStream<S>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.done || self.handle.is_cancelled() {
            self.done = true;
            return Ok(None);
        }
        match self.inner.next().await {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

/// Adapt an iterator of dynamically typed elements, silently skipping
/// elements that are not a `T`.
pub fn from_any_iter<T, I>(into: I) -> AnyIter<T, I::IntoIter>
where
    I: IntoIterator<Item = Box<dyn Any + Send>>,
    I::IntoIter: Send,
    T: Send + 'static,
{
    AnyIter {
        iter: into.into_iter(),
        handle: CancelHandle::new(),
        done: false,
        _element: PhantomData,
    }
}

/// Like [`from_any_iter`], but a mismatched element is an error instead of
/// being skipped.
pub fn from_any_iter_strict<T, I>(into: I) -> AnyIterStrict<T, I::IntoIter>
where
    I: IntoIterator<Item = Box<dyn Any + Send>>,
    I::IntoIter: Send,
    T: Send + 'static,
{
    AnyIterStrict {
        iter: into.into_iter(),
        handle: CancelHandle::new(),
        done: false,
        _element: PhantomData,
    }
}

/// Stream over dynamically typed elements; mismatches are skipped.
pub struct AnyIter<T, I> {
    iter: I,
    handle: CancelHandle,
    done: bool,
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, I> ConcurrentStream for AnyIter<T, I>
where
    I: Iterator<Item = Box<dyn Any + Send>> + Send,
    T: Send + 'static,
{
    type Item = T;
    type Error = Infallible;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.done || self.handle.is_cancelled() {
            self.done = true;
            return Ok(None);
        }
        for element in self.iter.by_ref() {
            if let Ok(typed) = element.downcast::<T>() {
                return Ok(Some(*typed));
            }
        }
        self.done = true;
        Ok(None)
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

/// Stream over dynamically typed elements; mismatches fail the stream.
pub struct AnyIterStrict<T, I> {
    iter: I,
    handle: CancelHandle,
    done: bool,
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, I> ConcurrentStream for AnyIterStrict<T, I>
where
    I: Iterator<Item = Box<dyn Any + Send>> + Send,
    T: Send + 'static,
{
    type Item = T;
    type Error = TypeMismatch;

    async fn next(&mut self) -> Result<Option<Self::Item>, Self::Error> {
        if self.done || self.handle.is_cancelled() {
            self.done = true;
            return Ok(None);
        }
        match self.iter.next() {
            Some(element) => match element.downcast::<T>() {
                Ok(typed) => Ok(Some(*typed)),
                Err(_) => {
                    self.done = true;
                    Err(TypeMismatch {
                        expected: std::any::type_name::<T>(),
                    })
                }
            },
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}
