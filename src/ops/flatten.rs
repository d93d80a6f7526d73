use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// Flattens a stream of streams, serializing each inner stream's output in
/// outer order.
///
/// An inner stream's failure propagates as the outer stream's failure. The
/// cancel handle covers the outer stream and every inner stream adopted so
/// far.
///
/// Returned by [`flatten`](crate::ConcurrentStreamExt::flatten).
pub struct Flatten<S>
where
    S: ConcurrentStream,
{
    outer: S,
    inner: Option<S::Item>,
    handle: CancelHandle,
    done: bool,
}

impl<S> Flatten<S>
where
    S: ConcurrentStream,
{
    pub(crate) fn new(outer: S) -> Self {
        let handle = CancelHandle::chained(vec![outer.cancel_handle()]);
        Flatten {
            outer,
            inner: None,
            handle,
            done: false,
        }
    }
}

#[async_trait]
impl<S, Inner> ConcurrentStream for Flatten<S>
where
    S: ConcurrentStream<Item = Inner>,
    Inner: ConcurrentStream<Error = S::Error> + 'static,
{
    type Item = Inner::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<Inner::Item>, S::Error> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(inner) = self.inner.as_mut() {
                match inner.next().await {
                    Ok(Some(item)) => return Ok(Some(item)),
                    Ok(None) => {
                        self.inner = None;
                    }
                    Err(e) => {
                        self.done = true;
                        self.handle.cancel();
                        return Err(e);
                    }
                }
                continue;
            }
            match self.outer.next().await {
                Ok(Some(child)) => {
                    // Late-chained so an already-captured cancel handle still
                    // reaches streams adopted after the fact.
                    self.handle.attach(child.cancel_handle());
                    self.inner = Some(child);
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    self.handle.cancel();
                    return Err(e);
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

/// Flattens a stream whose elements are synchronous iterables.
///
/// Returned by [`flatten_iter`](crate::ConcurrentStreamExt::flatten_iter).
pub struct FlattenIter<S>
where
    S: ConcurrentStream,
    S::Item: IntoIterator,
{
    outer: S,
    inner: Option<<S::Item as IntoIterator>::IntoIter>,
    done: bool,
}

impl<S> FlattenIter<S>
where
    S: ConcurrentStream,
    S::Item: IntoIterator,
{
    pub(crate) fn new(outer: S) -> Self {
        FlattenIter {
            outer,
            inner: None,
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for FlattenIter<S>
where
    S: ConcurrentStream,
    S::Item: IntoIterator,
    <S::Item as IntoIterator>::IntoIter: Send + 'static,
    <S::Item as IntoIterator>::Item: Send + 'static,
{
    type Item = <S::Item as IntoIterator>::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<Self::Item>, S::Error> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(inner) = self.inner.as_mut() {
                match inner.next() {
                    Some(item) => return Ok(Some(item)),
                    None => {
                        self.inner = None;
                    }
                }
            }
            match self.outer.next().await {
                Ok(Some(iterable)) => {
                    self.inner = Some(iterable.into_iter());
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    self.outer.cancel();
                    return Err(e);
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.outer.cancel_handle()
    }
}
