//! Slicing operators: take, skip, and their predicate variants.

use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// At most the first `n` elements. Upstream is cancelled as soon as the
/// limit is reached, releasing any in-flight workers.
///
/// Returned by [`take`](crate::ConcurrentStreamExt::take).
pub struct Take<S> {
    upstream: S,
    remaining: usize,
    done: bool,
}

impl<S> Take<S> {
    pub(crate) fn new(upstream: S, n: usize) -> Self {
        Take {
            upstream,
            remaining: n,
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for Take<S>
where
    S: ConcurrentStream,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<S::Item>, S::Error> {
        if self.done {
            return Ok(None);
        }
        if self.remaining == 0 {
            self.done = true;
            self.upstream.cancel();
            return Ok(None);
        }
        match self.upstream.next().await {
            Ok(Some(item)) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.done = true;
                    self.upstream.cancel();
                }
                Ok(Some(item))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.upstream.cancel();
                Err(e)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Everything after the first `n` elements.
///
/// Returned by [`skip`](crate::ConcurrentStreamExt::skip).
pub struct Skip<S> {
    upstream: S,
    remaining: usize,
    done: bool,
}

impl<S> Skip<S> {
    pub(crate) fn new(upstream: S, n: usize) -> Self {
        Skip {
            upstream,
            remaining: n,
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for Skip<S>
where
    S: ConcurrentStream,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<S::Item>, S::Error> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.upstream.next().await {
                Ok(Some(item)) => {
                    if self.remaining == 0 {
                        return Ok(Some(item));
                    }
                    self.remaining -= 1;
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    self.upstream.cancel();
                    return Err(e);
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Elements while the predicate holds; ends (and cancels upstream) at the
/// first mismatch, which is consumed and discarded.
///
/// Returned by [`take_while`](crate::ConcurrentStreamExt::take_while).
pub struct TakeWhile<S, P> {
    upstream: S,
    predicate: P,
    done: bool,
}

impl<S, P> TakeWhile<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        TakeWhile {
            upstream,
            predicate,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> ConcurrentStream for TakeWhile<S, P>
where
    S: ConcurrentStream,
    P: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<S::Item>, S::Error> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.next().await {
            Ok(Some(item)) => {
                if (self.predicate)(&item) {
                    Ok(Some(item))
                } else {
                    self.done = true;
                    self.upstream.cancel();
                    Ok(None)
                }
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.upstream.cancel();
                Err(e)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Skips elements while the predicate holds, then passes the rest through.
///
/// Returned by [`skip_while`](crate::ConcurrentStreamExt::skip_while).
pub struct SkipWhile<S, P> {
    upstream: S,
    predicate: P,
    skipping: bool,
    done: bool,
}

impl<S, P> SkipWhile<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        SkipWhile {
            upstream,
            predicate,
            skipping: true,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> ConcurrentStream for SkipWhile<S, P>
where
    S: ConcurrentStream,
    P: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<S::Item>, S::Error> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.upstream.next().await {
                Ok(Some(item)) => {
                    if self.skipping && (self.predicate)(&item) {
                        continue;
                    }
                    self.skipping = false;
                    return Ok(Some(item));
                }
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    self.upstream.cancel();
                    return Err(e);
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}

/// Pairs each element with its emission index, starting at 0.
///
/// Returned by [`enumerate`](crate::ConcurrentStreamExt::enumerate).
pub struct Enumerate<S> {
    upstream: S,
    index: u64,
    done: bool,
}

impl<S> Enumerate<S> {
    pub(crate) fn new(upstream: S) -> Self {
        Enumerate {
            upstream,
            index: 0,
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for Enumerate<S>
where
    S: ConcurrentStream,
{
    type Item = (u64, S::Item);
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<(u64, S::Item)>, S::Error> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.next().await {
            Ok(Some(item)) => {
                let index = self.index;
                self.index += 1;
                Ok(Some((index, item)))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.upstream.cancel();
                Err(e)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.upstream.cancel_handle()
    }
}
