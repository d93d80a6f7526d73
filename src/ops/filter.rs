use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// Keeps only the elements matching a predicate.
///
/// Returned by [`filter`](crate::ConcurrentStreamExt::filter).
pub struct Filter<S, P> {
    upstream: S,
    predicate: P,
    done: bool,
}

impl<S, P> Filter<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        Filter {
            upstream,
            predicate,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> ConcurrentStream for Filter<S, P>
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
                    if (self.predicate)(&item) {
                        return Ok(Some(item));
                    }
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

/// Like [`Filter`], but the predicate itself may fail; a predicate failure
/// cancels the chain exactly like a transform failure.
///
/// Returned by [`try_filter`](crate::ConcurrentStreamExt::try_filter).
pub struct TryFilter<S, P> {
    upstream: S,
    predicate: P,
    done: bool,
}

impl<S, P> TryFilter<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        TryFilter {
            upstream,
            predicate,
            done: false,
        }
    }
}

#[async_trait]
impl<S, P> ConcurrentStream for TryFilter<S, P>
where
    S: ConcurrentStream,
    P: FnMut(&S::Item) -> Result<bool, S::Error> + Send,
{
    type Item = S::Item;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<S::Item>, S::Error> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.upstream.next().await {
                Ok(Some(item)) => match (self.predicate)(&item) {
                    Ok(true) => return Ok(Some(item)),
                    Ok(false) => continue,
                    Err(e) => {
                        self.done = true;
                        self.upstream.cancel();
                        return Err(e);
                    }
                },
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
