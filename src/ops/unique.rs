use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// Suppresses elements that were already emitted; the first occurrence wins.
///
/// The seen-set persists for the stream's lifetime, so memory grows with the
/// number of distinct elements. The single-consumer contract keeps the set
/// single-threaded without a lock.
///
/// Returned by [`unique`](crate::ConcurrentStreamExt::unique).
pub struct Unique<S>
where
    S: ConcurrentStream,
{
    upstream: S,
    seen: HashSet<S::Item>,
    done: bool,
}

impl<S> Unique<S>
where
    S: ConcurrentStream,
{
    pub(crate) fn new(upstream: S) -> Self {
        Unique {
            upstream,
            seen: HashSet::new(),
            done: false,
        }
    }
}

#[async_trait]
impl<S> ConcurrentStream for Unique<S>
where
    S: ConcurrentStream,
    S::Item: Hash + Eq + Clone,
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
                    if self.seen.insert(item.clone()) {
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
