use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// Drops the `None`s out of a stream of `Option`s.
///
/// Returned by [`compacted`](crate::ConcurrentStreamExt::compacted).
pub struct Compacted<S> {
    upstream: S,
    done: bool,
}

impl<S> Compacted<S> {
    pub(crate) fn new(upstream: S) -> Self {
        Compacted {
            upstream,
            done: false,
        }
    }
}

#[async_trait]
impl<S, T> ConcurrentStream for Compacted<S>
where
    S: ConcurrentStream<Item = Option<T>>,
    T: Send + 'static,
{
    type Item = T;
    type Error = S::Error;

    async fn next(&mut self) -> Result<Option<T>, S::Error> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.upstream.next().await {
                Ok(Some(Some(item))) => return Ok(Some(item)),
                Ok(Some(None)) => continue,
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
