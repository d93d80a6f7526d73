use async_trait::async_trait;

use crate::cancel::CancelHandle;
use crate::stream::ConcurrentStream;

/// Concatenation: all of `first`, then all of `second`.
///
/// Cancelling the chain cancels both inputs, including a `second` that has
/// not produced anything yet.
///
/// Returned by [`chain`](crate::ConcurrentStreamExt::chain).
pub struct Chain<A, B> {
    first: A,
    second: B,
    handle: CancelHandle,
    in_second: bool,
    done: bool,
}

impl<A, B> Chain<A, B>
where
    A: ConcurrentStream,
    B: ConcurrentStream,
{
    pub(crate) fn new(first: A, second: B) -> Self {
        let handle = CancelHandle::chained(vec![first.cancel_handle(), second.cancel_handle()]);
        Chain {
            first,
            second,
            handle,
            in_second: false,
            done: false,
        }
    }
}

#[async_trait]
impl<A, B> ConcurrentStream for Chain<A, B>
where
    A: ConcurrentStream,
    B: ConcurrentStream<Item = A::Item, Error = A::Error>,
{
    type Item = A::Item;
    type Error = A::Error;

    async fn next(&mut self) -> Result<Option<A::Item>, A::Error> {
        if self.done {
            return Ok(None);
        }
        if !self.in_second {
            match self.first.next().await {
                Ok(Some(item)) => return Ok(Some(item)),
                Ok(None) => self.in_second = true,
                Err(e) => {
                    self.done = true;
                    self.handle.cancel();
                    return Err(e);
                }
            }
        }
        match self.second.next().await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.handle.cancel();
                Err(e)
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}
