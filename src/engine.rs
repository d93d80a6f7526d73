//! The ordered fan-out engine behind `map` and the other heavy operators.
//!
//! Construction spawns a detached supervisor task that drains the upstream
//! stream, tags every element with a monotonically increasing index, and
//! launches one worker task per element. Workers push `(index, result)` pairs
//! into an internal channel as they finish — in completion order, which is
//! arbitrary. The consumer side holds a reorder buffer keyed by index and
//! releases results strictly in submission order.
//!
//! The channel is bounded: a consumer that stops pulling eventually parks the
//! workers on their sends, so memory stays proportional to
//! `channel_capacity + in-flight workers`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, trace};

use crate::cancel::CancelHandle;
use crate::config::MapConfig;
use crate::stream::ConcurrentStream;

/// An ordered concurrent map: elements of the upstream stream, transformed
/// concurrently, delivered in upstream order.
///
/// Returned by [`map`](crate::ConcurrentStreamExt::map),
/// [`try_map`](crate::ConcurrentStreamExt::try_map) and the `*_with`
/// variants. Dropping it cancels the supervisor, the workers, and the
/// upstream chain.
pub struct OrderedMap<T, E> {
    rx: mpsc::Receiver<Result<(u64, T), E>>,
    pending: HashMap<u64, T>,
    next_expected: u64,
    handle: CancelHandle,
    done: bool,
    closed: bool,
    // Keeps the supervisor owned by the stream; it is never awaited, only
    // cancelled through the handle.
    _supervisor: tokio::task::JoinHandle<()>,
}

impl<T, E> OrderedMap<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn spawn<S, F, Fut>(upstream: S, config: MapConfig, transform: F) -> Self
    where
        S: ConcurrentStream<Error = E> + 'static,
        F: FnMut(S::Item) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let handle = CancelHandle::chained(vec![upstream.cancel_handle()]);
        let supervisor = tokio::spawn(supervise(
            upstream,
            transform,
            tx,
            handle.clone(),
            config.max_concurrency,
        ));
        OrderedMap {
            rx,
            pending: HashMap::new(),
            next_expected: 0,
            handle,
            done: false,
            closed: false,
            _supervisor: supervisor,
        }
    }
}

#[async_trait]
impl<T, E> ConcurrentStream for OrderedMap<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    async fn next(&mut self) -> Result<Option<T>, E> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(value) = self.pending.remove(&self.next_expected) {
                self.next_expected += 1;
                return Ok(Some(value));
            }
            tokio::select! {
                biased;
                _ = self.handle.cancelled(), if !self.closed => {
                    // Stop accepting new results but drain whatever the
                    // workers managed to send before the cut.
                    self.rx.close();
                    self.closed = true;
                }
                message = self.rx.recv() => match message {
                    Some(Ok((index, value))) => {
                        self.pending.insert(index, value);
                    }
                    Some(Err(e)) => {
                        self.done = true;
                        self.handle.cancel();
                        return Err(e);
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl<T, E> Drop for OrderedMap<T, E> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl<T, E> fmt::Debug for OrderedMap<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMap")
            .field("next_expected", &self.next_expected)
            .field("buffered", &self.pending.len())
            .field("done", &self.done)
            .finish()
    }
}

/// The detached supervisor: pulls upstream, assigns indices, spawns workers,
/// and closes the result channel when everything has settled.
async fn supervise<S, T, F, Fut>(
    mut upstream: S,
    mut transform: F,
    tx: mpsc::Sender<Result<(u64, T), S::Error>>,
    handle: CancelHandle,
    max_concurrency: Option<usize>,
) where
    S: ConcurrentStream + 'static,
    T: Send + 'static,
    F: FnMut(S::Item) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, S::Error>> + Send + 'static,
{
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut index: u64 = 0;

    loop {
        while let Some(result) = workers.try_join_next() {
            reap(result, &handle);
        }
        if let Some(limit) = max_concurrency {
            while workers.len() >= limit {
                match workers.join_next().await {
                    Some(result) => reap(result, &handle),
                    None => break,
                }
            }
        }
        if handle.is_cancelled() {
            break;
        }

        let pulled = tokio::select! {
            biased;
            _ = handle.cancelled() => break,
            pulled = upstream.next() => pulled,
        };
        let value = match pulled {
            Ok(Some(value)) => value,
            Ok(None) => {
                trace!(submitted = index, "upstream drained");
                break;
            }
            Err(e) => {
                debug!("upstream failed, cancelling chain");
                tokio::select! {
                    biased;
                    _ = handle.cancelled() => {}
                    _ = tx.send(Err(e)) => {}
                }
                handle.cancel();
                break;
            }
        };

        let i = index;
        index += 1;
        let work = transform(value);

        // A scheduling point per submission keeps cancellation prompt even
        // when the upstream never suspends.
        tokio::task::yield_now().await;
        if handle.is_cancelled() {
            break;
        }

        let worker_tx = tx.clone();
        let worker_handle = handle.clone();
        workers.spawn(async move {
            tokio::task::yield_now().await;
            if worker_handle.is_cancelled() {
                return;
            }
            match work.await {
                Ok(output) => {
                    tokio::select! {
                        biased;
                        _ = worker_handle.cancelled() => {}
                        _ = worker_tx.send(Ok((i, output))) => {}
                    }
                }
                Err(e) => {
                    debug!(index = i, "transform failed, cancelling chain");
                    tokio::select! {
                        biased;
                        _ = worker_handle.cancelled() => {}
                        _ = worker_tx.send(Err(e)) => {}
                    }
                    worker_handle.cancel();
                }
            }
        });
    }

    while let Some(result) = workers.join_next().await {
        reap(result, &handle);
    }
    // Dropping `tx` here closes the channel: a clean close if the loop ended
    // by drain, a cancellation close otherwise.
}

fn reap(result: Result<(), JoinError>, handle: &CancelHandle) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("worker panicked, cancelling chain");
            handle.cancel();
        }
    }
}
