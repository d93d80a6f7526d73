//! The combinator surface: one extension trait providing the fan-out
//! operators, the lightweight wrappers, the terminals, and the bridges out.

use std::convert::Infallible;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::task::{JoinError, JoinSet};

use crate::bridge::{self, IntoStream};
use crate::cancel::CancelHandle;
use crate::config::MapConfig;
use crate::engine::OrderedMap;
use crate::error::BoxError;
use crate::ops::{
    BoxErr, Chain, Compacted, Enumerate, Fallible, Filter, Flatten, FlattenIter, MapErr, Skip,
    SkipWhile, Take, TakeWhile, TryFilter, Unique,
};
use crate::stream::{BoxConcurrentStream, ConcurrentStream};

/// Combinators and terminals for any [`ConcurrentStream`].
///
/// Every operator consumes the stream; a chain is built once and consumed
/// once. `map`, `try_map`, `compact_map`, and `flat_map` fan out across
/// worker tasks while preserving upstream order; the rest pull through
/// serially.
#[async_trait]
pub trait ConcurrentStreamExt: ConcurrentStream {
    // ==============================
    // Fan-out operators
    // ==============================

    /// Transform elements concurrently, preserving upstream order.
    ///
    /// One worker task runs per element, with no admission control; use
    /// [`map_with`](Self::map_with) to bound the worker pool. The transform
    /// starts as soon as the supervisor pulls the element — long before the
    /// consumer asks for the result — and results are re-serialized by
    /// submission index.
    ///
    /// ```ignore
    /// let doubled = from_iter(0..100)
    ///     .map(|x| async move { x * 2 })
    ///     .collect()
    ///     .await?;
    /// ```
    fn map<T, F, Fut>(self, transform: F) -> OrderedMap<T, Self::Error>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.map_with(MapConfig::default(), transform)
    }

    /// [`map`](Self::map) with explicit tuning.
    fn map_with<T, F, Fut>(self, config: MapConfig, mut transform: F) -> OrderedMap<T, Self::Error>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        OrderedMap::spawn(self, config, move |item| {
            let work = transform(item);
            async move { Ok(work.await) }
        })
    }

    /// Like [`map`](Self::map), with a transform that can fail.
    ///
    /// The transform fails with the stream's own error type; lift an
    /// infallible source with [`fallible`](Self::fallible) first, or widen
    /// mismatched types with [`map_err`](Self::map_err) /
    /// [`boxed_err`](Self::boxed_err). A failed transform cancels the whole
    /// chain; the error surfaces at the consumer exactly once.
    fn try_map<T, F, Fut>(self, transform: F) -> OrderedMap<T, Self::Error>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Self::Error>> + Send + 'static,
    {
        self.try_map_with(MapConfig::default(), transform)
    }

    /// [`try_map`](Self::try_map) with explicit tuning.
    fn try_map_with<T, F, Fut>(self, config: MapConfig, transform: F) -> OrderedMap<T, Self::Error>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Self::Error>> + Send + 'static,
    {
        OrderedMap::spawn(self, config, transform)
    }

    /// Concurrent transform to `Option`, with the `None`s dropped.
    fn compact_map<T, F, Fut>(self, transform: F) -> Compacted<OrderedMap<Option<T>, Self::Error>>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        self.map(transform).compacted()
    }

    /// Like [`compact_map`](Self::compact_map), with a transform that can
    /// fail.
    fn try_compact_map<T, F, Fut>(
        self,
        transform: F,
    ) -> Compacted<OrderedMap<Option<T>, Self::Error>>
    where
        Self: Sized + 'static,
        T: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, Self::Error>> + Send + 'static,
    {
        self.try_map(transform).compacted()
    }

    /// Concurrent transform to inner streams, flattened in upstream order.
    ///
    /// Inner streams are *constructed* concurrently (inside the workers), so
    /// their own fan-out starts early; their elements are then serialized in
    /// outer order.
    fn flat_map<S2, F, Fut>(self, transform: F) -> Flatten<OrderedMap<S2, Self::Error>>
    where
        Self: Sized + 'static,
        S2: ConcurrentStream<Error = Self::Error> + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = S2> + Send + 'static,
    {
        self.map(transform).flatten()
    }

    /// Concurrent transform to synchronous iterables, flattened in upstream
    /// order.
    fn flat_map_iter<I, F, Fut>(self, transform: F) -> FlattenIter<OrderedMap<I, Self::Error>>
    where
        Self: Sized + 'static,
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send + 'static,
        I::Item: Send + 'static,
        F: FnMut(Self::Item) -> Fut + Send + 'static,
        Fut: Future<Output = I> + Send + 'static,
    {
        self.map(transform).flatten_iter()
    }

    // ==============================
    // Lightweight operators
    // ==============================

    /// Drop the `None`s from a stream of `Option`s.
    fn compacted<T>(self) -> Compacted<Self>
    where
        Self: ConcurrentStream<Item = Option<T>> + Sized,
        T: Send + 'static,
    {
        Compacted::new(self)
    }

    /// Keep only elements matching the predicate.
    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        Filter::new(self, predicate)
    }

    /// Keep only elements matching a fallible predicate.
    fn try_filter<P>(self, predicate: P) -> TryFilter<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> Result<bool, Self::Error> + Send,
    {
        TryFilter::new(self, predicate)
    }

    /// Suppress repeated elements; the first occurrence wins.
    fn unique(self) -> Unique<Self>
    where
        Self: Sized,
        Self::Item: Hash + Eq + Clone,
    {
        Unique::new(self)
    }

    /// All of `self`, then all of `other`.
    fn chain<S2>(self, other: S2) -> Chain<Self, S2>
    where
        Self: Sized,
        S2: ConcurrentStream<Item = Self::Item, Error = Self::Error>,
    {
        Chain::new(self, other)
    }

    /// Flatten a stream of streams in outer order.
    fn flatten<Inner>(self) -> Flatten<Self>
    where
        Self: ConcurrentStream<Item = Inner> + Sized,
        Inner: ConcurrentStream<Error = Self::Error> + 'static,
    {
        Flatten::new(self)
    }

    /// At most the first `n` elements; upstream is cancelled once the limit
    /// is reached so in-flight workers are released.
    fn take(self, n: usize) -> Take<Self>
    where
        Self: Sized,
    {
        Take::new(self, n)
    }

    /// Everything after the first `n` elements.
    fn skip(self, n: usize) -> Skip<Self>
    where
        Self: Sized,
    {
        Skip::new(self, n)
    }

    /// Elements while the predicate holds; the first mismatch ends the
    /// stream and cancels upstream.
    fn take_while<P>(self, predicate: P) -> TakeWhile<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        TakeWhile::new(self, predicate)
    }

    /// Skip elements while the predicate holds, then pass the rest through.
    fn skip_while<P>(self, predicate: P) -> SkipWhile<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        SkipWhile::new(self, predicate)
    }

    /// Pair each element with its emission index, starting at 0.
    fn enumerate(self) -> Enumerate<Self>
    where
        Self: Sized,
    {
        Enumerate::new(self)
    }

    /// Flatten a stream of synchronous iterables in outer order.
    fn flatten_iter(self) -> FlattenIter<Self>
    where
        Self: Sized,
        Self::Item: IntoIterator,
        <Self::Item as IntoIterator>::IntoIter: Send + 'static,
        <Self::Item as IntoIterator>::Item: Send + 'static,
    {
        FlattenIter::new(self)
    }

    // ==============================
    // Failure-type adapters
    // ==============================

    /// Lift an infallible stream into any failure type.
    fn fallible<E>(self) -> Fallible<Self, E>
    where
        Self: ConcurrentStream<Error = Infallible> + Sized,
        E: Send + 'static,
    {
        Fallible::new(self)
    }

    /// Convert the failure type.
    fn map_err<E2, F>(self, convert: F) -> MapErr<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Error) -> E2 + Send,
        E2: Send + 'static,
    {
        MapErr::new(self, convert)
    }

    /// Widen the failure type to [`BoxError`]. The only lossy erasure in the
    /// crate.
    fn boxed_err(self) -> BoxErr<Self>
    where
        Self: Sized,
        Self::Error: Into<BoxError>,
    {
        BoxErr::new(self)
    }

    /// Erase the concrete stream type.
    fn boxed(self) -> BoxConcurrentStream<Self::Item, Self::Error>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }

    // ==============================
    // Terminals
    // ==============================

    /// Collect every remaining element.
    ///
    /// On failure the stream is cancelled before the error is returned, so
    /// in-flight workers are released.
    async fn collect(mut self) -> Result<Vec<Self::Item>, Self::Error>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        loop {
            match self.next().await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => return Ok(items),
                Err(e) => {
                    self.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Fold every element into an accumulator with an async step.
    async fn fold<A, F, Fut>(mut self, init: A, mut step: F) -> Result<A, Self::Error>
    where
        Self: Sized,
        A: Send,
        F: FnMut(A, Self::Item) -> Fut + Send,
        Fut: Future<Output = A> + Send,
    {
        let mut acc = init;
        loop {
            match self.next().await {
                Ok(Some(item)) => acc = step(acc, item).await,
                Ok(None) => return Ok(acc),
                Err(e) => {
                    self.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Fold by mutating an accumulator in place.
    async fn reduce_into<A, F>(mut self, init: A, mut step: F) -> Result<A, Self::Error>
    where
        Self: Sized,
        A: Send,
        F: FnMut(&mut A, Self::Item) + Send,
    {
        let mut acc = init;
        loop {
            match self.next().await {
                Ok(Some(item)) => step(&mut acc, item),
                Ok(None) => return Ok(acc),
                Err(e) => {
                    self.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// The smallest element, or `None` if the stream was empty.
    async fn min(self) -> Result<Option<Self::Item>, Self::Error>
    where
        Self: Sized,
        Self::Item: Ord,
    {
        self.reduce_into(None, |best: &mut Option<Self::Item>, item| match best {
            Some(current) if *current <= item => {}
            _ => *best = Some(item),
        })
        .await
    }

    /// The largest element, or `None` if the stream was empty.
    async fn max(self) -> Result<Option<Self::Item>, Self::Error>
    where
        Self: Sized,
        Self::Item: Ord,
    {
        self.reduce_into(None, |best: &mut Option<Self::Item>, item| match best {
            Some(current) if *current >= item => {}
            _ => *best = Some(item),
        })
        .await
    }

    /// How many elements match the predicate.
    async fn count_where<P>(self, mut predicate: P) -> Result<usize, Self::Error>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        self.reduce_into(0usize, move |count, item| {
            if predicate(&item) {
                *count += 1;
            }
        })
        .await
    }

    /// Whether any element equals `needle`. Short-circuits and cancels the
    /// stream on the first match.
    async fn contains(mut self, needle: Self::Item) -> Result<bool, Self::Error>
    where
        Self: Sized,
        Self::Item: PartialEq,
    {
        loop {
            match self.next().await {
                Ok(Some(item)) => {
                    if item == needle {
                        self.cancel();
                        return Ok(true);
                    }
                }
                Ok(None) => return Ok(false),
                Err(e) => {
                    self.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Whether every element matches the predicate. Short-circuits and
    /// cancels the stream on the first mismatch.
    async fn all_satisfy<P>(mut self, mut predicate: P) -> Result<bool, Self::Error>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool + Send,
    {
        loop {
            match self.next().await {
                Ok(Some(item)) => {
                    if !predicate(&item) {
                        self.cancel();
                        return Ok(false);
                    }
                }
                Ok(None) => return Ok(true),
                Err(e) => {
                    self.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Run `body` concurrently for each element, discarding results.
    ///
    /// Elements are drained serially (preserving the stream's order for the
    /// `index` argument) and dispatched to one worker task each, with no
    /// admission control; use [`for_each_with`](Self::for_each_with) to
    /// bound the worker pool. Returns after every worker has finished.
    /// Cancellation is checked before each dispatch; a panicking body
    /// resumes its panic here after the remaining workers have been awaited.
    async fn for_each<F, Fut>(self, body: F) -> Result<(), Self::Error>
    where
        Self: Sized,
        F: FnMut(u64, Self::Item) -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.for_each_with(MapConfig::default(), body).await
    }

    /// [`for_each`](Self::for_each) with explicit tuning. Only
    /// `max_concurrency` applies here; there is no result channel.
    async fn for_each_with<F, Fut>(
        mut self,
        config: MapConfig,
        mut body: F,
    ) -> Result<(), Self::Error>
    where
        Self: Sized,
        F: FnMut(u64, Self::Item) -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let max_concurrency = config.normalized().max_concurrency;
        let handle = self.cancel_handle();
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut index: u64 = 0;
        let mut panic: Option<Box<dyn std::any::Any + Send>> = None;

        let result = loop {
            while let Some(joined) = workers.try_join_next() {
                note_panic(joined, &handle, &mut panic);
            }
            if let Some(limit) = max_concurrency {
                while workers.len() >= limit {
                    match workers.join_next().await {
                        Some(joined) => note_panic(joined, &handle, &mut panic),
                        None => break,
                    }
                }
            }
            if handle.is_cancelled() {
                break Ok(());
            }
            match self.next().await {
                Ok(Some(item)) => {
                    workers.spawn(body(index, item));
                    index += 1;
                    // Keep cancellation and failure observation prompt even
                    // over a source that never suspends.
                    tokio::task::yield_now().await;
                }
                Ok(None) => break Ok(()),
                Err(e) => {
                    self.cancel();
                    break Err(e);
                }
            }
        };

        while let Some(joined) = workers.join_next().await {
            note_panic(joined, &handle, &mut panic);
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        result
    }

    /// Like [`for_each`](Self::for_each), with a body that can fail.
    ///
    /// The first body failure cancels the source stream; remaining workers
    /// are awaited, then that failure is returned.
    async fn try_for_each<F, Fut>(self, body: F) -> Result<(), Self::Error>
    where
        Self: Sized,
        F: FnMut(u64, Self::Item) -> Fut + Send,
        Fut: Future<Output = Result<(), Self::Error>> + Send + 'static,
    {
        self.try_for_each_with(MapConfig::default(), body).await
    }

    /// [`try_for_each`](Self::try_for_each) with explicit tuning. Only
    /// `max_concurrency` applies here; there is no result channel.
    async fn try_for_each_with<F, Fut>(
        mut self,
        config: MapConfig,
        mut body: F,
    ) -> Result<(), Self::Error>
    where
        Self: Sized,
        F: FnMut(u64, Self::Item) -> Fut + Send,
        Fut: Future<Output = Result<(), Self::Error>> + Send + 'static,
    {
        let max_concurrency = config.normalized().max_concurrency;
        let handle = self.cancel_handle();
        let failure: Arc<Mutex<Option<Self::Error>>> = Arc::new(Mutex::new(None));
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut index: u64 = 0;
        let mut panic: Option<Box<dyn std::any::Any + Send>> = None;

        let result = loop {
            while let Some(joined) = workers.try_join_next() {
                note_panic(joined, &handle, &mut panic);
            }
            if let Some(limit) = max_concurrency {
                while workers.len() >= limit {
                    match workers.join_next().await {
                        Some(joined) => note_panic(joined, &handle, &mut panic),
                        None => break,
                    }
                }
            }
            if handle.is_cancelled() {
                break Ok(());
            }
            match self.next().await {
                Ok(Some(item)) => {
                    let work = body(index, item);
                    index += 1;
                    let failure = Arc::clone(&failure);
                    let handle = handle.clone();
                    workers.spawn(async move {
                        if handle.is_cancelled() {
                            return;
                        }
                        if let Err(e) = work.await {
                            let mut slot = failure.lock().expect("failure slot poisoned");
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            drop(slot);
                            handle.cancel();
                        }
                    });
                    tokio::task::yield_now().await;
                }
                Ok(None) => break Ok(()),
                Err(e) => {
                    self.cancel();
                    break Err(e);
                }
            }
        };

        while let Some(joined) = workers.join_next().await {
            note_panic(joined, &handle, &mut panic);
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        if let Some(e) = failure.lock().expect("failure slot poisoned").take() {
            return Err(e);
        }
        result
    }

    // ==============================
    // Bridges out
    // ==============================

    /// Bridge into the `futures` ecosystem as a `Stream` of `Result`s.
    ///
    /// Dropping the returned stream cancels the chain. Conversion hides the
    /// [`cancel_handle`](ConcurrentStream::cancel_handle) accessor behind the
    /// `Stream` trait, so take a handle first (or use
    /// [`IntoStream::cancel_handle`]) if external cancellation is needed.
    fn into_stream(self) -> IntoStream<Self>
    where
        Self: Sized + 'static,
    {
        IntoStream::new(self)
    }

    /// Bridge an infallible chain into a plain `Stream` of items.
    fn into_item_stream(self) -> BoxStream<'static, Self::Item>
    where
        Self: ConcurrentStream<Error = Infallible> + Sized + 'static,
    {
        bridge::item_stream(self)
    }
}

impl<S> ConcurrentStreamExt for S where S: ConcurrentStream {}

fn note_panic(
    joined: Result<(), JoinError>,
    handle: &CancelHandle,
    panic: &mut Option<Box<dyn std::any::Any + Send>>,
) {
    if let Err(e) = joined {
        if e.is_panic() && panic.is_none() {
            handle.cancel();
            *panic = Some(e.into_panic());
        }
    }
}
