use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tandem::{from_iter, CancelHandle, ConcurrentStream, ConcurrentStreamExt, MapConfig};
use tokio::time::sleep;

struct CountedSource {
    range: std::ops::Range<i64>,
    pulls: Arc<AtomicUsize>,
    handle: CancelHandle,
}

impl CountedSource {
    fn new(range: std::ops::Range<i64>) -> (Self, Arc<AtomicUsize>, CancelHandle) {
        let pulls = Arc::new(AtomicUsize::new(0));
        let handle = CancelHandle::new();
        (
            CountedSource {
                range,
                pulls: Arc::clone(&pulls),
                handle: handle.clone(),
            },
            pulls,
            handle,
        )
    }
}

#[async_trait]
impl ConcurrentStream for CountedSource {
    type Item = i64;
    type Error = Infallible;

    async fn next(&mut self) -> Result<Option<i64>, Infallible> {
        if self.handle.is_cancelled() {
            return Ok(None);
        }
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self.range.next())
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

#[tokio::test]
async fn into_stream_yields_results_in_order() {
    let bridged = from_iter(0..10)
        .map(|x| async move { x * 3 })
        .into_stream();
    let collected: Vec<_> = bridged.collect().await;
    let expected: Vec<Result<i32, Infallible>> = (0..10).map(|x| Ok(x * 3)).collect();
    assert_eq!(collected, expected);
}

#[tokio::test]
async fn into_item_stream_yields_bare_items() {
    let bridged = from_iter(vec!["x", "y", "z"]).into_item_stream();
    let collected: Vec<_> = bridged.collect().await;
    assert_eq!(collected, vec!["x", "y", "z"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_the_bridge_cancels_the_chain() {
    let (source, pulls, upstream_handle) = CountedSource::new(0..10_000);
    let mut bridged = source
        .map_with(MapConfig::max_concurrency(4), |x| async move {
            sleep(Duration::from_millis(5)).await;
            x
        })
        .into_stream();

    assert_eq!(bridged.next().await, Some(Ok(0)));
    drop(bridged);

    assert!(upstream_handle.is_cancelled());
    sleep(Duration::from_millis(100)).await;
    let settled = pulls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(pulls.load(Ordering::SeqCst), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bridge_cancel_handle_stops_the_stream() {
    let (source, _, _) = CountedSource::new(0..100_000);
    let mut bridged = source
        .map_with(MapConfig::max_concurrency(2), |x| async move {
            sleep(Duration::from_millis(1)).await;
            x
        })
        .into_stream();

    let cancel = bridged.cancel_handle();
    assert_eq!(bridged.next().await, Some(Ok(0)));
    cancel.cancel();

    let mut residue = 0;
    while let Some(item) = bridged.next().await {
        assert!(item.is_ok());
        residue += 1;
        assert!(residue <= 200, "unbounded output after cancel");
    }
    assert_eq!(bridged.next().await, None);
}

#[tokio::test]
async fn for_each_sees_every_element_with_its_emission_index() {
    let seen: Arc<Mutex<Vec<(u64, i32)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    from_iter(0..50)
        .for_each(move |index, item| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push((index, item));
            }
        })
        .await
        .unwrap();

    let mut observed = seen.lock().unwrap().clone();
    observed.sort();
    let expected: Vec<(u64, i32)> = (0..50).map(|x| (x as u64, x)).collect();
    assert_eq!(observed, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn for_each_with_bounds_in_flight_workers() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let running = Arc::clone(&in_flight);
    let high_water = Arc::clone(&peak);
    from_iter(0..100)
        .for_each_with(MapConfig::max_concurrency(3), move |_, _| {
            let running = Arc::clone(&running);
            let high_water = Arc::clone(&high_water);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    let observed_peak = peak.load(Ordering::SeqCst);
    assert!(observed_peak >= 1);
    assert!(
        observed_peak <= 3,
        "admission control exceeded: {} workers in flight",
        observed_peak
    );
}

#[tokio::test]
async fn try_for_each_with_bounded_runs_to_completion() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    from_iter(0..50)
        .fallible::<String>()
        .try_for_each_with(MapConfig::max_concurrency(2), move |_, _| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn try_for_each_runs_to_completion_on_success() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    from_iter(0..100)
        .fallible::<String>()
        .try_for_each(move |_, _| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn fold_accumulates_in_order() {
    let sum = from_iter(1..=10)
        .fold(0i64, |acc, x| async move { acc + x as i64 })
        .await
        .unwrap();
    assert_eq!(sum, 55);

    let concatenated = from_iter(vec!["a", "b", "c"])
        .fold(String::new(), |mut acc, s| async move {
            acc.push_str(s);
            acc
        })
        .await
        .unwrap();
    assert_eq!(concatenated, "abc");
}

#[tokio::test]
async fn reduce_into_mutates_the_accumulator() {
    let histogram = from_iter(vec![1, 1, 2, 3, 3, 3])
        .reduce_into(std::collections::HashMap::new(), |acc, x| {
            *acc.entry(x).or_insert(0) += 1;
        })
        .await
        .unwrap();
    assert_eq!(histogram[&1], 2);
    assert_eq!(histogram[&2], 1);
    assert_eq!(histogram[&3], 3);
}

#[tokio::test]
async fn min_and_max_handle_empty_and_non_empty() {
    assert_eq!(from_iter(Vec::<i32>::new()).min().await.unwrap(), None);
    assert_eq!(from_iter(vec![5, 3, 9, 1]).min().await.unwrap(), Some(1));
    assert_eq!(from_iter(Vec::<i32>::new()).max().await.unwrap(), None);
    assert_eq!(from_iter(vec![5, 3, 9, 1]).max().await.unwrap(), Some(9));
}

#[tokio::test]
async fn count_where_counts_matches() {
    let count = from_iter(0..100).count_where(|x| x % 7 == 0).await.unwrap();
    assert_eq!(count, 15);
}

#[tokio::test]
async fn contains_short_circuits_and_cancels() {
    let (source, pulls, upstream_handle) = CountedSource::new(0..10_000);
    let found = source.contains(5).await.unwrap();
    assert!(found);
    assert!(upstream_handle.is_cancelled());
    assert!(pulls.load(Ordering::SeqCst) < 100);
}

#[tokio::test]
async fn contains_misses_on_absent_needle() {
    assert!(!from_iter(0..10).contains(99).await.unwrap());
}

#[tokio::test]
async fn all_satisfy_short_circuits_on_first_mismatch() {
    let (source, pulls, upstream_handle) = CountedSource::new(0..10_000);
    let all_small = source.all_satisfy(|x| *x < 10).await.unwrap();
    assert!(!all_small);
    assert!(upstream_handle.is_cancelled());
    assert!(pulls.load(Ordering::SeqCst) < 100);
}

#[tokio::test]
async fn all_satisfy_true_on_full_pass() {
    assert!(from_iter(0..10).all_satisfy(|x| *x < 10).await.unwrap());
}
