use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tandem::{
    from_iter, from_try_stream, CancelHandle, ConcurrentStream, ConcurrentStreamExt, MapConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestError(&'static str);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl std::error::Error for TestError {}

/// A fallible source that counts how many times it was pulled.
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
    type Error = TestError;

    async fn next(&mut self) -> Result<Option<i64>, TestError> {
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
async fn transform_failure_mid_stream_surfaces_in_order() {
    let (source, pulls, _) = CountedSource::new(0..100);
    let mut stream = source.try_map_with(MapConfig::max_concurrency(1), |x| async move {
        if x == 50 {
            Err(TestError("element 50"))
        } else {
            Ok(x)
        }
    });

    for expected in 0..50 {
        assert_eq!(stream.next().await.unwrap(), Some(expected));
    }
    assert_eq!(stream.next().await.unwrap_err(), TestError("element 50"));
    // The error travels once; afterwards the stream is quietly drained.
    assert_eq!(stream.next().await.unwrap(), None);
    assert_eq!(stream.next().await.unwrap(), None);

    let pulled = pulls.load(Ordering::SeqCst);
    assert!(
        pulled <= 55,
        "upstream should stop shortly after the failure, pulled {}",
        pulled
    );
}

#[tokio::test]
async fn transform_failure_cancels_upstream() {
    let (source, _, upstream_handle) = CountedSource::new(0..1000);
    let mut stream = source.try_map_with(MapConfig::max_concurrency(2), |x| async move {
        if x == 10 {
            Err(TestError("fail"))
        } else {
            Ok(x)
        }
    });

    let mut result = Ok(());
    loop {
        match stream.next().await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    assert_eq!(result, Err(TestError("fail")));
    assert!(upstream_handle.is_cancelled());
}

#[tokio::test]
async fn upstream_failure_propagates_through_map() {
    let inner = futures_util::stream::iter(vec![
        Ok(1),
        Ok(2),
        Ok(3),
        Err(TestError("upstream broke")),
        Ok(4),
    ]);
    let mut stream = from_try_stream(inner)
        .try_map_with(MapConfig::max_concurrency(1), |x| async move { Ok(x * 10) });

    assert_eq!(stream.next().await.unwrap(), Some(10));
    assert_eq!(stream.next().await.unwrap(), Some(20));
    assert_eq!(stream.next().await.unwrap(), Some(30));
    assert_eq!(
        stream.next().await.unwrap_err(),
        TestError("upstream broke")
    );
    assert_eq!(stream.next().await.unwrap(), None);
}

#[tokio::test]
async fn try_filter_predicate_failure_cancels() {
    let (source, _, upstream_handle) = CountedSource::new(0..100);
    let mut stream = source.try_filter(|x| {
        if *x == 5 {
            Err(TestError("bad predicate"))
        } else {
            Ok(true)
        }
    });

    for expected in 0..5 {
        assert_eq!(stream.next().await.unwrap(), Some(expected));
    }
    assert_eq!(stream.next().await.unwrap_err(), TestError("bad predicate"));
    assert_eq!(stream.next().await.unwrap(), None);
    assert!(upstream_handle.is_cancelled());
}

#[tokio::test]
async fn fallible_lifts_an_infallible_source() {
    let result = from_iter(0..10)
        .fallible::<TestError>()
        .try_map(|x| async move { if x < 100 { Ok(x) } else { Err(TestError("nope")) } })
        .collect()
        .await
        .unwrap();
    assert_eq!(result, (0..10).collect::<Vec<i32>>());
}

#[tokio::test]
async fn map_err_converts_the_failure_type() {
    let inner = futures_util::stream::iter(vec![Ok(1), Err(TestError("original"))]);
    let mut stream = from_try_stream(inner).map_err(|e| format!("wrapped: {}", e));
    assert_eq!(stream.next().await.unwrap(), Some(1));
    assert_eq!(
        stream.next().await.unwrap_err(),
        "wrapped: test error: original"
    );
}

#[tokio::test]
async fn boxed_err_widens_the_failure_type() {
    let inner = futures_util::stream::iter(vec![Ok(1), Err(TestError("widened"))]);
    let mut stream = from_try_stream(inner).boxed_err();
    assert_eq!(stream.next().await.unwrap(), Some(1));
    let e = stream.next().await.unwrap_err();
    assert_eq!(e.to_string(), "test error: widened");
}

#[tokio::test]
async fn collect_cancels_before_reraising() {
    let (source, _, upstream_handle) = CountedSource::new(0..1000);
    let outcome = source
        .try_map_with(MapConfig::max_concurrency(1), |x| async move {
            if x == 3 {
                Err(TestError("stop"))
            } else {
                Ok(x)
            }
        })
        .collect()
        .await;
    assert_eq!(outcome, Err(TestError("stop")));
    assert!(upstream_handle.is_cancelled());
}

#[tokio::test]
async fn try_for_each_body_failure_cancels_source() {
    let (source, pulls, upstream_handle) = CountedSource::new(0..10_000);
    let outcome = source
        .try_for_each(|_, x| async move {
            tokio::task::yield_now().await;
            if x == 25 {
                Err(TestError("body failed"))
            } else {
                Ok(())
            }
        })
        .await;
    assert_eq!(outcome, Err(TestError("body failed")));
    assert!(upstream_handle.is_cancelled());
    assert!(pulls.load(Ordering::SeqCst) < 10_000);
}
