//! Cancellation handles shared between a stream, its consumer, and its
//! background tasks.
//!
//! Every stream hands out a [`CancelHandle`]: a cheap, clonable, thread-safe
//! value that outlives the stream itself. Invoking it stops the stream's
//! supervisor task (if any), forwards the request to every upstream handle,
//! and lets any suspended `next()` call wake up with end-of-stream.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// A shared handle that requests cancellation of a stream and everything
/// upstream of it.
///
/// Handles are safe to invoke any number of times, from any thread, and keep
/// working after the stream they came from has been dropped. A consumer that
/// wants to cancel from a shutdown path should clone the handle up front:
///
/// ```ignore
/// let cancel = stream.cancel_handle();
/// shutdown_hook(move || cancel.cancel());
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    // Upstream handles this one chains to. Guarded so that operators which
    // adopt new upstreams mid-stream (flatten) can attach them late.
    upstream: Mutex<Vec<CancelHandle>>,
}

impl CancelHandle {
    /// A handle with no upstreams, for streams that own their own state.
    /// Custom [`ConcurrentStream`](crate::ConcurrentStream) implementations
    /// create one of these and return clones from `cancel_handle`.
    pub fn new() -> Self {
        Self::chained(Vec::new())
    }

    /// A handle that, when cancelled, also cancels every handle in `upstream`.
    pub(crate) fn chained(upstream: Vec<CancelHandle>) -> Self {
        CancelHandle {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                upstream: Mutex::new(upstream),
            }),
        }
    }

    /// Request cancellation. Idempotent, non-blocking, never fails.
    pub fn cancel(&self) {
        self.inner.token.cancel();
        let upstream = {
            let mut guard = self.inner.upstream.lock().expect("cancel chain poisoned");
            std::mem::take(&mut *guard)
        };
        for handle in upstream {
            handle.cancel();
        }
    }

    /// Whether cancellation has been requested on this handle.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Chain another upstream onto this handle. If cancellation was already
    /// requested, the new upstream is cancelled immediately.
    pub(crate) fn attach(&self, upstream: CancelHandle) {
        let already_cancelled = {
            let mut guard = self.inner.upstream.lock().expect("cancel chain poisoned");
            if self.inner.token.is_cancelled() {
                true
            } else {
                guard.push(upstream.clone());
                false
            }
        };
        if already_cancelled {
            upstream.cancel();
        }
    }

    /// Completes once cancellation has been requested.
    pub(crate) async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_reaches_chained_upstreams() {
        let a = CancelHandle::new();
        let b = CancelHandle::new();
        let tail = CancelHandle::chained(vec![a.clone(), b.clone()]);

        tail.cancel();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn attach_after_cancel_cancels_immediately() {
        let tail = CancelHandle::new();
        tail.cancel();

        let late = CancelHandle::new();
        tail.attach(late.clone());
        assert!(late.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let handle = CancelHandle::new();
        let copy = handle.clone();
        copy.cancel();
        assert!(handle.is_cancelled());
    }
}
