//! Tandem - ordered concurrent streams for tokio
//!
//! A [`ConcurrentStream`] fans work out across many worker tasks yet delivers
//! results to its single consumer in exactly the order the inputs were
//! submitted. It unifies a worker pool (results out of order) with a
//! pull-based async iterator (one element at a time), and keeps error
//! propagation and cancellation working across arbitrary operator chains.
//!
//! ```ignore
//! use tandem::{from_iter, ConcurrentStreamExt};
//!
//! let pages = from_iter(urls)
//!     .map(|url| async move { fetch(url).await })   // concurrent, ordered
//!     .filter(|page| !page.is_empty())
//!     .collect()
//!     .await?;
//! ```
//!
//! Streams are consumed once, cancel their upstream work when dropped, and
//! expose a detachable [`CancelHandle`] for shutdown paths.

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod ext;
pub mod ops;
pub mod source;
pub mod stream;

pub use bridge::IntoStream;
pub use cancel::CancelHandle;
pub use config::MapConfig;
pub use engine::OrderedMap;
pub use error::{BoxError, TypeMismatch};
pub use ext::ConcurrentStreamExt;
pub use source::{
    empty, from_any_iter, from_any_iter_strict, from_iter, from_stream, from_try_stream, once,
};
pub use stream::{BoxConcurrentStream, ConcurrentStream};
