//! Lightweight operators: stateful wrappers that pull from upstream on
//! demand. None of them spawns a task; per-element cost is one upstream
//! `next()` plus O(1) local work.

pub mod adapt;
pub mod chain;
pub mod compacted;
pub mod filter;
pub mod flatten;
pub mod slice;
pub mod unique;

pub use adapt::{BoxErr, Fallible, MapErr};
pub use chain::Chain;
pub use compacted::Compacted;
pub use filter::{Filter, TryFilter};
pub use flatten::{Flatten, FlattenIter};
pub use slice::{Enumerate, Skip, SkipWhile, Take, TakeWhile};
pub use unique::Unique;
