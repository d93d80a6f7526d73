//! Error types and failure-type plumbing.
//!
//! Chains carry their failure type statically: an infallible chain uses
//! [`std::convert::Infallible`] so consumers never have to handle errors that
//! cannot happen. When two independently fallible layers meet, the chain is
//! widened to [`BoxError`] — the one place type information is erased.

/// Type-erased error used when two different failure types compose.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A dynamically typed element did not match the element type the consumer
/// requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("element type mismatch: expected {expected}")]
pub struct TypeMismatch {
    /// The type name the consumer asked for.
    pub expected: &'static str,
}
