//! Error types for chunked identifier invocation.
//!
//! This module defines the central `Error` enum, which captures every failure
//! the scatter-gather machinery itself can produce. Failures raised by the
//! injected chunk-call are *not* represented here: they keep the caller's own
//! error type so a split invocation fails exactly like an unsplit one would.
//!
//! ## Error Cases
//! - `InvalidPoolSize`: the pool was configured with zero workers.
//! - `InvalidSplitPolicy`: the chunk window computed from a policy is empty.
//! - `Spawn`: a worker thread could not be created.
//! - `PoolShutdown`: work was submitted after the pool stopped accepting it.
//! - `Interrupted`: a task being waited on was discarded before it ran.
//! - `NoResult` / `NonUniqueResult`: single-result access on a response that
//!   does not hold exactly one element.
//! - `DuplicateKey`: strict indexing found two elements with the same key.

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the scatter-gather machinery.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The worker pool was configured with a non-positive size.
    #[error("Invalid pool size: {size} (must be greater than 0)")]
    InvalidPoolSize { size: usize },

    /// The split policy cannot produce chunks of at least one identifier.
    #[error("Invalid split policy: {reason}")]
    InvalidSplitPolicy { reason: String },

    /// The operating system refused to spawn a worker thread.
    #[error("Failed to spawn worker thread: {reason}")]
    Spawn { reason: String },

    /// Work was submitted to a pool that has been shut down.
    #[error("Worker pool is shut down")]
    PoolShutdown,

    /// A task was discarded while the caller was blocked waiting on it.
    ///
    /// Partial results are never returned after this error.
    #[error("Interrupted while waiting for chunk completion")]
    Interrupted,

    /// A single result was requested from an empty response.
    #[error("No result")]
    NoResult,

    /// A single result was requested from a response holding several.
    #[error("Non-unique result: expected exactly one element, found {count}")]
    NonUniqueResult { count: usize },

    /// Strict indexing produced the same key for two distinct elements.
    #[error("Duplicate key while indexing response elements")]
    DuplicateKey,
}
