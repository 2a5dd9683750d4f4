//! Parallel fan-out of one identifier request over a [`WorkerPool`].
//!
//! A [`ScatterGatherInvoker`] is the piece callers normally touch. Given a
//! chunk-call (a function that performs the actual lookup for one request)
//! and a possibly large request, it:
//!
//! 1. captures the caller's ambient context once,
//! 2. splits the request into size-bounded chunks,
//! 3. runs the chunk-call for every chunk on the pool, each run bracketed by
//!    installing and clearing the captured context,
//! 4. merges the partial responses into one as they are collected.
//!
//! Callers usually wrap the invoker in their own client type; the chunk-call
//! closure then captures whatever remote client it needs.

mod chunk;
#[cfg(test)]
mod tests;

use self::chunk::ChunkTask;
use crate::{
    ContextProvider, ContextSnapshot, Error, IdentifierRequest, SplitPolicy, ThreadLocalContext,
    TypedResponse, WorkerPool, merge,
};
use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

/// Splits requests, runs the chunks on a shared pool, and merges the results.
///
/// The invoker is cheap to clone and safe to share; any number of threads may
/// call [`invoke`](Self::invoke) concurrently on the same pool.
///
/// # Example
/// ```
/// use scattergather::{
///     IdentifierRequest, ScatterGatherInvoker, TypedResponse, WorkerPool,
/// };
/// use std::sync::Arc;
///
/// let pool = Arc::new(WorkerPool::new(3)?);
/// let invoker = ScatterGatherInvoker::new(pool);
///
/// let request: IdentifierRequest<u32> = (0..500).collect();
/// let doubled = invoker.invoke(
///     |chunk: IdentifierRequest<u32>| {
///         Ok::<_, scattergather::Error>(chunk.iter().map(|id| id * 2).collect())
///     },
///     request,
/// )?;
/// assert_eq!(doubled.len(), 500);
/// assert!(doubled.contains(&998));
/// # Ok::<(), scattergather::Error>(())
/// ```
pub struct ScatterGatherInvoker<P: ContextProvider = ThreadLocalContext> {
    pool: Arc<WorkerPool>,
    provider: Arc<P>,
    policy: SplitPolicy,
    capture_trace: bool,
}

impl ScatterGatherInvoker<ThreadLocalContext> {
    /// Creates an invoker that carries thread-local locale and principal.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self::with_provider(pool, ThreadLocalContext)
    }
}

impl<P: ContextProvider> ScatterGatherInvoker<P> {
    /// Creates an invoker that reads and installs context through `provider`.
    pub fn with_provider(pool: Arc<WorkerPool>, provider: P) -> Self {
        Self {
            pool,
            provider: Arc::new(provider),
            policy: SplitPolicy::DEFAULT,
            capture_trace: true,
        }
    }

    #[must_use]
    pub const fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables or disables capturing the caller's stack for every invocation.
    ///
    /// Capturing is on by default. Walking the stack costs a few microseconds
    /// per invocation; chunk tasks of an invocation without a capture still
    /// get an (empty) installed trace.
    #[must_use]
    pub const fn with_trace_capture(mut self, enabled: bool) -> Self {
        self.capture_trace = enabled;
        self
    }

    pub const fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn split_policy(&self) -> SplitPolicy {
        self.policy
    }

    pub const fn captures_trace(&self) -> bool {
        self.capture_trace
    }

    /// Runs `chunk_call` over every chunk of `request` in parallel and
    /// returns the union of the partial responses.
    ///
    /// Blocks the calling thread until every chunk has finished or the first
    /// failure is observed. Chunks are collected in submission order; once a
    /// chunk fails, the chunks still running are left to finish and their
    /// results are discarded.
    ///
    /// An empty request fits the budget, so it is sent as a single empty
    /// chunk like any other small request.
    ///
    /// Calling `invoke` from inside a chunk-call running on the same pool can
    /// deadlock once every worker waits on chunks that have no worker left.
    ///
    /// # Errors
    ///
    /// - The chunk-call's own error, unchanged, if any chunk fails.
    /// - [`Error::PoolShutdown`] if the pool no longer accepts work.
    /// - [`Error::Interrupted`] if the pool discarded a chunk before running
    ///   it. No partial response is returned.
    ///
    /// # Panics
    ///
    /// A panic inside the chunk-call is caught on the worker and resumed on
    /// the calling thread with its original payload.
    pub fn invoke<Id, R, E, F>(
        &self,
        chunk_call: F,
        request: IdentifierRequest<Id>,
    ) -> Result<TypedResponse<R>, E>
    where
        Id: Ord + fmt::Display + Send + 'static,
        R: Eq + Hash + Send + 'static,
        E: From<Error> + Send + 'static,
        F: Fn(IdentifierRequest<Id>) -> Result<TypedResponse<R>, E> + Send + Sync + 'static,
    {
        #[cfg(feature = "tracing")]
        let ids = request.len();
        let chunks = self.policy.split(request);
        if chunks.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::trace!("Split yielded no chunks, skipping the pool");
            return Ok(TypedResponse::new());
        }

        let snapshot = Arc::new(if self.capture_trace {
            ContextSnapshot::capture(&*self.provider)
        } else {
            ContextSnapshot::capture_without_trace(&*self.provider)
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(
            ids,
            chunks = chunks.len(),
            origin = snapshot.trace().origin().map(tracing::field::display),
            "Scattering identifier request"
        );

        let call = Arc::new(chunk_call);
        let tasks = chunks.into_iter().enumerate().map(|(index, chunk)| {
            ChunkTask::<P, Id, R, E, F>::new(
                index,
                chunk,
                Arc::clone(&call),
                Arc::clone(&snapshot),
                Arc::clone(&self.provider),
            )
        });
        let futures = self.pool.submit_all(tasks)?;

        let mut response = TypedResponse::new();
        for future in futures {
            match future.join()? {
                Ok(Ok(partial)) => response = merge(response, partial),
                Ok(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        origin = snapshot.trace().render().as_deref(),
                        "Chunk call failed, abandoning invocation"
                    );
                    return Err(e);
                }
                Err(payload) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        origin = snapshot.trace().render().as_deref(),
                        "Chunk call panicked, resuming on caller"
                    );
                    std::panic::resume_unwind(payload);
                }
            }
        }

        Ok(response)
    }
}

impl<P: ContextProvider> Clone for ScatterGatherInvoker<P> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            provider: Arc::clone(&self.provider),
            policy: self.policy,
            capture_trace: self.capture_trace,
        }
    }
}

impl<P: ContextProvider> fmt::Debug for ScatterGatherInvoker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterGatherInvoker")
            .field("pool", &self.pool.stats())
            .field("policy", &self.policy)
            .field("capture_trace", &self.capture_trace)
            .finish_non_exhaustive()
    }
}
