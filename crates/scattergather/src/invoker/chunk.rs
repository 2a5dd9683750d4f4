use crate::{ContextProvider, ContextSnapshot, IdentifierRequest, PoolTask, TypedResponse};
use core::marker::PhantomData;
use std::sync::Arc;

/// One chunk of a scattered request, bracketed by the caller's context.
///
/// Every chunk task of an invocation shares the same chunk-call, snapshot,
/// and provider. The worker installs the snapshot before the call and clears
/// it afterwards, so the call sees the caller's locale and principal and the
/// next task on the same thread sees nothing.
pub(crate) struct ChunkTask<P: ContextProvider, Id, R, E, F> {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    index: usize,
    chunk: Option<IdentifierRequest<Id>>,
    call: Arc<F>,
    snapshot: Arc<ContextSnapshot<P>>,
    provider: Arc<P>,
    _output: PhantomData<fn() -> Result<TypedResponse<R>, E>>,
}

impl<P: ContextProvider, Id, R, E, F> ChunkTask<P, Id, R, E, F> {
    pub(crate) const fn new(
        index: usize,
        chunk: IdentifierRequest<Id>,
        call: Arc<F>,
        snapshot: Arc<ContextSnapshot<P>>,
        provider: Arc<P>,
    ) -> Self {
        Self {
            index,
            chunk: Some(chunk),
            call,
            snapshot,
            provider,
            _output: PhantomData,
        }
    }
}

impl<P, Id, R, E, F> PoolTask for ChunkTask<P, Id, R, E, F>
where
    P: ContextProvider,
    Id: Ord + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(IdentifierRequest<Id>) -> Result<TypedResponse<R>, E> + Send + Sync + 'static,
{
    type Output = Result<TypedResponse<R>, E>;

    fn before_run(&mut self) {
        self.snapshot.install(&*self.provider);
    }

    fn run(&mut self) -> Self::Output {
        let chunk = self.chunk.take().unwrap_or_default();

        #[cfg(feature = "tracing")]
        tracing::trace!(chunk = self.index, ids = chunk.len(), "Running chunk call");

        (self.call)(chunk)
    }

    fn after_run(&mut self) {
        ContextSnapshot::clear(&*self.provider);

        #[cfg(feature = "tracing")]
        tracing::trace!(chunk = self.index, "Cleared chunk context");
    }
}
