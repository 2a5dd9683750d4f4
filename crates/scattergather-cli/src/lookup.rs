use core::fmt;
use scattergather::{
    CausalTrace, ContextProvider, IdentifierRequest, ScatterGatherInvoker, ThreadLocalContext,
    TypedResponse,
};
use std::thread;
use std::time::Duration;

/// Failures of a directory lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("directory rejected the lookup of {0}")]
    Rejected(String),
    #[error(transparent)]
    Pool(#[from] scattergather::Error),
}

/// One resolved identifier as the directory reports it.
///
/// Besides the identifier, a record shows the context the lookup actually ran
/// under and the worker thread that served it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    pub id: String,
    pub locale: String,
    pub principal: Option<String>,
    pub worker: String,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.id,
            self.locale,
            self.principal.as_deref().unwrap_or("-"),
            self.worker
        )
    }
}

/// A stand-in for a remote directory service that echoes identifiers back.
#[derive(Clone, Debug)]
pub struct Directory {
    latency: Duration,
    fail_on: Option<String>,
}

impl Directory {
    pub const fn new(latency: Duration, fail_on: Option<String>) -> Self {
        Self { latency, fail_on }
    }

    /// Resolves one chunk. Runs on a pool worker inside the caller's context.
    pub fn lookup(
        &self,
        chunk: IdentifierRequest<String>,
    ) -> Result<TypedResponse<Record>, LookupError> {
        let origin = CausalTrace::current().and_then(|trace| trace.origin().cloned());
        tracing::debug!(
            ids = chunk.len(),
            payload = chunk.to_string().len(),
            origin = origin.as_ref().map(tracing::field::display),
            "Looking up chunk"
        );

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        if let Some(id) = self.fail_on.as_ref().filter(|id| chunk.contains(id)) {
            return Err(LookupError::Rejected(id.clone()));
        }

        let ctx = ThreadLocalContext;
        let locale = ctx.current_locale().to_string();
        let principal = ctx.current_principal().map(|p| p.name().to_string());
        let worker = thread::current().name().unwrap_or("unnamed").to_string();

        Ok(chunk
            .into_iter()
            .map(|id| Record {
                id,
                locale: locale.clone(),
                principal: principal.clone(),
                worker: worker.clone(),
            })
            .collect())
    }
}

/// Client for the directory that transparently scatters large lookups.
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    invoker: ScatterGatherInvoker,
    directory: Directory,
}

impl DirectoryClient {
    pub const fn new(invoker: ScatterGatherInvoker, directory: Directory) -> Self {
        Self { invoker, directory }
    }

    pub fn resolve(
        &self,
        request: IdentifierRequest<String>,
    ) -> Result<TypedResponse<Record>, LookupError> {
        let directory = self.directory.clone();
        self.invoker
            .invoke(move |chunk| directory.lookup(chunk), request)
    }

    pub fn shutdown(&self) {
        self.invoker.pool().shutdown();
    }
}
