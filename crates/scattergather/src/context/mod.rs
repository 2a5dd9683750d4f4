//! Carrying a caller's ambient context into pooled worker threads.
//!
//! Ambient context here means per-thread state that code deep inside a
//! chunk-call expects to find: the caller's locale, the authenticated
//! principal, and, for diagnostics, where the logical call originated.
//!
//! Worker threads are reused across unrelated invocations, so thread-ambient
//! state is only ever touched through an explicit bracket:
//!
//! 1. [`ContextSnapshot::capture`] runs once on the calling thread.
//! 2. [`ContextSnapshot::install`] runs on the worker before the chunk-call
//!    and replaces whatever the thread carried before.
//! 3. [`ContextSnapshot::clear`] runs on the worker after the chunk-call,
//!    whether it returned, failed, or panicked.
//!
//! How locale and principal are actually stored is up to a
//! [`ContextProvider`]. [`ThreadLocalContext`] is the bundled in-process one.

mod local;
mod trace;

pub use local::*;
pub use trace::*;

use core::fmt;
use std::cell::RefCell;
use std::sync::Arc;

/// Access to the ambient locale and security principal of the current thread.
///
/// Every method acts on the thread it is called from. Implementations are
/// shared by all workers of a pool and must therefore be `Send + Sync`.
pub trait ContextProvider: Send + Sync + 'static {
    type Locale: Clone + fmt::Debug + Send + Sync + 'static;
    type Principal: Clone + fmt::Debug + Send + Sync + 'static;

    /// The locale of the current thread, or the provider's default.
    fn current_locale(&self) -> Self::Locale;

    fn set_locale(&self, locale: Self::Locale);

    /// Drops the thread's locale so that `current_locale` falls back to the
    /// default.
    fn reset_locale(&self);

    /// The principal the current thread runs as, if any.
    fn current_principal(&self) -> Option<Self::Principal>;

    fn set_principal(&self, principal: Self::Principal);

    fn clear_principal(&self);
}

thread_local! {
    /// The causal trace of the invocation the current worker is serving.
    static INSTALLED_TRACE: RefCell<Option<Arc<CausalTrace>>> = const { RefCell::new(None) };
}

/// The ambient context of one logical invocation, captured on the calling
/// thread.
///
/// A snapshot is captured once per invocation, never per chunk, and is
/// shared read-only by all chunk tasks of that invocation.
pub struct ContextSnapshot<P: ContextProvider> {
    locale: P::Locale,
    principal: Option<P::Principal>,
    trace: Arc<CausalTrace>,
}

impl<P: ContextProvider> ContextSnapshot<P> {
    /// Captures locale, principal, and the caller's stack.
    pub fn capture(provider: &P) -> Self {
        Self::with_trace(provider, CausalTrace::capture())
    }

    /// Captures locale and principal only, leaving the trace empty.
    pub fn capture_without_trace(provider: &P) -> Self {
        Self::with_trace(provider, CausalTrace::empty())
    }

    fn with_trace(provider: &P, trace: CausalTrace) -> Self {
        Self {
            locale: provider.current_locale(),
            principal: provider.current_principal(),
            trace: Arc::new(trace),
        }
    }

    pub const fn locale(&self) -> &P::Locale {
        &self.locale
    }

    pub const fn principal(&self) -> Option<&P::Principal> {
        self.principal.as_ref()
    }

    pub fn trace(&self) -> &CausalTrace {
        &self.trace
    }

    /// Makes this snapshot the ambient context of the current thread.
    ///
    /// Every part is overwritten, including the principal when the snapshot
    /// holds none, so nothing left behind by an earlier task survives.
    pub fn install(&self, provider: &P) {
        provider.set_locale(self.locale.clone());
        match &self.principal {
            Some(principal) => provider.set_principal(principal.clone()),
            None => provider.clear_principal(),
        }
        INSTALLED_TRACE.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&self.trace)));
    }

    /// Removes any ambient context from the current thread.
    pub fn clear(provider: &P) {
        provider.reset_locale();
        provider.clear_principal();
        INSTALLED_TRACE.with(|slot| *slot.borrow_mut() = None);
    }
}

impl<P: ContextProvider> fmt::Debug for ContextSnapshot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("locale", &self.locale)
            .field("principal", &self.principal)
            .field("trace_frames", &self.trace.frames().len())
            .finish()
    }
}
