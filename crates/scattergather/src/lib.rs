//! Client-side scatter-gather for identifier lookups.
//!
//! Remote lookup endpoints usually cap the size of a request. This crate
//! takes a request for an arbitrary set of identifiers, splits it into
//! chunks that fit the cap, runs a caller-supplied chunk-call for every
//! chunk on a fixed pool of worker threads, and merges the partial results
//! into one set-valued response.
//!
//! Worker threads are reused, so each chunk-call runs inside the caller's
//! ambient context (locale, principal, and the caller's stack for
//! diagnostics), which is installed before and cleared after every task.
//!
//! ```
//! use scattergather::{IdentifierRequest, ScatterGatherInvoker, TypedResponse, WorkerPool};
//! use std::sync::Arc;
//!
//! let invoker = ScatterGatherInvoker::new(Arc::new(WorkerPool::new(4)?));
//! let request: IdentifierRequest<String> =
//!     (0..300).map(|i| format!("account-{i:05}")).collect();
//!
//! let found = invoker.invoke(
//!     |chunk: IdentifierRequest<String>| {
//!         // A real chunk-call would send `chunk.to_string()` to a remote service.
//!         Ok::<_, scattergather::Error>(chunk.into_iter().collect::<TypedResponse<_>>())
//!     },
//!     request,
//! )?;
//! assert_eq!(found.len(), 300);
//! # Ok::<(), scattergather::Error>(())
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit pool and invocation events through [`tracing`].
//! - `serde`: (de)serialize requests as `{"ids": [...]}` and responses as
//!   `{"elements": [...]}`.

mod context;
mod error;
mod invoker;
mod merge;
mod pool;
mod request;
mod response;
mod split;

pub use crate::context::*;
pub use crate::error::*;
pub use crate::invoker::*;
pub use crate::merge::*;
pub use crate::pool::*;
pub use crate::request::*;
pub use crate::response::*;
pub use crate::split::*;
