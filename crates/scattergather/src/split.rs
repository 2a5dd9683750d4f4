//! Size-bounded chunking of identifier requests.
//!
//! A request is only split when its serialized payload would exceed the
//! budget. Splitting then cuts the ascending identifier sequence into windows
//! of a fixed number of identifiers. The window size comes from an *assumed*
//! identifier length rather than from measuring each chunk, which keeps chunk
//! boundaries a pure function of the identifier set: the same request always
//! yields the same chunks, and chunk-keyed response caches keep hitting.
//!
//! The price is accuracy. Identifiers noticeably longer than the assumed
//! length can produce chunks whose real payload exceeds the budget.

use crate::{Error, IdentifierRequest, Result};
use core::fmt::{self, Write};

/// The maximum serialized payload length of a single request.
pub const MAX_PAYLOAD_LEN: usize = 1000;

/// Length of a URL-encoded delimiter between two identifiers.
pub const ENCODED_DELIMITER_LEN: usize = 3;

/// Assumed length of one identifier plus its delimiter: a 36 character UUID
/// followed by an encoded delimiter.
pub const UNIFORM_ID_LEN: usize = 36 + ENCODED_DELIMITER_LEN;

/// Splits `request` with the [default policy](SplitPolicy::DEFAULT).
///
/// A missing request passes through as `None`.
///
/// # Example
/// ```
/// use scattergather::{IdentifierRequest, split};
///
/// assert!(split::<u32>(None).is_none());
///
/// let small = IdentifierRequest::from([1_u32, 2, 3]);
/// assert_eq!(split(Some(small.clone())), Some(vec![small]));
/// ```
pub fn split<T>(request: Option<IdentifierRequest<T>>) -> Option<Vec<IdentifierRequest<T>>>
where
    T: Ord + fmt::Display,
{
    request.map(|request| SplitPolicy::DEFAULT.split(request))
}

/// Budget and sizing assumptions used to chunk identifier requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SplitPolicy {
    max_payload_len: usize,
    assumed_id_len: usize,
    delimiter_len: usize,
}

impl SplitPolicy {
    /// 1000 byte payloads of UUID-sized identifiers, 25 identifiers per chunk.
    pub const DEFAULT: Self = Self {
        max_payload_len: MAX_PAYLOAD_LEN,
        assumed_id_len: UNIFORM_ID_LEN,
        delimiter_len: ENCODED_DELIMITER_LEN,
    };

    /// Creates a policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSplitPolicy`] if `assumed_id_len` is zero or
    /// larger than `max_payload_len`, since no chunk could then hold a single
    /// identifier.
    pub fn new(max_payload_len: usize, assumed_id_len: usize, delimiter_len: usize) -> Result<Self> {
        if assumed_id_len == 0 {
            return Err(Error::InvalidSplitPolicy {
                reason: "assumed identifier length must be greater than 0".to_string(),
            });
        }
        if assumed_id_len > max_payload_len {
            return Err(Error::InvalidSplitPolicy {
                reason: format!(
                    "assumed identifier length ({assumed_id_len}) exceeds the payload budget ({max_payload_len})"
                ),
            });
        }

        Ok(Self {
            max_payload_len,
            assumed_id_len,
            delimiter_len,
        })
    }

    pub const fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    pub const fn assumed_id_len(&self) -> usize {
        self.assumed_id_len
    }

    pub const fn delimiter_len(&self) -> usize {
        self.delimiter_len
    }

    /// Number of identifiers placed in each chunk once a request is split.
    pub const fn window(&self) -> usize {
        self.max_payload_len / self.assumed_id_len
    }

    /// Serialized length of `request`: every identifier's display length plus
    /// one delimiter between each pair.
    pub fn payload_len<T: fmt::Display>(&self, request: &IdentifierRequest<T>) -> usize
    where
        T: Ord,
    {
        let ids: usize = request.iter().map(display_len).sum();
        request
            .len()
            .saturating_sub(1)
            .saturating_mul(self.delimiter_len)
            .saturating_add(ids)
    }

    /// Returns `true` if `request` must be split to fit the budget.
    pub fn exceeds_budget<T: Ord + fmt::Display>(&self, request: &IdentifierRequest<T>) -> bool {
        self.payload_len(request) > self.max_payload_len
    }

    /// Splits `request` into chunks.
    ///
    /// Requests within budget, including the empty request, come back as the
    /// only element, unchanged. Larger requests are cut into ascending
    /// windows of [`window`](Self::window) identifiers. A lone identifier is
    /// never split further, however long it is.
    pub fn split<T>(&self, request: IdentifierRequest<T>) -> Vec<IdentifierRequest<T>>
    where
        T: Ord + fmt::Display,
    {
        if !self.exceeds_budget(&request) {
            return vec![request];
        }

        let window = self.window().max(1);
        let mut chunks = Vec::with_capacity(request.len().div_ceil(window));
        let mut ids = request.into_iter().peekable();
        while ids.peek().is_some() {
            chunks.push(ids.by_ref().take(window).collect());
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(chunks = chunks.len(), window, "Split oversized identifier request");

        chunks
    }
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Counts formatted bytes without allocating the string.
struct LenCounter(usize);

impl Write for LenCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

fn display_len<T: fmt::Display>(id: &T) -> usize {
    let mut counter = LenCounter(0);
    // Writing into `LenCounter` never fails; only a broken `Display` impl can.
    let _ = write!(counter, "{id}");
    counter.0
}
