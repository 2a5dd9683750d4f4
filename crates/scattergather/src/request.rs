use core::fmt::{self, Write as _};
use core::str::FromStr;
use std::collections::BTreeSet;

/// The character separating identifiers in the textual request encoding.
pub const DELIMITER: char = ',';

/// A request to look up every resource matching a set of identifiers.
///
/// Identifiers are kept in ascending order with duplicates removed. The order
/// the caller supplied them in is not significant, but every iteration,
/// rendering, and split walks them sorted, so the same logical request always
/// produces the same chunks and the same textual form. Downstream response
/// caches keyed by chunk content depend on that.
///
/// # Example
/// ```
/// use scattergather::IdentifierRequest;
///
/// let request: IdentifierRequest<u32> = [3, 1, 2, 3].into_iter().collect();
/// assert_eq!(request.len(), 3);
/// assert_eq!(request.to_string(), "1,2,3");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(bound(deserialize = "T: serde::Deserialize<'de> + Ord")))]
pub struct IdentifierRequest<T> {
    ids: BTreeSet<T>,
}

impl<T: Ord> IdentifierRequest<T> {
    /// Creates an empty request.
    pub const fn new() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }

    /// The identifiers, in ascending order.
    pub const fn ids(&self) -> &BTreeSet<T> {
        &self.ids
    }

    /// Iterates the identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &T) -> bool {
        self.ids.contains(id)
    }

    /// Replaces the whole identifier set.
    ///
    /// There is no way to add or remove single identifiers: a request is
    /// either rebuilt or swapped wholesale.
    pub fn replace_ids(&mut self, ids: impl IntoIterator<Item = T>) {
        self.ids = ids.into_iter().collect();
    }

    pub fn into_ids(self) -> BTreeSet<T> {
        self.ids
    }

    /// Parses the textual encoding produced by [`Display`](fmt::Display),
    /// converting every token with `converter`.
    ///
    /// An empty string parses to the empty request. The first conversion
    /// failure is returned unchanged.
    ///
    /// # Example
    /// ```
    /// use scattergather::IdentifierRequest;
    ///
    /// let request = IdentifierRequest::parse_with("7,3,7", str::parse::<u64>).unwrap();
    /// assert_eq!(request.to_string(), "3,7");
    /// ```
    pub fn parse_with<E>(
        source: &str,
        converter: impl FnMut(&str) -> Result<T, E>,
    ) -> Result<Self, E> {
        if source.is_empty() {
            return Ok(Self::new());
        }

        let ids = source
            .split(DELIMITER)
            .map(converter)
            .collect::<Result<BTreeSet<_>, E>>()?;
        Ok(Self { ids })
    }
}

impl<T: Ord> Default for IdentifierRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> FromIterator<T> for IdentifierRequest<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<T: Ord> From<BTreeSet<T>> for IdentifierRequest<T> {
    fn from(ids: BTreeSet<T>) -> Self {
        Self { ids }
    }
}

impl<T: Ord> From<Vec<T>> for IdentifierRequest<T> {
    fn from(ids: Vec<T>) -> Self {
        ids.into_iter().collect()
    }
}

impl<T: Ord, const N: usize> From<[T; N]> for IdentifierRequest<T> {
    fn from(ids: [T; N]) -> Self {
        ids.into_iter().collect()
    }
}

impl<T> IntoIterator for IdentifierRequest<T> {
    type Item = T;
    type IntoIter = std::collections::btree_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a IdentifierRequest<T> {
    type Item = &'a T;
    type IntoIter = std::collections::btree_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// Renders the sorted identifiers joined by [`DELIMITER`].
impl<T: fmt::Display> fmt::Display for IdentifierRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_char(DELIMITER)?;
            }
            fmt::Display::fmt(id, f)?;
        }
        Ok(())
    }
}

impl<T: Ord + FromStr> FromStr for IdentifierRequest<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with(s, str::parse::<T>)
    }
}
