use crate::{Error, Result};
use core::hash::Hash;
use std::collections::{HashMap, HashSet, hash_map::Entry};

/// A set of result elements returned for an [`IdentifierRequest`].
///
/// Elements follow set semantics: adding an element equal to one already
/// present has no effect. One instance is produced per chunk-call and then
/// folded into the accumulated response by [`merge`](crate::merge); once
/// moved into a merge it is never observed again.
///
/// [`IdentifierRequest`]: crate::IdentifierRequest
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "R: serde::Serialize",
        deserialize = "R: serde::Deserialize<'de> + Eq + Hash"
    ))
)]
pub struct TypedResponse<R> {
    elements: HashSet<R>,
}

impl<R: Eq + Hash> TypedResponse<R> {
    pub fn new() -> Self {
        Self {
            elements: HashSet::new(),
        }
    }

    pub const fn elements(&self) -> &HashSet<R> {
        &self.elements
    }

    pub fn into_elements(self) -> HashSet<R> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns `true` if at least one element is present.
    pub fn has_results(&self) -> bool {
        !self.elements.is_empty()
    }

    /// Returns `true` if exactly one element is present.
    pub fn has_single_result(&self) -> bool {
        self.elements.len() == 1
    }

    pub fn contains(&self, element: &R) -> bool {
        self.elements.contains(element)
    }

    /// Adds an element, collapsing it into an equal element if present.
    pub fn add(&mut self, element: R) -> &mut Self {
        self.elements.insert(element);
        self
    }

    /// Replaces every element at once.
    pub fn replace_elements(&mut self, elements: impl IntoIterator<Item = R>) -> &mut Self {
        self.elements = elements.into_iter().collect();
        self
    }

    /// Returns the only element of the response.
    ///
    /// # Errors
    ///
    /// - [`Error::NoResult`] if the response is empty.
    /// - [`Error::NonUniqueResult`] if it holds more than one element.
    pub fn single_result(&self) -> Result<&R> {
        match self.elements.len() {
            0 => Err(Error::NoResult),
            1 => self.elements.iter().next().ok_or(Error::NoResult),
            count => Err(Error::NonUniqueResult { count }),
        }
    }

    /// Consumes the response and returns its only element.
    ///
    /// # Errors
    ///
    /// Same as [`single_result`](Self::single_result).
    pub fn into_single_result(self) -> Result<R> {
        match self.elements.len() {
            0 => Err(Error::NoResult),
            1 => self.elements.into_iter().next().ok_or(Error::NoResult),
            count => Err(Error::NonUniqueResult { count }),
        }
    }

    /// Indexes the elements by `key`.
    ///
    /// Keys are expected to be unique. If two elements produce the same key,
    /// the one visited last wins; set iteration order is unspecified, so the
    /// surviving element is unspecified as well. Use
    /// [`try_index_by`](Self::try_index_by) to reject duplicates instead.
    ///
    /// # Example
    /// ```
    /// use scattergather::TypedResponse;
    ///
    /// let response: TypedResponse<(u32, &str)> = [(1, "one"), (2, "two")].into_iter().collect();
    /// let by_id = response.index_by(|(id, _)| *id);
    /// assert_eq!(by_id[&2].1, "two");
    /// ```
    pub fn index_by<K, F>(&self, mut key: F) -> HashMap<K, &R>
    where
        K: Eq + Hash,
        F: FnMut(&R) -> K,
    {
        self.elements.iter().map(|e| (key(e), e)).collect()
    }

    /// Indexes the elements by `key`, failing on the first duplicate key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if two elements map to the same key.
    pub fn try_index_by<K, F>(&self, mut key: F) -> Result<HashMap<K, &R>>
    where
        K: Eq + Hash,
        F: FnMut(&R) -> K,
    {
        let mut index = HashMap::with_capacity(self.elements.len());
        for element in &self.elements {
            match index.entry(key(element)) {
                Entry::Occupied(_) => return Err(Error::DuplicateKey),
                Entry::Vacant(slot) => {
                    slot.insert(element);
                }
            }
        }
        Ok(index)
    }
}

// Manual so the bounds match those of `HashSet` equality.
impl<R: Eq + Hash> PartialEq for TypedResponse<R> {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl<R: Eq + Hash> Eq for TypedResponse<R> {}

impl<R: Eq + Hash> Default for TypedResponse<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Eq + Hash> FromIterator<R> for TypedResponse<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<R: Eq + Hash> From<HashSet<R>> for TypedResponse<R> {
    fn from(elements: HashSet<R>) -> Self {
        Self { elements }
    }
}

impl<R> IntoIterator for TypedResponse<R> {
    type Item = R;
    type IntoIter = std::collections::hash_set::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a TypedResponse<R> {
    type Item = &'a R;
    type IntoIter = std::collections::hash_set::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
