//! Set-union reduction over partial [`TypedResponse`]s.
//!
//! Every chunk-call yields its own partial response. Merging is a plain set
//! union, which makes it associative and commutative with the empty response
//! as identity: partial responses may be folded in completion order, in
//! submission order, pairwise from several threads, or any mix of those, and
//! the final set is always the same.

use crate::TypedResponse;
use core::hash::Hash;
use core::iter::Sum;

/// Combines two partial responses into one.
///
/// Elements equal in both collapse to a single element. The larger set is
/// reused as the accumulator, so folding many small chunks into one growing
/// response stays linear in the total number of elements.
///
/// # Example
/// ```
/// use scattergather::{TypedResponse, merge};
///
/// let left: TypedResponse<u8> = [1, 2].into_iter().collect();
/// let right: TypedResponse<u8> = [2, 3].into_iter().collect();
/// assert_eq!(merge(left, right).len(), 3);
/// ```
pub fn merge<R: Eq + Hash>(left: TypedResponse<R>, right: TypedResponse<R>) -> TypedResponse<R> {
    let (mut into, from) = if left.len() >= right.len() {
        (left.into_elements(), right)
    } else {
        (right.into_elements(), left)
    };
    into.extend(from);
    into.into()
}

/// Reducer for partial responses, usable wherever a seed and a combining
/// function are expected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResponseMerger;

impl ResponseMerger {
    /// The empty response, the identity element of [`combine`](Self::combine).
    pub fn identity<R: Eq + Hash>() -> TypedResponse<R> {
        TypedResponse::new()
    }

    /// Same as [`merge`].
    pub fn combine<R: Eq + Hash>(
        left: TypedResponse<R>,
        right: TypedResponse<R>,
    ) -> TypedResponse<R> {
        merge(left, right)
    }

    /// Folds any number of partial responses, starting from the identity.
    pub fn reduce<R, I>(partials: I) -> TypedResponse<R>
    where
        R: Eq + Hash,
        I: IntoIterator<Item = TypedResponse<R>>,
    {
        partials
            .into_iter()
            .fold(Self::identity(), Self::combine)
    }
}

impl<R: Eq + Hash> Extend<TypedResponse<R>> for TypedResponse<R> {
    fn extend<I: IntoIterator<Item = TypedResponse<R>>>(&mut self, iter: I) {
        let acc = core::mem::take(self);
        *self = iter.into_iter().fold(acc, merge);
    }
}

impl<R: Eq + Hash> Sum for TypedResponse<R> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        ResponseMerger::reduce(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    fn response(elements: &[u32]) -> TypedResponse<u32> {
        elements.iter().copied().collect()
    }

    fn random_response(len: usize) -> TypedResponse<u32> {
        let mut rng = rand::rng();
        (0..len).map(|_| rng.random_range(0..512)).collect()
    }

    #[test]
    fn union_collapses_equal_elements() {
        let merged = merge(response(&[1, 2, 3]), response(&[3, 4]));
        assert_eq!(merged, response(&[1, 2, 3, 4]));
    }

    #[test]
    fn identity_is_neutral() {
        let a = response(&[5, 6]);
        assert_eq!(merge(a.clone(), ResponseMerger::identity()), a);
        assert_eq!(merge(ResponseMerger::identity(), a.clone()), a);
    }

    #[test]
    fn associative_and_commutative() {
        for _ in 0..32 {
            let a = random_response(64);
            let b = random_response(128);
            let c = random_response(16);

            let left_assoc = merge(merge(a.clone(), b.clone()), c.clone());
            let right_assoc = merge(a.clone(), merge(b.clone(), c.clone()));
            let swapped = merge(merge(b.clone(), a.clone()), c.clone());

            assert_eq!(left_assoc, right_assoc);
            assert_eq!(left_assoc, swapped);
        }
    }

    #[test]
    fn reduce_sum_and_extend_agree() {
        let partials = vec![response(&[1]), response(&[2, 3]), response(&[3, 4])];
        let collected = ResponseMerger::reduce(partials.clone());
        let summed: TypedResponse<u32> = partials.clone().into_iter().sum();
        let mut extended = response(&[0]);
        extended.extend(partials);

        assert_eq!(collected, response(&[1, 2, 3, 4]));
        assert_eq!(summed, collected);
        assert_eq!(extended, response(&[0, 1, 2, 3, 4]));
    }

    #[test]
    fn parallel_reduction_matches_sequential() {
        let partials: Vec<_> = (0..64).map(|_| random_response(32)).collect();
        let expected: HashSet<u32> = partials
            .iter()
            .flat_map(|r| r.elements().iter().copied())
            .collect();

        let halves: Vec<TypedResponse<u32>> = std::thread::scope(|s| {
            let handles: Vec<_> = partials
                .chunks(16)
                .map(|chunk| {
                    let chunk = chunk.to_vec();
                    s.spawn(move || ResponseMerger::reduce(chunk))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let merged: TypedResponse<u32> = halves.into_iter().rev().sum();
        assert_eq!(merged.into_elements(), expected);
    }
}
