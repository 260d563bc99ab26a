//! Sparse binary activation vectors.
//!
//! An [`Activation`] is the universal signal passed between stimuli, regions and
//! the network: a fixed-length boolean vector whose true entries mark firing
//! neurons. Values are immutable once produced; every combinator returns a new
//! vector. The one exception is [`Activation::subsample_in_place`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prng::Prng;

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Activation {
    len: usize,
    words: Vec<u64>,
}

impl Activation {
    /// All-false activation of the given width.
    pub fn silent(len: usize) -> Self {
        Self {
            len,
            words: vec![0; len.div_ceil(WORD_BITS)],
        }
    }

    /// Build from the indices of firing neurons. Indices `>= len` are ignored.
    pub fn from_indices<I>(len: usize, indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut out = Self::silent(len);
        for i in indices {
            if i < len {
                out.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
            }
        }
        out
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        Self::from_indices(
            bits.len(),
            bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i),
        )
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cardinality: number of firing neurons.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_silent(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Indices of firing neurons in ascending order.
    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            core::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * WORD_BITS + bit)
            })
        })
    }

    pub fn to_bools(&self) -> Vec<bool> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// Number of positions firing in both vectors (common prefix when widths differ).
    pub fn and_count(&self, other: &Activation) -> usize {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    /// Boolean OR. The result takes the wider of the two widths.
    pub fn union(&self, other: &Activation) -> Activation {
        let mut out = if self.len >= other.len {
            self.clone()
        } else {
            other.clone()
        };
        out.or_assign(if self.len >= other.len { other } else { self });
        out
    }

    /// Boolean AND over the common prefix; the result has `self`'s width.
    pub fn intersection(&self, other: &Activation) -> Activation {
        let mut out = Self::silent(self.len);
        for (i, w) in out.words.iter_mut().enumerate() {
            *w = self.words[i] & other.words.get(i).copied().unwrap_or(0);
        }
        out
    }

    pub fn complement(&self) -> Activation {
        let mut out = Self {
            len: self.len,
            words: self.words.iter().map(|w| !w).collect(),
        };
        out.clear_tail();
        out
    }

    /// Keep a uniformly random subset of `keep` firing neurons, clearing the rest.
    ///
    /// This mutates in place and is the only non-producing operation on the
    /// type; callers that need an untouched original must clone first.
    pub fn subsample_in_place(&mut self, keep: usize, rng: &mut Prng) {
        let mut active: Vec<usize> = self.active_indices().collect();
        if keep >= active.len() {
            return;
        }
        rng.partial_shuffle(&mut active, keep);
        for w in &mut self.words {
            *w = 0;
        }
        for &i in &active[..keep] {
            self.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
        }
    }

    /// Accumulate `other` into a buffer owned by the caller (network pending inputs).
    pub(crate) fn or_assign(&mut self, other: &Activation) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
        self.clear_tail();
    }

    fn clear_tail(&mut self) {
        let rem = self.len % WORD_BITS;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_roundtrip_through_bitset() {
        let a = Activation::from_indices(130, [0, 63, 64, 129, 500]);
        assert_eq!(a.len(), 130);
        assert_eq!(a.count(), 4);
        assert_eq!(a.active_indices().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
        assert!(a.get(129));
        assert!(!a.get(128));
        assert!(!a.get(1000));
    }

    #[test]
    fn complement_respects_width() {
        let a = Activation::from_indices(70, [1, 2, 69]);
        let c = a.complement();
        assert_eq!(c.count(), 67);
        assert_eq!(a.and_count(&c), 0);
        assert_eq!(a.union(&c).count(), 70);
    }

    #[test]
    fn union_and_intersection() {
        let a = Activation::from_indices(10, [1, 2, 3]);
        let b = Activation::from_indices(10, [3, 4]);
        assert_eq!(
            a.union(&b).active_indices().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(a.intersection(&b).active_indices().collect::<Vec<_>>(), vec![3]);
        assert_eq!(a.and_count(&b), 1);
    }

    #[test]
    fn subsample_keeps_exact_count_of_original_bits() {
        let original = Activation::from_indices(200, (0..200).step_by(3));
        let mut sub = original.clone();
        let mut rng = Prng::new(3);
        sub.subsample_in_place(10, &mut rng);
        assert_eq!(sub.count(), 10);
        assert_eq!(sub.and_count(&original), 10);
    }

    #[test]
    fn bools_roundtrip() {
        let bits = vec![false, true, false, true, true];
        let a = Activation::from_bools(&bits);
        assert_eq!(a.to_bools(), bits);
        assert!(!a.is_silent());
        assert!(Activation::silent(5).is_silent());
    }
}
