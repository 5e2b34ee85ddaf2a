//! A fixed-capacity bit vector over small integer identifiers.
//!
//! [`BitSet`] is the storage behind live-variable sets, kill masks and the solver's
//! per-fact node sets. Identifiers are dense (`0..capacity`), so 64 of them fit in one word and
//! the set operations used by the liveness passes (union, difference, subset checks) are
//! word-parallel.
//!
//! # Example
//!
//! ```rust
//! use flowscope::utils::BitSet;
//!
//! let mut set = BitSet::new(100);
//! set.insert(0);
//! set.insert(50);
//! set.insert(99);
//!
//! assert!(set.contains(50));
//! assert_eq!(set.count(), 3);
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 50, 99]);
//! ```

/// A bit vector for efficient set operations on dense identifiers.
///
/// Equality and hashing are structural, which makes a `BitSet` usable as (part of) a
/// deduplication key in the worklist solver.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// The number of addressable bits.
    len: usize,
}

impl BitSet {
    /// Creates a new empty bit set able to hold identifiers `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Creates a bit set with the given identifiers set.
    ///
    /// # Panics
    ///
    /// Panics if any identifier is `>= capacity`.
    #[must_use]
    pub fn from_indices(capacity: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(capacity);
        for index in indices {
            set.insert(index);
        }
        set
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at the given index, returning `true` if it was not set before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Clears the bit at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.len, "index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the bit at the given index is set.
    ///
    /// Out-of-range indices are simply not contained.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Computes the union with another bit set (in place).
    ///
    /// Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Removes every bit that is set in `other` (in place).
    ///
    /// Returns `true` if `self` changed.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a &= !*b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns `true` if every bit set in `self` is also set in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & !b == 0)
    }

    /// Returns an iterator over the indices of set bits, in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits in a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    /// Remaining (not yet yielded) bits of the current word.
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            self.current = *self.set.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());

        assert!(bs.insert(0));
        assert!(bs.insert(50));
        assert!(bs.insert(99));
        assert!(!bs.insert(50));

        assert_eq!(bs.count(), 3);
        assert!(bs.contains(99));
        assert!(!bs.contains(1));
        assert!(!bs.contains(1000));
    }

    #[test]
    fn test_bitset_union_and_difference() {
        let mut a = BitSet::from_indices(70, [0, 1, 65]);
        let b = BitSet::from_indices(70, [1, 2]);

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0, 1, 2, 65]);

        assert!(a.difference_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0, 65]);
    }

    #[test]
    fn test_bitset_subset() {
        let small = BitSet::from_indices(10, [3]);
        let big = BitSet::from_indices(10, [3, 7]);
        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));
        assert!(BitSet::new(10).is_subset(&small));
    }

    #[test]
    fn test_bitset_iter_word_boundaries() {
        let bs = BitSet::from_indices(200, [63, 64, 127, 128, 199]);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![63, 64, 127, 128, 199]);
        assert_eq!(BitSet::new(0).iter().count(), 0);
    }

    #[test]
    fn test_bitset_hash_eq() {
        use std::collections::HashSet;

        let a = BitSet::from_indices(10, [1, 2]);
        let b = BitSet::from_indices(10, [2, 1]);
        let mut seen = HashSet::new();
        seen.insert(a);
        assert!(seen.contains(&b));
    }
}
