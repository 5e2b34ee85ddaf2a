//! A sorted set of unique `u32` values backed by a vector.
//!
//! Holds the members of an equivalence class. Membership is a binary search and iteration is
//! always in ascending order.

use std::ops::Deref;

/// A sorted set of unique integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortedIntSet {
    values: Vec<u32>,
}

impl SortedIntSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Inserts a value, returning `true` if it was not present.
    pub fn insert(&mut self, value: u32) -> bool {
        match self.values.binary_search(&value) {
            Ok(_) => false,
            Err(pos) => {
                self.values.insert(pos, value);
                true
            }
        }
    }

    /// Removes a value, returning `true` if it was present.
    pub fn remove(&mut self, value: u32) -> bool {
        match self.values.binary_search(&value) {
            Ok(pos) => {
                self.values.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns `true` if the value is present.
    #[must_use]
    pub fn contains(&self, value: u32) -> bool {
        self.values.binary_search(&value).is_ok()
    }

    /// Merges all values of `other` into `self`.
    pub fn union_with(&mut self, other: &Self) {
        let (left, right) = (&self.values, &other.values);
        let mut merged = Vec::with_capacity(left.len() + right.len());
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            match left[i].cmp(&right[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(left[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(right[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(left[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&left[i..]);
        merged.extend_from_slice(&right[j..]);
        self.values = merged;
    }

    /// Returns the values as a sorted slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.values
    }
}

impl Deref for SortedIntSet {
    type Target = [u32];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl FromIterator<u32> for SortedIntSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut values: Vec<u32> = iter.into_iter().collect();
        values.sort_unstable();
        values.dedup();
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_uniqueness() {
        let mut set = SortedIntSet::new();
        assert!(set.insert(5));
        assert!(set.insert(1));
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert_eq!(set.as_slice(), &[1, 3, 5]);
        assert!(set.contains(3));
        assert!(set.remove(3));
        assert!(!set.contains(3));
    }

    #[test]
    fn test_union() {
        let mut a: SortedIntSet = [1, 4, 9].into_iter().collect();
        let b: SortedIntSet = [2, 4, 10, 11].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a.as_slice(), &[1, 2, 4, 9, 10, 11]);
    }

    #[test]
    fn test_from_iter_dedups() {
        let set: SortedIntSet = [3, 1, 3, 2, 1].into_iter().collect();
        assert_eq!(&*set, &[1, 2, 3]);
        assert_eq!(set.len(), 3);
    }
}
