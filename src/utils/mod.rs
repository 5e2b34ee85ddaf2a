//! Small data structures shared by the analyses.
//!
//! - [`BitSet`] - dense bit vector used for live sets, kill masks and solver bookkeeping
//! - [`SortedIntSet`] - sorted vector set used as equivalence class membership

mod bitset;
mod sortedset;

pub use bitset::{BitSet, BitSetIter};
pub use sortedset::SortedIntSet;
