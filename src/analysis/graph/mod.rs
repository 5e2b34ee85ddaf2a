//! Instruction-level control flow graphs.
//!
//! This module provides the graph the analyses run on:
//!
//! - [`InstrKind`] / [`Instruction`] - the closed instruction set of the stack machine
//! - [`InstructionGraph`] - the validated, immutable instruction sequence with precomputed
//!   successor and predecessor adjacency (normal and exceptional edges)
//! - [`ReducedGraph`] - a view containing only the instructions relevant to liveness
//! - [`CodeAssembler`] - a label-resolving builder for instruction graphs
//!
//! Analyses are written against the [`FlowGraph`] trait so the worklist solver can run on the
//! full graph as well as on the reduced view.

mod assembler;
mod instrgraph;
mod instruction;
mod reduced;

pub use assembler::CodeAssembler;
pub use instrgraph::{ExceptionRange, InstructionGraph};
pub use instruction::{Dispatch, InstrCategory, InstrKind, Instruction};
pub use reduced::ReducedGraph;

/// Index-based adjacency of a directed graph.
///
/// Nodes are the dense indices `0..node_count()`. Implementations precompute their adjacency, so
/// the accessors are cheap slice lookups.
pub trait FlowGraph {
    /// Returns the number of nodes.
    fn node_count(&self) -> usize;

    /// Returns the total number of edges.
    fn edge_count(&self) -> usize;

    /// Returns the successors of `node`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `node` is out of range.
    fn successors(&self, node: usize) -> &[usize];

    /// Returns the predecessors of `node`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `node` is out of range.
    fn predecessors(&self, node: usize) -> &[usize];
}
