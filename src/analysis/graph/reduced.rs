//! The reduced "interesting instructions" view of an instruction graph.
//!
//! Liveness only changes at instructions that touch a variable, and flush points only exist at
//! statement boundaries. Everything else (stack shuffling, arithmetic, calls) merely forwards the
//! live set, so the liveness passes run on a smaller graph whose nodes are:
//!
//! - the entry instruction (index 0);
//! - reads and writes of variables (`Load`, `Store`, `Discard`);
//! - statement boundaries;
//! - control transfers (jumps, switches, returns, throws, subroutine calls and returns).
//!
//! An edge `a -> b` exists when `b` is reachable from `a` through a chain of uninteresting
//! instructions, following both normal and exceptional successors along the chain.

use crate::analysis::graph::{FlowGraph, InstrKind, InstructionGraph};

/// Graph over the interesting instructions of an [`InstructionGraph`].
///
/// Node `r` of the reduced graph corresponds to instruction [`ReducedGraph::original`]`(r)`.
/// Reduced nodes are numbered in instruction order, so node 0 is always the entry.
#[derive(Debug, Clone)]
pub struct ReducedGraph {
    nodes: Vec<usize>,
    reduced_index: Vec<Option<usize>>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    edge_count: usize,
}

impl ReducedGraph {
    /// Builds the reduced view of `graph`.
    #[must_use]
    pub fn new(graph: &InstructionGraph) -> Self {
        let count = graph.len();

        let mut nodes = Vec::new();
        let mut reduced_index = vec![None; count];
        for instr in graph.instructions() {
            if instr.index == 0 || is_interesting(&instr.kind) {
                reduced_index[instr.index] = Some(nodes.len());
                nodes.push(instr.index);
            }
        }

        let mut successors = Vec::with_capacity(nodes.len());
        let mut visited = vec![false; count];
        let mut touched = Vec::new();
        let mut stack = Vec::new();

        for &origin in &nodes {
            let mut succs = Vec::new();
            stack.extend(graph.successors(origin).iter().rev().copied());

            while let Some(current) = stack.pop() {
                if let Some(target) = reduced_index[current] {
                    if !succs.contains(&target) {
                        succs.push(target);
                    }
                    continue;
                }
                if visited[current] {
                    continue;
                }
                visited[current] = true;
                touched.push(current);
                stack.extend(graph.successors(current).iter().rev().copied());
            }

            for index in touched.drain(..) {
                visited[index] = false;
            }
            successors.push(succs);
        }

        let mut predecessors = vec![Vec::new(); nodes.len()];
        for (node, succs) in successors.iter().enumerate() {
            for &succ in succs {
                predecessors[succ].push(node);
            }
        }
        let edge_count = successors.iter().map(Vec::len).sum();

        Self {
            nodes,
            reduced_index,
            successors,
            predecessors,
            edge_count,
        }
    }

    /// Returns the number of reduced nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; the entry instruction is always part of the view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the instruction index of reduced node `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range.
    #[must_use]
    pub fn original(&self, node: usize) -> usize {
        self.nodes[node]
    }

    /// Returns the reduced node of an instruction, `None` if the instruction is not interesting.
    #[must_use]
    pub fn reduced(&self, instruction: usize) -> Option<usize> {
        self.reduced_index.get(instruction).copied().flatten()
    }

    /// Returns the instruction indices of all reduced nodes in order.
    #[must_use]
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }
}

impl FlowGraph for ReducedGraph {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn successors(&self, node: usize) -> &[usize] {
        &self.successors[node]
    }

    fn predecessors(&self, node: usize) -> &[usize] {
        &self.predecessors[node]
    }
}

fn is_interesting(kind: &InstrKind) -> bool {
    kind.variable().is_some()
        || matches!(kind, InstrKind::StatementBoundary)
        || kind.is_control_transfer()
}
