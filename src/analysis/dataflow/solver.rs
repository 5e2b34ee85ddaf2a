//! Worklist fixpoint solver over `(node, fact)` pairs.
//!
//! The solver does not join facts. Every distinct fact reaching a node is processed exactly once,
//! which keeps analyses with small, path-sensitive facts (a single storage location, a live set)
//! precise without requiring a lattice.
//!
//! # Algorithm
//!
//! 1. Enqueue every seed pair that has not been seen before
//! 2. While the queue is non-empty:
//!    a. Dequeue a pair, polling for cancellation every `poll_interval` dequeues
//!    b. Apply the transfer function to the node and its fact
//!    c. On [`Flow::Continue`] or [`Flow::Pass`], enqueue the resulting fact at every neighbour
//!       (successors for forward runs, predecessors for backward runs) not yet queued with it;
//!       on [`Flow::Redirect`], only at the nodes the transfer function names
//!
//! # Termination
//!
//! Facts may be drawn from an unbounded domain, so termination is enforced by a step budget of
//! `max(edges, 1) * step_multiplier`. A run that exhausts it fails with
//! [`crate::Error::TooComplex`]. Transparent nodes answer [`Flow::Pass`], which is not charged a
//! step; total dequeues are additionally capped at twice the budget.

use std::{
    borrow::Cow,
    collections::{HashMap, VecDeque},
    hash::Hash,
};

use tracing::debug;

use crate::{
    analysis::graph::FlowGraph, config::AnalysisConfig, utils::BitSet, Error, Result,
};

/// Direction of a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Facts flow from a node to its successors.
    ///
    /// Examples: frame shapes, flush candidates.
    Forward,

    /// Facts flow from a node to its predecessors.
    ///
    /// Examples: live variables, value origins.
    Backward,
}

/// Processing order of the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueOrder {
    /// First in, first out (breadth-first).
    #[default]
    Fifo,
    /// Last in, first out (depth-first).
    Lifo,
}

/// Result of applying a transfer function to one `(node, fact)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<F> {
    /// Propagate the fact to the neighbours.
    Continue(F),
    /// Propagate the fact without charging a step; for nodes without effect.
    Pass(F),
    /// Propagate the fact to the given nodes only, instead of all neighbours.
    Redirect(F, Vec<usize>),
    /// Do not propagate anything.
    Stop,
}

/// Counters describing a finished solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolverStats {
    /// Charged transfer applications.
    pub steps: usize,
    /// Dequeued work items, charged or not.
    pub dequeued: usize,
    /// Distinct `(node, fact)` pairs ever queued.
    pub distinct_pairs: usize,
}

/// Worklist solver bound to one graph.
///
/// # Usage
///
/// ```rust
/// use flowscope::analysis::{CodeAssembler, Direction, Flow, WorklistSolver};
/// use flowscope::config::AnalysisConfig;
///
/// let mut asm = CodeAssembler::new();
/// asm.push_const()?.pop()?.ret_void()?;
/// let graph = asm.finish()?;
///
/// // Forward reachability: the fact is simply `()`.
/// let mut reached = vec![false; graph.len()];
/// let config = AnalysisConfig::default();
/// let solver = WorklistSolver::new(&graph, Direction::Forward, &config);
/// solver.run([(0, ())], |node, _| {
///     reached[node] = true;
///     Ok(Flow::Continue(()))
/// })?;
///
/// assert_eq!(reached, vec![true, true, true]);
/// # Ok::<(), flowscope::Error>(())
/// ```
pub struct WorklistSolver<'a, G: FlowGraph> {
    graph: &'a G,
    direction: Direction,
    budget: usize,
    poll_interval: usize,
    order: QueueOrder,
    cancel: Option<&'a (dyn Fn() -> bool + Sync)>,
}

impl<'a, G: FlowGraph> WorklistSolver<'a, G> {
    /// Creates a solver for `graph` using the limits of `config`.
    #[must_use]
    pub fn new(graph: &'a G, direction: Direction, config: &AnalysisConfig) -> Self {
        Self {
            graph,
            direction,
            budget: config.step_budget(graph.edge_count()),
            poll_interval: config.poll_interval.max(1),
            order: config.queue_order,
            cancel: None,
        }
    }

    /// Installs a cancellation check, polled every `poll_interval` dequeues.
    #[must_use]
    pub fn with_cancellation(mut self, check: &'a (dyn Fn() -> bool + Sync)) -> Self {
        self.cancel = Some(check);
        self
    }

    /// Returns the step budget of a run.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Runs the solver from `seeds` until no new pairs are produced.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Initial `(node, fact)` pairs
    /// * `transfer` - Called once per distinct dequeued pair
    ///
    /// # Errors
    ///
    /// - [`Error::TooComplex`] if the step budget is exhausted
    /// - [`Error::Cancelled`] if the cancellation check fires
    /// - any error returned by `transfer`
    pub fn run<F, T>(
        &self,
        seeds: impl IntoIterator<Item = (usize, F)>,
        mut transfer: T,
    ) -> Result<SolverStats>
    where
        F: Clone + Eq + Hash,
        T: FnMut(usize, &F) -> Result<Flow<F>>,
    {
        let node_count = self.graph.node_count();
        let mut seen: HashMap<F, BitSet> = HashMap::new();
        let mut queue: VecDeque<(usize, F)> = VecDeque::new();
        let mut stats = SolverStats::default();

        let mut enqueue = |queue: &mut VecDeque<(usize, F)>,
                           stats: &mut SolverStats,
                           node: usize,
                           fact: F|
         -> Result<()> {
            if node >= node_count {
                return Err(malformed_error!(
                    "Work item for node {} outside of 0..{}",
                    node,
                    node_count
                ));
            }
            let nodes = seen
                .entry(fact.clone())
                .or_insert_with(|| BitSet::new(node_count));
            if nodes.insert(node) {
                stats.distinct_pairs += 1;
                queue.push_back((node, fact));
            }
            Ok(())
        };

        for (node, fact) in seeds {
            enqueue(&mut queue, &mut stats, node, fact)?;
        }

        let dequeue_cap = self.budget.saturating_mul(2);
        loop {
            let next = match self.order {
                QueueOrder::Fifo => queue.pop_front(),
                QueueOrder::Lifo => queue.pop_back(),
            };
            let Some((node, fact)) = next else {
                break;
            };

            stats.dequeued += 1;
            if stats.dequeued % self.poll_interval == 0 {
                if let Some(check) = self.cancel {
                    if check() {
                        return Err(Error::Cancelled);
                    }
                }
            }
            if stats.dequeued > dequeue_cap {
                return Err(self.too_complex(&stats));
            }

            let neighbours = match self.direction {
                Direction::Forward => self.graph.successors(node),
                Direction::Backward => self.graph.predecessors(node),
            };
            let (out, targets) = match transfer(node, &fact)? {
                Flow::Stop => {
                    stats.steps += 1;
                    (None, Cow::Borrowed(&[][..]))
                }
                Flow::Continue(out) => {
                    stats.steps += 1;
                    (Some(out), Cow::Borrowed(neighbours))
                }
                Flow::Pass(out) => (Some(out), Cow::Borrowed(neighbours)),
                Flow::Redirect(out, targets) => {
                    stats.steps += 1;
                    (Some(out), Cow::Owned(targets))
                }
            };
            if stats.steps > self.budget {
                return Err(self.too_complex(&stats));
            }

            if let Some(out) = out {
                for &next in targets.iter() {
                    enqueue(&mut queue, &mut stats, next, out.clone())?;
                }
            }
        }

        debug!(
            direction = ?self.direction,
            steps = stats.steps,
            dequeued = stats.dequeued,
            pairs = stats.distinct_pairs,
            budget = self.budget,
            "worklist solver reached fixpoint"
        );
        Ok(stats)
    }

    fn too_complex(&self, stats: &SolverStats) -> Error {
        debug!(
            steps = stats.steps,
            dequeued = stats.dequeued,
            budget = self.budget,
            "worklist solver exhausted its budget"
        );
        Error::TooComplex {
            steps: stats.steps,
            budget: self.budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        sync::atomic::{AtomicBool, Ordering},
    };

    use super::*;
    use crate::analysis::{CodeAssembler, InstructionGraph};

    fn self_loop() -> InstructionGraph {
        let mut asm = CodeAssembler::new();
        asm.label("top").unwrap().goto("top").unwrap();
        asm.finish().unwrap()
    }

    fn diamond() -> InstructionGraph {
        // 0: push, 1: if -> 4, 2: nop, 3: goto 5, 4: label, 5: label, 6: return
        let mut asm = CodeAssembler::new();
        asm.push_const()
            .unwrap()
            .if_true("right")
            .unwrap()
            .nop()
            .unwrap()
            .goto("join")
            .unwrap()
            .label("right")
            .unwrap()
            .label("join")
            .unwrap()
            .ret_void()
            .unwrap();
        asm.finish().unwrap()
    }

    #[test]
    fn test_each_pair_processed_once() {
        let graph = diamond();
        let config = AnalysisConfig::default();
        let solver = WorklistSolver::new(&graph, Direction::Forward, &config);

        let mut visits = vec![0usize; graph.len()];
        let stats = solver
            .run([(0, ()), (0, ())], |node, _| {
                visits[node] += 1;
                Ok(Flow::Continue(()))
            })
            .unwrap();

        assert_eq!(visits, vec![1; 7]);
        assert_eq!(stats.distinct_pairs, 7);
        assert_eq!(stats.steps, 7);
    }

    #[test]
    fn test_backward_direction() {
        let graph = diamond();
        let config = AnalysisConfig::default();
        let solver = WorklistSolver::new(&graph, Direction::Backward, &config);

        let mut reached = Vec::new();
        solver
            .run([(6, 0u8)], |node, fact| {
                reached.push(node);
                Ok(Flow::Continue(*fact))
            })
            .unwrap();
        reached.sort_unstable();
        assert_eq!(reached, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_redirect_limits_propagation() {
        let graph = diamond();
        let config = AnalysisConfig::default();
        let solver = WorklistSolver::new(&graph, Direction::Backward, &config);

        // Only the left arm of the join is followed.
        let mut reached = Vec::new();
        let stats = solver
            .run([(5, ())], |node, _| {
                reached.push(node);
                if node == 5 {
                    Ok(Flow::Redirect((), vec![3]))
                } else {
                    Ok(Flow::Continue(()))
                }
            })
            .unwrap();
        reached.sort_unstable();
        assert_eq!(reached, vec![0, 1, 2, 3, 5]);
        assert_eq!(stats.steps, 5);
    }

    #[test]
    fn test_growing_facts_are_too_complex() {
        let graph = self_loop();
        let config = AnalysisConfig::default().with_step_multiplier(5);
        let solver = WorklistSolver::new(&graph, Direction::Forward, &config);
        assert_eq!(solver.budget(), 10);

        let result = solver.run([(0, 0u64)], |_, fact| Ok(Flow::Continue(fact + 1)));
        assert_eq!(
            result,
            Err(Error::TooComplex {
                steps: 11,
                budget: 10
            })
        );

        let result = solver.run([(0, 0u64)], |_, fact| Ok(Flow::Pass(fact + 1)));
        assert!(matches!(result, Err(Error::TooComplex { steps: 0, .. })));
    }

    #[test]
    fn test_pass_is_not_charged() {
        let graph = diamond();
        let config = AnalysisConfig::default();
        let solver = WorklistSolver::new(&graph, Direction::Forward, &config);

        let stats = solver
            .run([(0, ())], |node, _| {
                if node == 6 {
                    Ok(Flow::Stop)
                } else {
                    Ok(Flow::Pass(()))
                }
            })
            .unwrap();
        assert_eq!(stats.steps, 1);
        assert_eq!(stats.dequeued, 7);
    }

    #[test]
    fn test_cancellation_is_polled() {
        let graph = self_loop();
        let config = AnalysisConfig::default().with_poll_interval(4);
        let cancelled = AtomicBool::new(true);
        let check = || cancelled.load(Ordering::Relaxed);
        let solver =
            WorklistSolver::new(&graph, Direction::Forward, &config).with_cancellation(&check);

        let calls = Cell::new(0);
        let result = solver.run([(0, 0u64)], |_, fact| {
            calls.set(calls.get() + 1);
            Ok(Flow::Continue(fact + 1))
        });
        assert_eq!(result, Err(Error::Cancelled));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_lifo_order() {
        let graph = diamond();
        let config = AnalysisConfig::default().with_queue_order(QueueOrder::Lifo);
        let solver = WorklistSolver::new(&graph, Direction::Forward, &config);

        let mut order = Vec::new();
        solver
            .run([(0, ())], |node, _| {
                order.push(node);
                Ok(Flow::Continue(()))
            })
            .unwrap();
        // Successors of the branch are [4, 2]; LIFO explores 2 first.
        assert_eq!(order[..3], [0, 1, 2]);
    }

    #[test]
    fn test_transfer_errors_abort() {
        let graph = diamond();
        let config = AnalysisConfig::default();
        let solver = WorklistSolver::new(&graph, Direction::Forward, &config);
        let result: Result<SolverStats> =
            solver.run([(0, ())], |_, _| Err(malformed_error!("boom")));
        assert!(matches!(result, Err(Error::Malformed { .. })));
        assert!(solver.run([(99, ())], |_, _| Ok(Flow::Stop)).is_err());
    }
}
