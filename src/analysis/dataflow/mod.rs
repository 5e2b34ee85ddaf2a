//! Dataflow analyses built on a shared worklist solver.
//!
//! # Architecture
//!
//! - [`WorklistSolver`] - propagates `(node, fact)` pairs over any [`FlowGraph`] in either
//!   [`Direction`] until no new pair appears, within a step budget
//! - [`OriginTracker`] - backward tracking of returned values to the instructions producing them
//! - [`LivenessAnalyzer`] - live variables at statement boundaries and the resulting
//!   [`FlushPlan`]
//!
//! Analyses supply a transfer function returning a [`Flow`]; the solver owns the queue, the
//! deduplication of pairs, the step budget and cancellation polling.
//!
//! [`FlowGraph`]: crate::analysis::FlowGraph

mod liveness;
mod origins;
mod solver;

pub use liveness::{flush_plan_or_empty, FlushPlan, LiveSet, LiveVariables, LivenessAnalyzer};
pub use origins::{OpaqueProducers, OriginTracker};
pub use solver::{Direction, Flow, QueueOrder, SolverStats, WorklistSolver};
