//! Live variables at statement boundaries and the flush points derived from them.
//!
//! A variable is *live* at a program point if some path from that point reads it before writing
//! it. The analyzer computes the live sets at every statement boundary and, from them, the
//! *flush plan*: at which boundary a variable that was live at the previous boundary has become
//! dead and may be discarded.
//!
//! # Algorithm
//!
//! Both passes run on the [`ReducedGraph`] of the unit.
//!
//! 1. Backward from every `Return` and `Throw` with an empty live set. A write of `v` removes `v`
//!    and every variable qualified by `v`; a read of `v` adds `v` and its qualifiers. A `Ret`
//!    reads every variable backed by its return-address slot. Every live set reaching a
//!    statement boundary is united into that boundary's entry.
//! 2. Forward from the entry with an empty carried set. At a boundary the variables in the
//!    carried set that are no longer live there (and are not exempt from flushing) are flushed,
//!    and the boundary's live set becomes the carried set.
//!
//! Facts are not joined: every distinct live set reaching an instruction is propagated on its
//! own, which is exact on acyclic graphs and bounded by the solver's step budget elsewhere.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    analysis::{
        dataflow::solver::{Direction, Flow, WorklistSolver},
        graph::{InstrKind, InstructionGraph, ReducedGraph},
        VarId,
    },
    config::AnalysisConfig,
    utils::BitSet,
    Error, Result,
};

/// An immutable set of variables, shared between facts and copied on write.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LiveSet {
    bits: Arc<BitSet>,
}

impl LiveSet {
    /// Creates an empty set for a unit with `variables` variables.
    #[must_use]
    pub fn empty(variables: usize) -> Self {
        Self {
            bits: Arc::new(BitSet::new(variables)),
        }
    }

    /// Returns `true` if `var` is in the set.
    #[must_use]
    pub fn contains(&self, var: VarId) -> bool {
        self.bits.contains(var.index())
    }

    /// Returns the number of variables in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.count()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Iterates over the variables in id order.
    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.bits.iter().map(VarId::from_index)
    }

    /// Returns the underlying bit set.
    #[must_use]
    pub fn as_bitset(&self) -> &BitSet {
        &self.bits
    }

    fn with(&self, mask: &BitSet) -> Self {
        if mask.is_subset(&self.bits) {
            return self.clone();
        }
        let mut next = self.clone();
        Arc::make_mut(&mut next.bits).union_with(mask);
        next
    }

    fn without(&self, mask: &BitSet) -> Self {
        let mut next = self.clone();
        if Arc::make_mut(&mut next.bits).difference_with(mask) {
            next
        } else {
            self.clone()
        }
    }
}

impl fmt::Debug for LiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Live sets at statement boundaries, keyed by instruction index.
///
/// Boundaries from which no exit is reachable have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveVariables {
    live: BTreeMap<usize, LiveSet>,
}

impl LiveVariables {
    /// Returns the live set at the boundary instruction `boundary`.
    #[must_use]
    pub fn live_at(&self, boundary: usize) -> Option<&LiveSet> {
        self.live.get(&boundary)
    }

    /// Iterates over `(boundary, live set)` pairs in instruction order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &LiveSet)> {
        self.live.iter().map(|(&boundary, set)| (boundary, set))
    }

    /// Returns the number of boundaries with liveness information.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no boundary has liveness information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Variables to discard at statement boundaries, keyed by instruction index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushPlan {
    flushes: BTreeMap<usize, Vec<VarId>>,
}

impl FlushPlan {
    /// Returns the variables to discard at `boundary`, sorted by id.
    #[must_use]
    pub fn at(&self, boundary: usize) -> &[VarId] {
        self.flushes.get(&boundary).map_or(&[], Vec::as_slice)
    }

    /// Iterates over the boundaries with at least one flushed variable, in instruction order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[VarId])> {
        self.flushes
            .iter()
            .map(|(&boundary, vars)| (boundary, vars.as_slice()))
    }

    /// Returns `true` if nothing is flushed anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flushes.is_empty()
    }

    /// Returns the total number of flushes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.flushes.values().map(Vec::len).sum()
    }
}

/// Liveness and flush-point analysis of one unit.
///
/// # Examples
///
/// ```rust
/// use flowscope::analysis::{CodeAssembler, LivenessAnalyzer};
/// use flowscope::config::AnalysisConfig;
///
/// // x = 1; y = x; return y;
/// let mut asm = CodeAssembler::new();
/// let x = asm.local(0);
/// let y = asm.local(1);
/// asm.push_const()?.store(x)?.statement()?
///     .load(x)?.store(y)?.statement()?
///     .load(y)?.ret_value()?;
/// let graph = asm.finish()?;
///
/// let config = AnalysisConfig::default();
/// let plan = LivenessAnalyzer::new(&graph, &config).flush_plan()?;
/// assert!(plan.at(2).is_empty());
/// assert_eq!(plan.at(5), &[x]);
/// # Ok::<(), flowscope::Error>(())
/// ```
pub struct LivenessAnalyzer<'a> {
    graph: &'a InstructionGraph,
    reduced: ReducedGraph,
    config: &'a AnalysisConfig,
    cancel: Option<&'a (dyn Fn() -> bool + Sync)>,
}

impl<'a> LivenessAnalyzer<'a> {
    /// Creates an analyzer for `graph`, building its reduced view.
    #[must_use]
    pub fn new(graph: &'a InstructionGraph, config: &'a AnalysisConfig) -> Self {
        Self {
            graph,
            reduced: ReducedGraph::new(graph),
            config,
            cancel: None,
        }
    }

    /// Installs a cancellation check for both solver runs.
    #[must_use]
    pub fn with_cancellation(mut self, check: &'a (dyn Fn() -> bool + Sync)) -> Self {
        self.cancel = Some(check);
        self
    }

    /// Returns the reduced graph the passes run on.
    #[must_use]
    pub fn reduced(&self) -> &ReducedGraph {
        &self.reduced
    }

    fn solver(&self, direction: Direction) -> WorklistSolver<'_, ReducedGraph> {
        let solver = WorklistSolver::new(&self.reduced, direction, self.config);
        match self.cancel {
            Some(check) => solver.with_cancellation(check),
            None => solver,
        }
    }

    /// Computes the live sets at every statement boundary (pass 1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooComplex`] or [`Error::Cancelled`] from the solver run.
    pub fn live_variables(&self) -> Result<LiveVariables> {
        let variables = self.graph.variables();
        let var_count = variables.len();
        let kill_masks = variables.kill_masks();
        let read_masks: Vec<BitSet> = variables
            .iter()
            .map(|var| {
                BitSet::from_indices(
                    var_count,
                    variables
                        .qualifier_chain(var.id)
                        .into_iter()
                        .map(VarId::index),
                )
            })
            .collect();

        let mut slot_masks: HashMap<u16, BitSet> = HashMap::new();
        for node in 0..self.reduced.len() {
            if let InstrKind::Ret(slot) = *self.kind(node) {
                slot_masks.entry(slot).or_insert_with(|| {
                    BitSet::from_indices(
                        var_count,
                        variables.slot_variables(slot).into_iter().map(VarId::index),
                    )
                });
            }
        }

        let empty = LiveSet::empty(var_count);
        let seeds: Vec<(usize, LiveSet)> = (0..self.reduced.len())
            .filter(|&node| self.kind(node).is_exit())
            .map(|node| (node, empty.clone()))
            .collect();

        let mut at_boundary: HashMap<usize, BitSet> = HashMap::new();
        let stats = self
            .solver(Direction::Backward)
            .run(seeds, |node, live_after: &LiveSet| {
                let live_before = match self.kind(node) {
                    InstrKind::Store(var) | InstrKind::Discard(var) => {
                        live_after.without(&kill_masks[var.index()])
                    }
                    InstrKind::Load(var) => live_after.with(&read_masks[var.index()]),
                    InstrKind::Ret(slot) => match slot_masks.get(slot) {
                        Some(mask) => live_after.with(mask),
                        None => live_after.clone(),
                    },
                    InstrKind::StatementBoundary => {
                        at_boundary
                            .entry(node)
                            .or_insert_with(|| BitSet::new(var_count))
                            .union_with(live_after.as_bitset());
                        live_after.clone()
                    }
                    _ => live_after.clone(),
                };
                Ok(Flow::Continue(live_before))
            })?;

        let live: BTreeMap<usize, LiveSet> = at_boundary
            .into_iter()
            .map(|(node, bits)| {
                (
                    self.reduced.original(node),
                    LiveSet {
                        bits: Arc::new(bits),
                    },
                )
            })
            .collect();

        debug!(
            instructions = self.graph.len(),
            reduced = self.reduced.len(),
            boundaries = live.len(),
            steps = stats.steps,
            "computed live variables"
        );
        Ok(LiveVariables { live })
    }

    /// Computes the flush plan from previously computed live sets (pass 2).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooComplex`] or [`Error::Cancelled`] from the solver run.
    pub fn flush_plan_from(&self, live: &LiveVariables) -> Result<FlushPlan> {
        let variables = self.graph.variables();
        let mut exempt = BitSet::new(variables.len());
        for var in variables.iter() {
            if variables.is_flush_exempt(var.id) {
                exempt.insert(var.id.index());
            }
        }

        let mut flushes: BTreeMap<usize, BTreeSet<VarId>> = BTreeMap::new();
        let stats = self.solver(Direction::Forward).run(
            [(0, LiveSet::empty(variables.len()))],
            |node, carried: &LiveSet| {
                if !matches!(self.kind(node), InstrKind::StatementBoundary) {
                    return Ok(Flow::Continue(carried.clone()));
                }
                let boundary = self.reduced.original(node);
                let Some(live_here) = live.live_at(boundary) else {
                    return Ok(Flow::Continue(carried.clone()));
                };

                let mut dead = carried.as_bitset().clone();
                dead.difference_with(live_here.as_bitset());
                dead.difference_with(&exempt);
                if !dead.is_empty() {
                    flushes
                        .entry(boundary)
                        .or_default()
                        .extend(dead.iter().map(VarId::from_index));
                }
                Ok(Flow::Continue(live_here.clone()))
            },
        )?;

        let plan = FlushPlan {
            flushes: flushes
                .into_iter()
                .map(|(boundary, vars)| (boundary, vars.into_iter().collect()))
                .collect(),
        };
        debug!(
            boundaries = plan.flushes.len(),
            flushes = plan.total(),
            steps = stats.steps,
            "computed flush plan"
        );
        Ok(plan)
    }

    /// Runs both passes and returns the flush plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooComplex`] if either pass gives up, [`Error::Cancelled`] if cancelled.
    pub fn flush_plan(&self) -> Result<FlushPlan> {
        let live = self.live_variables()?;
        self.flush_plan_from(&live)
    }

    fn kind(&self, node: usize) -> &InstrKind {
        self.graph.kind(self.reduced.original(node))
    }
}

/// Computes the flush plan of `graph`, falling back to an empty plan if the analysis is too
/// complex.
///
/// An empty plan never discards anything, so it is always a safe answer.
///
/// # Errors
///
/// Propagates [`Error::Cancelled`] and [`Error::Malformed`]; [`Error::TooComplex`] is logged and
/// turned into an empty plan.
pub fn flush_plan_or_empty(
    graph: &InstructionGraph,
    config: &AnalysisConfig,
) -> Result<FlushPlan> {
    match LivenessAnalyzer::new(graph, config).flush_plan() {
        Err(Error::TooComplex { steps, budget }) => {
            warn!(
                instructions = graph.len(),
                steps, budget, "liveness too complex, no variables will be flushed"
            );
            Ok(FlushPlan::default())
        }
        other => other,
    }
}
