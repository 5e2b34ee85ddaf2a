//! The immutable, index-addressed instruction graph of one analysed unit.

use std::{fmt::Write, sync::Arc};

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    analysis::{
        graph::{FlowGraph, InstrCategory, InstrKind, Instruction},
        VariableStore,
    },
    utils::BitSet,
    Result,
};

/// A protected instruction range and the handler that receives its exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRange {
    /// First protected instruction.
    pub start: usize,
    /// One past the last protected instruction.
    pub end: usize,
    /// First instruction of the handler.
    pub handler: usize,
}

impl ExceptionRange {
    /// Creates a new exception range.
    #[must_use]
    pub const fn new(start: usize, end: usize, handler: usize) -> Self {
        Self {
            start,
            end,
            handler,
        }
    }

    /// Returns `true` if the instruction at `index` is protected by this range.
    #[must_use]
    pub const fn covers(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// An instruction sequence with precomputed successor and predecessor adjacency.
///
/// The graph is built once per unit and is read-only afterwards. All adjacency is stored as plain
/// index vectors:
///
/// - *normal successors*: jump and switch targets, the fall-through successor, subroutine
///   targets for calls and every subroutine return point for subroutine returns;
/// - *exception successors*: the handler of every exception range protecting the instruction;
/// - *predecessors*: the reverse of the union of both.
///
/// Construction validates the unit: every target must resolve, every referenced variable must be
/// known to the unit's [`VariableStore`], and execution must never fall off the end of the
/// sequence.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use flowscope::analysis::{FlowGraph, InstrKind, InstructionGraph, VariableStore};
///
/// let graph = InstructionGraph::new(
///     vec![InstrKind::PushConst, InstrKind::Return { value: true }],
///     Vec::new(),
///     Arc::new(VariableStore::new()),
/// )?;
///
/// assert_eq!(graph.successors(0), &[1]);
/// assert_eq!(graph.predecessors(1), &[0]);
/// assert_eq!(graph.exits(), vec![1]);
/// # Ok::<(), flowscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct InstructionGraph {
    instructions: Vec<Instruction>,
    handlers: Vec<ExceptionRange>,
    variables: Arc<VariableStore>,
    normal_successors: Vec<Vec<usize>>,
    exception_successors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    handler_entries: BitSet,
    edge_count: usize,
}

impl InstructionGraph {
    /// Builds and validates the graph of a unit.
    ///
    /// # Arguments
    ///
    /// * `kinds` - The instructions, in execution order; instruction `i` gets index `i`
    /// * `handlers` - The exception ranges of the unit
    /// * `variables` - The store owning every variable the instructions refer to
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the sequence is empty, a target or handler is out of
    /// range, an exception range is empty, a variable is unknown, or execution could fall off the
    /// end of the sequence.
    pub fn new(
        kinds: Vec<InstrKind>,
        handlers: Vec<ExceptionRange>,
        variables: Arc<VariableStore>,
    ) -> Result<Self> {
        let count = kinds.len();
        if count == 0 {
            return Err(malformed_error!("Instruction sequence is empty"));
        }

        for range in &handlers {
            if range.start >= range.end || range.end > count || range.handler >= count {
                return Err(malformed_error!(
                    "Invalid exception range {}..{} -> {} ({} instructions)",
                    range.start,
                    range.end,
                    range.handler,
                    count
                ));
            }
        }

        let mut return_points = Vec::new();
        for (index, kind) in kinds.iter().enumerate() {
            for target in kind.branch_targets() {
                if target >= count {
                    return Err(malformed_error!(
                        "Instruction {} targets {} which is outside of 0..{}",
                        index,
                        target,
                        count
                    ));
                }
            }
            if kind.needs_next() && index + 1 == count {
                return Err(malformed_error!(
                    "Execution can fall off the end of the code after instruction {}",
                    index
                ));
            }
            if let Some(var) = kind.variable() {
                variables.descriptor(var)?;
            }
            if matches!(kind, InstrKind::Jsr(_)) {
                return_points.push(index + 1);
            }
        }

        let mut normal_successors = Vec::with_capacity(count);
        let mut exception_successors = Vec::with_capacity(count);
        let mut successors = Vec::with_capacity(count);
        let mut handler_entries = BitSet::new(count);

        for range in &handlers {
            handler_entries.insert(range.handler);
        }

        for (index, kind) in kinds.iter().enumerate() {
            let mut normal = kind.branch_targets();
            if kind.falls_through() {
                normal.push(index + 1);
            }
            if matches!(kind, InstrKind::Ret(_)) {
                normal.extend_from_slice(&return_points);
            }
            dedup_in_order(&mut normal);

            let mut exceptional: Vec<usize> = handlers
                .iter()
                .filter(|range| range.covers(index))
                .map(|range| range.handler)
                .collect();
            dedup_in_order(&mut exceptional);

            let mut all = normal.clone();
            all.extend_from_slice(&exceptional);
            dedup_in_order(&mut all);

            normal_successors.push(normal);
            exception_successors.push(exceptional);
            successors.push(all);
        }

        let mut predecessors = vec![Vec::new(); count];
        for (index, succs) in successors.iter().enumerate() {
            for &succ in succs {
                predecessors[succ].push(index);
            }
        }
        let edge_count = successors.iter().map(Vec::len).sum();

        let instructions = kinds
            .into_iter()
            .enumerate()
            .map(|(index, kind)| Instruction { index, kind })
            .collect();

        Ok(Self {
            instructions,
            handlers,
            variables,
            normal_successors,
            exception_successors,
            successors,
            predecessors,
            handler_entries,
            edge_count,
        })
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Always `false`; a validated graph has at least one instruction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns all instructions in index order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns the instruction at `index`, if it exists.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Returns the kind of the instruction at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn kind(&self, index: usize) -> &InstrKind {
        &self.instructions[index].kind
    }

    /// Returns the exception ranges of the unit.
    #[must_use]
    pub fn handlers(&self) -> &[ExceptionRange] {
        &self.handlers
    }

    /// Returns the variable store of the unit.
    #[must_use]
    pub fn variables(&self) -> &Arc<VariableStore> {
        &self.variables
    }

    /// Returns the normal (non-exceptional) successors of an instruction.
    #[must_use]
    pub fn normal_successors(&self, index: usize) -> &[usize] {
        &self.normal_successors[index]
    }

    /// Returns the exception handlers an instruction may transfer control to.
    #[must_use]
    pub fn exception_successors(&self, index: usize) -> &[usize] {
        &self.exception_successors[index]
    }

    /// Returns the predecessors that reach an instruction through a normal edge.
    ///
    /// A predecessor that also throws into the instruction is included.
    #[must_use]
    pub fn normal_predecessors(&self, index: usize) -> Vec<usize> {
        self.predecessors[index]
            .iter()
            .copied()
            .filter(|&pred| self.normal_successors[pred].contains(&index))
            .collect()
    }

    /// Returns `true` if the instruction is the first instruction of an exception handler.
    #[must_use]
    pub fn is_handler_entry(&self, index: usize) -> bool {
        self.handler_entries.contains(index)
    }

    /// Returns the number of instructions of every [`InstrCategory`], indexed by category.
    #[must_use]
    pub fn category_counts(&self) -> [usize; InstrCategory::COUNT] {
        let mut counts = [0; InstrCategory::COUNT];
        for instr in &self.instructions {
            counts[instr.kind.category() as usize] += 1;
        }
        counts
    }

    /// Formats the non-zero category counts as `Category=count` pairs, for log output.
    #[must_use]
    pub fn category_summary(&self) -> String {
        let counts = self.category_counts();
        let mut summary = String::new();
        for (category, count) in InstrCategory::iter().zip(counts) {
            if count == 0 {
                continue;
            }
            if !summary.is_empty() {
                summary.push(' ');
            }
            let _ = write!(summary, "{category}={count}");
        }
        summary
    }

    /// Returns the indices of all instructions that leave the unit (returns and throws).
    #[must_use]
    pub fn exits(&self) -> Vec<usize> {
        self.instructions
            .iter()
            .filter(|instr| instr.kind.is_exit())
            .map(|instr| instr.index)
            .collect()
    }
}

impl FlowGraph for InstructionGraph {
    fn node_count(&self) -> usize {
        self.instructions.len()
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

/// Removes duplicates while keeping the first occurrence of every element.
fn dedup_in_order(values: &mut Vec<usize>) {
    let mut seen = Vec::with_capacity(values.len());
    values.retain(|value| {
        if seen.contains(value) {
            false
        } else {
            seen.push(*value);
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn graph(kinds: Vec<InstrKind>, handlers: Vec<ExceptionRange>) -> Result<InstructionGraph> {
        InstructionGraph::new(kinds, handlers, Arc::new(VariableStore::new()))
    }

    #[test]
    fn test_branch_adjacency() {
        // 0: push; 1: if -> 4; 2: push; 3: return; 4: push; 5: return
        let g = graph(
            vec![
                InstrKind::PushConst,
                InstrKind::If { target: 4, pops: 1 },
                InstrKind::PushConst,
                InstrKind::Return { value: true },
                InstrKind::PushConst,
                InstrKind::Return { value: true },
            ],
            Vec::new(),
        )
        .unwrap();

        assert_eq!(g.successors(1), &[4, 2]);
        assert_eq!(g.predecessors(4), &[1]);
        assert!(g.successors(3).is_empty());
        assert_eq!(g.exits(), vec![3, 5]);
        assert_eq!(g.edge_count(), 5);
    }

    #[test]
    fn test_exception_edges() {
        let g = graph(
            vec![
                InstrKind::PushConst,
                InstrKind::Pop,
                InstrKind::Return { value: false },
                InstrKind::Pop,
                InstrKind::Return { value: false },
            ],
            vec![ExceptionRange::new(0, 2, 3)],
        )
        .unwrap();

        assert_eq!(g.exception_successors(0), &[3]);
        assert_eq!(g.exception_successors(1), &[3]);
        assert!(g.exception_successors(2).is_empty());
        assert_eq!(g.successors(1), &[2, 3]);
        assert_eq!(g.predecessors(3), &[0, 1]);
        assert!(g.is_handler_entry(3));
        assert!(!g.is_handler_entry(2));
        assert!(g.normal_predecessors(3).is_empty());
        assert_eq!(g.normal_predecessors(2), vec![1]);

        let counts = g.category_counts();
        assert_eq!(counts[InstrCategory::Return as usize], 2);
        assert_eq!(counts[InstrCategory::Fallthrough as usize], 3);
        assert_eq!(g.category_summary(), "Return=2 Fallthrough=3");
    }

    #[test]
    fn test_subroutine_edges() {
        // 0: jsr 3; 1: return; 2: nop (dead); 3: store ret addr; 4: ret
        let mut store = VariableStore::new();
        let addr = store.add_local(0);
        let g = InstructionGraph::new(
            vec![
                InstrKind::Jsr(3),
                InstrKind::Return { value: false },
                InstrKind::Nop,
                InstrKind::Store(addr),
                InstrKind::Ret(0),
            ],
            Vec::new(),
            Arc::new(store),
        )
        .unwrap();

        assert_eq!(g.normal_successors(0), &[3]);
        assert_eq!(g.normal_successors(4), &[1]);
        assert_eq!(g.predecessors(1), &[4]);
    }

    #[test]
    fn test_fall_off_end_is_malformed() {
        let result = graph(vec![InstrKind::PushConst, InstrKind::Pop], Vec::new());
        assert!(matches!(result, Err(Error::Malformed { .. })));

        let result = graph(vec![InstrKind::Jsr(0)], Vec::new());
        assert!(matches!(result, Err(Error::Malformed { .. })));

        assert!(graph(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_invalid_targets_are_malformed() {
        assert!(graph(vec![InstrKind::Goto(7)], Vec::new()).is_err());
        assert!(graph(
            vec![InstrKind::Return { value: false }],
            vec![ExceptionRange::new(0, 1, 5)]
        )
        .is_err());
        assert!(graph(
            vec![InstrKind::Return { value: false }],
            vec![ExceptionRange::new(0, 0, 0)]
        )
        .is_err());

        let result = graph(
            vec![
                InstrKind::Load(crate::analysis::VarId::new(3)),
                InstrKind::Return { value: true },
            ],
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }
}
