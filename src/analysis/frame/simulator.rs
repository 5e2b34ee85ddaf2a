//! Stack-effect simulation over abstract frames.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    analysis::{
        frame::{Frame, Location, ProvenanceValue},
        graph::{FlowGraph, InstrKind, InstructionGraph},
        VariableStore,
    },
    Result,
};

/// Applies the stack effect of instructions to abstract frames.
///
/// The simulator does not evaluate anything. It only moves [`ProvenanceValue`]s between cells:
/// instructions that copy a value (loads from slots, stores into slots, `dup`, `swap`) carry the
/// value along, every other instruction result is [`ProvenanceValue::Unknown`].
///
/// # Examples
///
/// ```rust
/// use flowscope::analysis::{Frame, FrameSimulator, InstrKind, Location, VariableStore};
///
/// let store = VariableStore::new();
/// let sim = FrameSimulator::new(&store);
///
/// // The value on top after `dup` is a copy of the value on top before it.
/// let before = Frame::with_stack_depth(0, 1);
/// let pre = sim.pre_location(&before, &InstrKind::Dup, Location::Stack(1))?;
/// assert_eq!(pre, Some(Location::Stack(0)));
///
/// // A pushed constant is produced by the instruction itself.
/// let pre = sim.pre_location(&before, &InstrKind::PushConst, Location::Stack(1))?;
/// assert_eq!(pre, None);
/// # Ok::<(), flowscope::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameSimulator<'a> {
    variables: &'a VariableStore,
}

impl<'a> FrameSimulator<'a> {
    /// Creates a simulator resolving variables through `variables`.
    #[must_use]
    pub fn new(variables: &'a VariableStore) -> Self {
        Self { variables }
    }

    /// Returns the frame after executing `kind` on `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow, an out-of-range local slot or an
    /// unknown variable.
    pub fn step(&self, frame: &Frame, kind: &InstrKind) -> Result<Frame> {
        let mut next = frame.clone();
        match kind {
            InstrKind::Nop
            | InstrKind::Label
            | InstrKind::LineMarker
            | InstrKind::StatementBoundary
            | InstrKind::Goto(_) => {}
            InstrKind::PushConst | InstrKind::New | InstrKind::Jsr(_) => {
                next.push(ProvenanceValue::Unknown);
            }
            InstrKind::Load(var) => {
                let value = match self.variables.descriptor(*var)?.slot() {
                    Some(slot) => next.local(slot)?,
                    None => ProvenanceValue::Unknown,
                };
                next.push(value);
            }
            InstrKind::Store(var) => {
                let value = next.pop()?;
                if let Some(slot) = self.variables.descriptor(*var)?.slot() {
                    next.set_local(slot, value)?;
                }
            }
            InstrKind::Discard(var) => {
                if let Some(slot) = self.variables.descriptor(*var)?.slot() {
                    next.set_local(slot, ProvenanceValue::Unknown)?;
                }
            }
            InstrKind::Dup => {
                let top = next.pop()?;
                next.push(top);
                next.push(top);
            }
            InstrKind::Swap => {
                let first = next.pop()?;
                let second = next.pop()?;
                next.push(first);
                next.push(second);
            }
            InstrKind::Pop | InstrKind::Switch { .. } | InstrKind::Throw => {
                next.pop()?;
            }
            InstrKind::Compute { pops } => {
                next.pop_n(usize::from(*pops))?;
                next.push(ProvenanceValue::Unknown);
            }
            InstrKind::FieldRead { is_static } => {
                if !is_static {
                    next.pop()?;
                }
                next.push(ProvenanceValue::Unknown);
            }
            InstrKind::FieldWrite { is_static } => {
                next.pop_n(if *is_static { 1 } else { 2 })?;
            }
            InstrKind::ArrayRead => {
                next.pop_n(2)?;
                next.push(ProvenanceValue::Unknown);
            }
            InstrKind::ArrayWrite => {
                next.pop_n(3)?;
            }
            InstrKind::Invoke { args, returns, .. } => {
                next.pop_n(usize::from(*args))?;
                if *returns {
                    next.push(ProvenanceValue::Unknown);
                }
            }
            InstrKind::If { pops, .. } => {
                next.pop_n(usize::from(*pops))?;
            }
            InstrKind::Return { value } => {
                if *value {
                    next.pop()?;
                }
            }
            InstrKind::Ret(slot) => {
                next.local(*slot)?;
            }
        }
        Ok(next)
    }

    /// Returns the location before `kind` that holds the value found at `after` once `kind` has
    /// executed, or `None` if the instruction produced that value itself.
    ///
    /// `frame` only supplies the shape (number of locals, stack depth) of the state before the
    /// instruction; the answer is computed by stepping a [`Frame::marker`] frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the instruction cannot execute on a frame of this
    /// shape or `after` does not exist in the resulting frame.
    pub fn pre_location(
        &self,
        frame: &Frame,
        kind: &InstrKind,
        after: Location,
    ) -> Result<Option<Location>> {
        let stepped = self.step(&Frame::marker(frame), kind)?;
        match stepped.get(after) {
            Some(ProvenanceValue::From(location)) => Ok(Some(location)),
            Some(ProvenanceValue::Unknown) => Ok(None),
            None => Err(malformed_error!(
                "{} does not exist after {:?} (stack depth {})",
                after,
                kind,
                stepped.stack_depth()
            )),
        }
    }

    /// Computes the frame before every instruction of `graph`.
    ///
    /// The entry frame has `num_locals` unknown locals and an empty stack; the entry frame of an
    /// exception handler keeps the locals and holds only the caught exception on the stack.
    /// Unreachable instructions get `None`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an instruction cannot execute on its frame, a local
    /// slot exceeds `num_locals`, or two paths reach an instruction with different stack depths.
    pub fn compute_frames(
        graph: &InstructionGraph,
        num_locals: usize,
    ) -> Result<Vec<Option<Frame>>> {
        let simulator = FrameSimulator::new(graph.variables());
        let mut frames: Vec<Option<Frame>> = vec![None; graph.node_count()];
        let mut queue = VecDeque::new();

        frames[0] = Some(Frame::new(num_locals));
        queue.push_back(0);

        while let Some(index) = queue.pop_front() {
            let Some(before) = frames[index].clone() else {
                continue;
            };
            let after = simulator.step(&before, graph.kind(index))?;

            for &succ in graph.normal_successors(index) {
                Self::merge_into(&mut frames, &mut queue, succ, &after)?;
            }
            if !graph.exception_successors(index).is_empty() {
                let caught = before.handler_entry();
                for &handler in graph.exception_successors(index) {
                    Self::merge_into(&mut frames, &mut queue, handler, &caught)?;
                }
            }
        }

        debug!(
            instructions = graph.len(),
            reachable = frames.iter().filter(|frame| frame.is_some()).count(),
            "computed frames"
        );
        Ok(frames)
    }

    fn merge_into(
        frames: &mut [Option<Frame>],
        queue: &mut VecDeque<usize>,
        index: usize,
        incoming: &Frame,
    ) -> Result<()> {
        match &frames[index] {
            Some(existing) if existing.same_shape(incoming) => Ok(()),
            Some(existing) => Err(malformed_error!(
                "Stack depth mismatch at instruction {}: {} vs {}",
                index,
                existing.stack_depth(),
                incoming.stack_depth()
            )),
            None => {
                frames[index] = Some(incoming.clone());
                queue.push_back(index);
                Ok(())
            }
        }
    }
}
