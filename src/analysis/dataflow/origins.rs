//! Origin tracking for returned values.
//!
//! Answers the question "which instructions may have produced the value this unit returns?".
//! Starting at every value-returning `Return`, the tracker follows the returned value backwards
//! through copies (loads and stores of local slots, `dup`, `swap`, transparent instructions) until
//! it reaches the instruction that created it.
//!
//! The fact propagated by the solver is a single [`Location`]: the cell holding the tracked value
//! *after* the instruction it is attached to. Because facts are not joined, every location is
//! traced exactly once per instruction, and distinct returned values flowing through the same
//! instruction in different cells are kept apart.

use bitflags::bitflags;

use crate::{
    analysis::{
        dataflow::solver::{Direction, Flow, WorklistSolver},
        frame::{Frame, FrameSimulator, Location},
        graph::{Dispatch, FlowGraph, InstrKind, InstructionGraph},
        VariableStore,
    },
    config::AnalysisConfig,
    Result,
};

bitflags! {
    /// Classes of value-producing instructions whose result is not considered a fresh value.
    ///
    /// The result of a virtual call or a field read may well be an object created elsewhere and
    /// shared; callers interested in "does this unit create what it returns" exclude such
    /// producers. The policy is a caller decision, see
    /// [`AnalysisConfig::opaque_producers`](crate::config::AnalysisConfig::opaque_producers).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpaqueProducers: u8 {
        /// Calls dispatched on the receiver's runtime class.
        const VIRTUAL_CALL = 0x01;
        /// Calls dispatched through an interface.
        const INTERFACE_CALL = 0x02;
        /// Reads of fields, static fields and other slot-less variables.
        const FIELD_READ = 0x04;
        /// Reads of array elements.
        const ARRAY_READ = 0x08;
        /// Statically bound calls without receiver.
        const STATIC_CALL = 0x10;
        /// Statically bound calls with receiver.
        const SPECIAL_CALL = 0x20;
    }
}

impl Default for OpaqueProducers {
    fn default() -> Self {
        Self::VIRTUAL_CALL | Self::INTERFACE_CALL | Self::FIELD_READ | Self::ARRAY_READ
    }
}

impl OpaqueProducers {
    /// Returns the producer class of an instruction, empty if it is not classified.
    #[must_use]
    pub fn classify(kind: &InstrKind, variables: &VariableStore) -> Self {
        match kind {
            InstrKind::Invoke { dispatch, .. } => match dispatch {
                Dispatch::Virtual => Self::VIRTUAL_CALL,
                Dispatch::Interface => Self::INTERFACE_CALL,
                Dispatch::Static => Self::STATIC_CALL,
                Dispatch::Special => Self::SPECIAL_CALL,
            },
            InstrKind::FieldRead { .. } => Self::FIELD_READ,
            InstrKind::ArrayRead => Self::ARRAY_READ,
            InstrKind::Load(var) => match variables.get(*var) {
                Some(descriptor) if descriptor.slot().is_none() => Self::FIELD_READ,
                _ => Self::empty(),
            },
            _ => Self::empty(),
        }
    }
}

/// Backward origin analysis over an [`InstructionGraph`].
pub struct OriginTracker<'a> {
    graph: &'a InstructionGraph,
    config: &'a AnalysisConfig,
    cancel: Option<&'a (dyn Fn() -> bool + Sync)>,
}

impl<'a> OriginTracker<'a> {
    /// Creates a tracker for `graph`.
    #[must_use]
    pub fn new(graph: &'a InstructionGraph, config: &'a AnalysisConfig) -> Self {
        Self {
            graph,
            config,
            cancel: None,
        }
    }

    /// Installs a cancellation check for the solver run.
    #[must_use]
    pub fn with_cancellation(mut self, check: &'a (dyn Fn() -> bool + Sync)) -> Self {
        self.cancel = Some(check);
        self
    }

    /// Computes, for every instruction, whether it may produce a value returned by the unit.
    ///
    /// `frames[i]` is the frame before instruction `i`, `None` if the instruction is unreachable.
    /// [`FrameSimulator::compute_frames`] computes suitable frames.
    ///
    /// An instruction is marked when it creates a returned value itself and its producer class is
    /// not part of the configured opaque producers. Values that are the caught exception of a
    /// handler are not attributed to any instruction; a value entering a handler entry along a
    /// normal edge is still traced.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Malformed`] if `frames` does not match the graph
    /// - [`crate::Error::TooComplex`] if the solver exhausts its budget
    /// - [`crate::Error::Cancelled`] if the cancellation check fires
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flowscope::analysis::{CodeAssembler, FrameSimulator, OriginTracker};
    /// use flowscope::config::AnalysisConfig;
    ///
    /// let mut asm = CodeAssembler::new();
    /// asm.new_object()?.ret_value()?;
    /// let graph = asm.finish()?;
    ///
    /// let frames = FrameSimulator::compute_frames(&graph, 0)?;
    /// let config = AnalysisConfig::default();
    /// let origins = OriginTracker::new(&graph, &config).result_origins(&frames)?;
    /// assert_eq!(origins, vec![true, false]);
    /// # Ok::<(), flowscope::Error>(())
    /// ```
    pub fn result_origins(&self, frames: &[Option<Frame>]) -> Result<Vec<bool>> {
        let graph = self.graph;
        if frames.len() != graph.len() {
            return Err(malformed_error!(
                "Got {} frames for {} instructions",
                frames.len(),
                graph.len()
            ));
        }

        let mut seeds = Vec::new();
        for instr in graph.instructions() {
            if !matches!(instr.kind, InstrKind::Return { value: true }) {
                continue;
            }
            let Some(frame) = &frames[instr.index] else {
                continue;
            };
            let Some(returned) = frame.top() else {
                return Err(malformed_error!(
                    "Instruction {} returns a value from an empty stack",
                    instr.index
                ));
            };
            for pred in self.value_predecessors(instr.index, returned) {
                seeds.push((pred, returned));
            }
        }

        let variables: &VariableStore = graph.variables();
        let simulator = FrameSimulator::new(variables);
        let opaque = self.config.opaque_producers;
        let mut result = vec![false; graph.len()];

        let mut solver = WorklistSolver::new(graph, Direction::Backward, self.config);
        if let Some(check) = self.cancel {
            solver = solver.with_cancellation(check);
        }

        solver.run(seeds, |index, after: &Location| {
            let Some(frame) = &frames[index] else {
                return Ok(Flow::Stop);
            };
            let kind = graph.kind(index);
            match simulator.pre_location(frame, kind, *after)? {
                Some(before @ Location::Stack(_)) if graph.is_handler_entry(index) => {
                    let preds = self.value_predecessors(index, before);
                    if preds.is_empty() {
                        Ok(Flow::Stop)
                    } else {
                        Ok(Flow::Redirect(before, preds))
                    }
                }
                Some(before) if kind.is_transparent() => Ok(Flow::Pass(before)),
                Some(before) => Ok(Flow::Continue(before)),
                None => {
                    if !opaque.intersects(OpaqueProducers::classify(kind, variables)) {
                        result[index] = true;
                    }
                    Ok(Flow::Stop)
                }
            }
        })?;

        Ok(result)
    }

    /// Returns the predecessors through which `location`, as seen before instruction `index`,
    /// may have arrived.
    ///
    /// On an exceptional edge the operand stack holds only the caught exception, so stack cells
    /// at a handler entry are followed along normal edges only.
    fn value_predecessors(&self, index: usize, location: Location) -> Vec<usize> {
        match location {
            Location::Stack(_) if self.graph.is_handler_entry(index) => {
                self.graph.normal_predecessors(index)
            }
            _ => self.graph.predecessors(index).to_vec(),
        }
    }
}
