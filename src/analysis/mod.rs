//! Dataflow analysis over instruction-level control flow graphs.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`variable`] - The variable store, the single authority for variable ids
//! - [`graph`] - Instruction set, instruction graph, reduced view and code assembler
//! - [`frame`] - Abstract frames and the stack-effect simulator
//! - [`dataflow`] - The worklist solver and the origin and liveness analyses built on it
//! - [`equivalence`] - Equivalence classes of variables with deterministic canonical members
//! - [`regions`] - Partitioning a unit into its main body and subroutines
//! - [`batch`] - Analysing many units in parallel
//!
//! # Usage
//!
//! ```rust
//! use flowscope::analysis::{CodeAssembler, FrameSimulator, LivenessAnalyzer, OriginTracker};
//! use flowscope::config::AnalysisConfig;
//!
//! // x = new; stmt; return x;
//! let mut asm = CodeAssembler::new();
//! let x = asm.local(0);
//! asm.new_object()?.store(x)?.statement()?.load(x)?.ret_value()?;
//! let graph = asm.finish()?;
//! let config = AnalysisConfig::default();
//!
//! let frames = FrameSimulator::compute_frames(&graph, 1)?;
//! let origins = OriginTracker::new(&graph, &config).result_origins(&frames)?;
//! assert!(origins[0]);
//!
//! let live = LivenessAnalyzer::new(&graph, &config).live_variables()?;
//! assert!(live.live_at(2).is_some_and(|set| set.contains(x)));
//! # Ok::<(), flowscope::Error>(())
//! ```

pub mod batch;
pub mod dataflow;
pub mod equivalence;
pub mod frame;
pub mod graph;
pub mod regions;
pub mod variable;

// Re-export primary types at module level
pub use batch::{analyze_unit, analyze_units, AnalysisUnit, CancellationToken, UnitReport};
pub use dataflow::{
    flush_plan_or_empty, Direction, Flow, FlushPlan, LiveSet, LiveVariables, LivenessAnalyzer,
    OpaqueProducers, OriginTracker, QueueOrder, SolverStats, WorklistSolver,
};
pub use equivalence::{canonical_order, ClassId, EqClass, EquivalenceClasses};
pub use frame::{Frame, FrameSimulator, Location, ProvenanceValue};
pub use graph::{
    CodeAssembler, Dispatch, ExceptionRange, FlowGraph, InstrCategory, InstrKind, Instruction,
    InstructionGraph, ReducedGraph,
};
pub use regions::{Region, RegionFinder, RegionId, RegionMap, RegionScan, SubroutineCall};
pub use variable::{VarFlags, VarId, VarKind, VariableDescriptor, VariableStore};
