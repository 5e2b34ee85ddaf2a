//! # flowscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types of the
//! flowscope library. Import it to get quick access to the assembler, the analyses and their
//! results.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all flowscope operations
pub use crate::Error;

/// The result type used throughout flowscope
pub use crate::Result;

/// Budgets and policies shared by all analyses
pub use crate::config::AnalysisConfig;

// ================================================================================================
// Building Units
// ================================================================================================

/// Instruction graphs and the assembler producing them
pub use crate::analysis::{
    CodeAssembler, Dispatch, ExceptionRange, FlowGraph, InstrKind, InstructionGraph, ReducedGraph,
};

/// Variables referenced by instructions
pub use crate::analysis::{VarFlags, VarId, VarKind, VariableStore};

// ================================================================================================
// Analyses
// ================================================================================================

/// Frames and the stack-effect simulator
pub use crate::analysis::{Frame, FrameSimulator, Location};

/// Worklist solver primitives
pub use crate::analysis::{Direction, Flow, QueueOrder, WorklistSolver};

/// Origin tracking
pub use crate::analysis::{OpaqueProducers, OriginTracker};

/// Liveness and flush points
pub use crate::analysis::{flush_plan_or_empty, FlushPlan, LiveSet, LivenessAnalyzer};

/// Equivalence classes
pub use crate::analysis::{ClassId, EquivalenceClasses};

/// Subroutine regions
pub use crate::analysis::{RegionFinder, RegionId, RegionMap};

/// Batch analysis
pub use crate::analysis::{analyze_units, AnalysisUnit, CancellationToken};
