// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # flowscope
//!
//! A dataflow analysis engine over instruction-level control flow graphs of stack-machine code.
//! `flowscope` answers four questions about a unit of code:
//!
//! - **Origin tracking** - which instructions may have produced the value a unit returns
//! - **Liveness and flush points** - which variables are dead at each statement boundary and can
//!   be discarded there
//! - **Equivalence classes** - which variables are interchangeable, with a deterministic
//!   canonical member per class
//! - **Region discovery** - how the unit splits into its main body and `jsr`/`ret` subroutines
//!
//! Every analysis is sound. When an analysis cannot finish within its step budget it reports
//! [`Error::TooComplex`] instead of returning a partial answer.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowscope::prelude::*;
//!
//! // x = new; stmt; return x;
//! let mut asm = CodeAssembler::new();
//! let x = asm.local(0);
//! asm.new_object()?
//!     .store(x)?
//!     .statement()?
//!     .load(x)?
//!     .ret_value()?;
//! let graph = asm.finish()?;
//!
//! let config = AnalysisConfig::default();
//! let frames = FrameSimulator::compute_frames(&graph, 1)?;
//! let origins = OriginTracker::new(&graph, &config).result_origins(&frames)?;
//! assert_eq!(origins, vec![true, false, false, false, false]);
//!
//! let plan = LivenessAnalyzer::new(&graph, &config).flush_plan()?;
//! assert!(plan.is_empty());
//! # Ok::<(), flowscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`analysis::graph`] - instruction set, instruction graph, reduced graph, code assembler
//! - [`analysis::frame`] - abstract frames and the stack-effect simulator
//! - [`analysis::dataflow`] - the worklist solver, origin tracker and liveness analyzer
//! - [`analysis::equivalence`] - equivalence classes of variables
//! - [`analysis::regions`] - subroutine region discovery
//! - [`analysis::batch`] - parallel analysis of many units
//! - [`config`] - budgets and policies shared by all analyses
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]. Solver runs and analysis passes emit `debug` summaries;
//! a pass abandoned as too complex emits a `warn` event. No subscriber is installed by the
//! library.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use flowscope::prelude::*;
///
/// let config = AnalysisConfig::fast();
/// assert_eq!(config.step_budget(10), 200);
/// ```
pub mod prelude;

/// Dataflow analyses over instruction graphs.
pub mod analysis;

/// Configuration shared by all analyses.
pub mod config;

/// Bit sets and sorted integer sets used by the analyses.
pub mod utils;

/// `flowscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `flowscope` Error type
///
/// Returned by every fallible operation of the crate.
pub use error::Error;
