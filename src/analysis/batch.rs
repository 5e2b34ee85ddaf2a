//! Parallel analysis of many independent units.
//!
//! Every analysis in this crate is single-threaded and touches only the unit it was given, so a
//! batch of units is analysed by mapping them over the rayon thread pool. All units share one
//! [`CancellationToken`]; cancelling it (or passing its deadline) stops every run still in
//! flight at its next poll.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    analysis::{
        dataflow::{FlushPlan, LivenessAnalyzer, OriginTracker},
        frame::FrameSimulator,
        graph::InstructionGraph,
        regions::{RegionFinder, RegionMap},
    },
    config::AnalysisConfig,
    Error, Result,
};

/// A shared cancellation flag with an optional deadline.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that also counts as cancelled once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Cancels every run observing this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if the token was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// One unit of a batch.
#[derive(Debug, Clone)]
pub struct AnalysisUnit {
    /// Name used in reports and logs.
    pub name: String,
    /// The unit's instruction graph.
    pub graph: InstructionGraph,
    /// Number of local slots of the unit's frames.
    pub num_locals: usize,
}

impl AnalysisUnit {
    /// Creates a unit.
    #[must_use]
    pub fn new(name: impl Into<String>, graph: InstructionGraph, num_locals: usize) -> Self {
        Self {
            name: name.into(),
            graph,
            num_locals,
        }
    }
}

/// Results of all analyses of one unit.
///
/// Each analysis succeeds or fails on its own; a unit whose liveness is too complex still gets
/// its origins and regions.
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Name of the analysed unit.
    pub name: String,
    /// Instructions that may produce a returned value.
    pub origins: Result<Vec<bool>>,
    /// Variables to discard at statement boundaries.
    pub flush_plan: Result<FlushPlan>,
    /// Region partition of the unit.
    pub regions: Result<RegionMap>,
}

impl UnitReport {
    /// Returns `true` if every analysis of the unit succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.origins.is_ok() && self.flush_plan.is_ok() && self.regions.is_ok()
    }
}

/// Runs every analysis on a single unit.
#[must_use]
pub fn analyze_unit(
    unit: &AnalysisUnit,
    config: &AnalysisConfig,
    token: &CancellationToken,
) -> UnitReport {
    if token.is_cancelled() {
        return UnitReport {
            name: unit.name.clone(),
            origins: Err(Error::Cancelled),
            flush_plan: Err(Error::Cancelled),
            regions: Err(Error::Cancelled),
        };
    }

    let check = || token.is_cancelled();
    let origins = FrameSimulator::compute_frames(&unit.graph, unit.num_locals).and_then(
        |frames| {
            OriginTracker::new(&unit.graph, config)
                .with_cancellation(&check)
                .result_origins(&frames)
        },
    );
    let flush_plan = LivenessAnalyzer::new(&unit.graph, config)
        .with_cancellation(&check)
        .flush_plan();
    let regions = RegionFinder::partition(&unit.graph);

    let report = UnitReport {
        name: unit.name.clone(),
        origins,
        flush_plan,
        regions,
    };
    debug!(
        unit = %report.name,
        categories = %unit.graph.category_summary(),
        complete = report.is_complete(),
        "analysed unit"
    );
    report
}

/// Analyses all units in parallel; reports are returned in input order.
///
/// # Examples
///
/// ```rust
/// use flowscope::analysis::{analyze_units, AnalysisUnit, CancellationToken, CodeAssembler};
/// use flowscope::config::AnalysisConfig;
///
/// let mut asm = CodeAssembler::new();
/// asm.push_const()?.ret_value()?;
/// let unit = AnalysisUnit::new("answer", asm.finish()?, 0);
///
/// let reports = analyze_units(&[unit], &AnalysisConfig::default(), &CancellationToken::new());
/// assert_eq!(reports[0].origins.as_deref(), Ok(&[true, false][..]));
/// # Ok::<(), flowscope::Error>(())
/// ```
#[must_use]
pub fn analyze_units(
    units: &[AnalysisUnit],
    config: &AnalysisConfig,
    token: &CancellationToken,
) -> Vec<UnitReport> {
    let reports: Vec<UnitReport> = units
        .par_iter()
        .map(|unit| analyze_unit(unit, config, token))
        .collect();
    debug!(
        units = reports.len(),
        complete = reports.iter().filter(|report| report.is_complete()).count(),
        "analysed batch"
    );
    reports
}
