//! Configuration for the analysis engine.
//!
//! All analyses share one [`AnalysisConfig`]. It bounds the work the worklist solver may do,
//! controls how often cancellation is checked, and carries the origin tracker's opaque-producer
//! policy.

use crate::analysis::{OpaqueProducers, QueueOrder};

/// Configuration for the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Steps allowed per graph edge before a solver run gives up (default: 100).
    ///
    /// The budget of a run is `max(edges, 1) * step_multiplier`.
    pub step_multiplier: usize,

    /// Number of dequeued work items between two cancellation checks (default: 1024).
    pub poll_interval: usize,

    /// Order in which queued work items are processed (default: FIFO).
    pub queue_order: QueueOrder,

    /// Instruction kinds whose results are not attributed as fresh values by the origin
    /// tracker (default: virtual calls, interface calls, field reads and array reads).
    pub opaque_producers: OpaqueProducers,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            step_multiplier: 100,
            poll_interval: 1024,
            queue_order: QueueOrder::Fifo,
            opaque_producers: OpaqueProducers::default(),
        }
    }
}

impl AnalysisConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for quick, shallow analysis.
    ///
    /// Gives up early on complex units and checks for cancellation more often.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            step_multiplier: 20,
            poll_interval: 256,
            ..Self::default()
        }
    }

    /// Creates a configuration for large units that should rarely be abandoned.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            step_multiplier: 1000,
            poll_interval: 4096,
            ..Self::default()
        }
    }

    /// Sets the step multiplier.
    #[must_use]
    pub fn with_step_multiplier(mut self, multiplier: usize) -> Self {
        self.step_multiplier = multiplier;
        self
    }

    /// Sets the cancellation poll interval. Values below 1 are treated as 1.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: usize) -> Self {
        self.poll_interval = interval.max(1);
        self
    }

    /// Sets the work queue order.
    #[must_use]
    pub fn with_queue_order(mut self, order: QueueOrder) -> Self {
        self.queue_order = order;
        self
    }

    /// Sets the opaque-producer policy of the origin tracker.
    #[must_use]
    pub fn with_opaque_producers(mut self, producers: OpaqueProducers) -> Self {
        self.opaque_producers = producers;
        self
    }

    /// Returns the step budget for a graph with `edges` edges.
    #[must_use]
    pub fn step_budget(&self, edges: usize) -> usize {
        edges.max(1).saturating_mul(self.step_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::new();
        assert_eq!(config.step_multiplier, 100);
        assert_eq!(config.poll_interval, 1024);
        assert_eq!(config.queue_order, QueueOrder::Fifo);
        assert!(config
            .opaque_producers
            .contains(OpaqueProducers::VIRTUAL_CALL | OpaqueProducers::FIELD_READ));
    }

    #[test]
    fn test_budget() {
        let config = AnalysisConfig::new().with_step_multiplier(10);
        assert_eq!(config.step_budget(0), 10);
        assert_eq!(config.step_budget(7), 70);
        assert_eq!(
            AnalysisConfig::new().with_poll_interval(0).poll_interval,
            1
        );
        assert!(AnalysisConfig::fast().step_multiplier < AnalysisConfig::thorough().step_multiplier);
    }
}
