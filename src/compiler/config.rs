//! Configuration for the optimizer pipeline.
//!
//! All limits and switches are explicit values; nothing is read from the
//! environment.

/// Switches and limits for an optimizer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Maximum scheduler iterations (default: 5).
    pub max_iterations: usize,

    /// Consecutive unchanged iterations before the scheduler stops (default: 2).
    pub stable_iterations: usize,

    /// Enable constant folding.
    pub constant_folding_enabled: bool,

    /// Enable elimination of arguments object allocations.
    pub arguments_elimination_enabled: bool,

    /// Enable loop-invariant code motion.
    pub licm_enabled: bool,

    /// Record events for optimizations that were considered but rejected, such as
    /// `HoistRejected` and `CandidateEscaped`.
    pub verbose_events: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            stable_iterations: 2,
            constant_folding_enabled: true,
            arguments_elimination_enabled: true,
            licm_enabled: true,
            verbose_events: false,
        }
    }
}

impl OptimizerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that only runs the analysis and constant folding.
    ///
    /// # Returns
    ///
    /// A new `OptimizerConfig` with arguments elimination and LICM disabled.
    #[must_use]
    pub fn fold_only() -> Self {
        Self {
            arguments_elimination_enabled: false,
            licm_enabled: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that records rejection events as well.
    ///
    /// # Returns
    ///
    /// A new `OptimizerConfig` with `verbose_events` set.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            verbose_events: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let config = OptimizerConfig::default();
        assert_eq!((config.max_iterations, config.stable_iterations), (5, 2));
        assert!(config.licm_enabled && !config.verbose_events);

        let fold = OptimizerConfig::fold_only();
        assert!(fold.constant_folding_enabled);
        assert!(!fold.licm_enabled && !fold.arguments_elimination_enabled);

        assert!(OptimizerConfig::verbose().verbose_events);
    }
}
