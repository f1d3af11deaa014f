//! Tuning knobs for queue pools and the update loop's escape hatches.
//!
//! None of these values carry meaning beyond "bounded effort before
//! yielding". The defaults are the historical ones and work well for trees of
//! a few thousand nodes.

use crate::LayoutError;

/// Pool sizes, pass limits, and budgets used by a [`crate::LayoutManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutTuning {
    /// Number of request tokens each invalidation queue pre-allocates.
    pub queue_pocket_capacity: usize,
    /// Once the free pool shrinks to this many tokens, new invalidations
    /// escalate to the root instead of taking a token.
    pub queue_pocket_reserve: usize,
    /// Number of recycled entries each subscriber list keeps around.
    pub subscriber_pocket_capacity: usize,
    /// Outer fixed-point iterations allowed before deferring to background.
    pub max_update_passes: u32,
    /// Nodes recomputed between two wall-clock checks inside a pass.
    pub pass_check_interval: u32,
    /// Wall-clock budget for a single measure or arrange pass.
    pub pass_time_budget_ms: u64,
    /// Maximum nesting of measure (or arrange) calls.
    pub recursion_limit: u32,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            queue_pocket_capacity: 153,
            queue_pocket_reserve: 8,
            subscriber_pocket_capacity: 153,
            max_update_passes: 153,
            pass_check_interval: 153,
            pass_time_budget_ms: 153 * 2,
            recursion_limit: 4096,
        }
    }
}

impl LayoutTuning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_pocket(mut self, capacity: usize, reserve: usize) -> Self {
        self.queue_pocket_capacity = capacity;
        self.queue_pocket_reserve = reserve;
        self
    }

    pub fn with_subscriber_pocket_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_pocket_capacity = capacity;
        self
    }

    pub fn with_max_update_passes(mut self, passes: u32) -> Self {
        self.max_update_passes = passes;
        self
    }

    pub fn with_pass_budget(mut self, check_interval: u32, budget_ms: u64) -> Self {
        self.pass_check_interval = check_interval;
        self.pass_time_budget_ms = budget_ms;
        self
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Checks that the pool reserve leaves room for at least one token and
    /// that every limit allows some progress.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.queue_pocket_reserve >= self.queue_pocket_capacity {
            return Err(LayoutError::InvalidTuning {
                reason: "queue pocket reserve must be smaller than its capacity",
            });
        }
        if self.max_update_passes == 0 {
            return Err(LayoutError::InvalidTuning {
                reason: "max update passes must be non-zero",
            });
        }
        if self.pass_check_interval == 0 {
            return Err(LayoutError::InvalidTuning {
                reason: "pass check interval must be non-zero",
            });
        }
        if self.recursion_limit == 0 {
            return Err(LayoutError::InvalidTuning {
                reason: "recursion limit must be non-zero",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(LayoutTuning::default().validate(), Ok(()));
        assert_eq!(LayoutTuning::default().pass_time_budget_ms, 306);
    }

    #[test]
    fn reserve_must_fit_inside_capacity() {
        let tuning = LayoutTuning::new().with_queue_pocket(8, 8);
        assert!(matches!(
            tuning.validate(),
            Err(LayoutError::InvalidTuning { .. })
        ));
    }

    #[test]
    fn zero_pass_limit_is_rejected() {
        let tuning = LayoutTuning::new().with_max_update_passes(0);
        assert!(tuning.validate().is_err());
    }
}
