//! Counters describing what the update loop has done so far.

/// Why an update stopped early and handed the rest to a background callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EscapeReason {
    /// The outer loop ran out of iterations.
    PassLimit,
    /// A measure or arrange pass exceeded its wall-clock budget.
    TimeBudget,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutStats {
    /// Outer fixed-point iterations started.
    pub update_passes: u64,
    /// Calls into `measure_override`.
    pub measures: u64,
    /// Calls into `arrange_override`.
    pub arranges: u64,
    pub pass_limit_escapes: u64,
    pub time_budget_escapes: u64,
    /// Trees dirtied wholesale after a failed update.
    pub recoveries: u64,
    pub failures: u64,
    /// Subscriber entries dropped because their target was gone.
    pub pruned_subscribers: u64,
    pub size_changed_fired: u64,
}

impl LayoutStats {
    pub fn escapes(&self) -> u64 {
        self.pass_limit_escapes + self.time_budget_escapes
    }
}
