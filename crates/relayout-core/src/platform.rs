//! Platform abstraction traits for host dispatch services.
//!
//! The layout manager never runs its own event loop. It asks the host to call
//! it back later through [`LayoutScheduler`] and reads time through
//! [`Clock`], so the same engine can sit on top of a winit loop, a browser
//! task queue, or a hand-pumped test harness.

use std::rc::Rc;

/// Priority tag attached to a deferred layout callback.
///
/// Ordered from least to most urgent, so hosts can pick the highest pending
/// request with `max()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DispatchPriority {
    /// Recovery after a failed pass; runs once nothing else is pending.
    Idle,
    /// Work deferred by a pass limit or a time budget.
    Background,
    /// Regular layout requests, processed before the next frame renders.
    Render,
}

/// Schedules deferred layout work on the owning UI thread.
///
/// Implementations are single-thread affine: every call happens on the thread
/// that owns the layout context.
pub trait LayoutScheduler {
    /// Request that the host call back into the layout manager once, at the
    /// given priority, via `LayoutManager::on_scheduled`.
    fn schedule_layout(&self, priority: DispatchPriority);

    /// Enter a region where the host must not run queued callbacks.
    fn disable_processing(&self);

    /// Leave a region entered with [`LayoutScheduler::disable_processing`].
    fn enable_processing(&self);

    /// Returns whether a disable region is currently active.
    fn is_processing_disabled(&self) -> bool;
}

/// Provides timing information for pass budgets.
pub trait Clock {
    /// Returns a monotonic timestamp in milliseconds.
    fn now_millis(&self) -> u64;

    /// Returns the number of milliseconds elapsed since `since`.
    fn elapsed_millis(&self, since: u64) -> u64 {
        self.now_millis().saturating_sub(since)
    }
}

/// Scoped guard that keeps host dispatch disabled while alive.
pub struct ProcessingDisabled {
    scheduler: Rc<dyn LayoutScheduler>,
}

impl ProcessingDisabled {
    pub fn new(scheduler: Rc<dyn LayoutScheduler>) -> Self {
        scheduler.disable_processing();
        Self { scheduler }
    }
}

impl Drop for ProcessingDisabled {
    fn drop(&mut self) {
        self.scheduler.enable_processing();
    }
}
