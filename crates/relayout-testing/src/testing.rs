use relayout_core::{
    Clock, DispatchPriority, LayoutBehavior, LayoutError, LayoutManager, LayoutScheduler,
    LayoutTuning, NodeId,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Scheduler that only records what was asked of it.
///
/// Nothing runs until the test dispatches a request through
/// [`LayoutTestRule::dispatch_next`] or drains everything with
/// [`LayoutTestRule::pump_until_idle`].
#[derive(Debug, Default)]
pub struct TestScheduler {
    requests: RefCell<Vec<DispatchPriority>>,
    history: RefCell<Vec<DispatchPriority>>,
    disabled: Cell<u32>,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests not yet dispatched.
    pub fn pending(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.requests.borrow().is_empty()
    }

    /// Highest priority among pending requests.
    pub fn highest_pending(&self) -> Option<DispatchPriority> {
        self.requests.borrow().iter().copied().max()
    }

    /// Every request ever made, in order.
    pub fn history(&self) -> Vec<DispatchPriority> {
        self.history.borrow().clone()
    }

    /// Removes and returns the most urgent pending request, oldest first
    /// among equals.
    pub fn take_next(&self) -> Option<DispatchPriority> {
        let mut requests = self.requests.borrow_mut();
        let highest = requests.iter().copied().max()?;
        let index = requests.iter().position(|p| *p == highest)?;
        Some(requests.remove(index))
    }

    pub fn clear(&self) {
        self.requests.borrow_mut().clear();
    }

    /// Current nesting depth of disable-processing regions.
    pub fn disabled_depth(&self) -> u32 {
        self.disabled.get()
    }
}

impl LayoutScheduler for TestScheduler {
    fn schedule_layout(&self, priority: DispatchPriority) {
        self.requests.borrow_mut().push(priority);
        self.history.borrow_mut().push(priority);
    }

    fn disable_processing(&self) {
        self.disabled.set(self.disabled.get() + 1);
    }

    fn enable_processing(&self) {
        self.disabled.set(self.disabled.get().saturating_sub(1));
    }

    fn is_processing_disabled(&self) -> bool {
        self.disabled.get() > 0
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    step: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get() + millis);
    }

    pub fn set(&self, millis: u64) {
        self.now.set(millis);
    }

    /// Makes every read advance the clock by `millis` afterwards, simulating
    /// slow work between reads.
    pub fn set_step(&self, millis: u64) {
        self.step.set(millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step.get());
        now
    }
}

/// Headless harness owning a layout manager wired to a [`TestScheduler`] and
/// a [`ManualClock`].
pub struct LayoutTestRule {
    layout: LayoutManager,
    scheduler: Rc<TestScheduler>,
    clock: Rc<ManualClock>,
}

impl LayoutTestRule {
    /// Create a new rule with the default tuning.
    pub fn new() -> Self {
        match Self::with_tuning(LayoutTuning::default()) {
            Ok(rule) => rule,
            Err(err) => panic!("default tuning rejected: {err}"),
        }
    }

    pub fn with_tuning(tuning: LayoutTuning) -> Result<Self, LayoutError> {
        let scheduler = Rc::new(TestScheduler::new());
        let clock = Rc::new(ManualClock::new());
        let layout = LayoutManager::new(scheduler.clone(), clock.clone(), tuning)?;
        Ok(Self {
            layout,
            scheduler,
            clock,
        })
    }

    pub fn layout(&self) -> &LayoutManager {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut LayoutManager {
        &mut self.layout
    }

    pub fn scheduler(&self) -> &TestScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Adds a detached node.
    pub fn add_node(&mut self, behavior: Rc<dyn LayoutBehavior>) -> NodeId {
        self.layout.create_node(behavior)
    }

    /// Adds a node under `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        behavior: Rc<dyn LayoutBehavior>,
    ) -> Result<NodeId, LayoutError> {
        let child = self.layout.create_node(behavior);
        self.layout.append_child(parent, child)?;
        Ok(child)
    }

    /// Delivers the most urgent pending callback. Returns `None` when nothing
    /// is pending or the host may not dispatch right now.
    pub fn dispatch_next(&mut self) -> Option<Result<(), LayoutError>> {
        if self.scheduler.is_processing_disabled() {
            return None;
        }
        let priority = self.scheduler.take_next()?;
        Some(self.layout.on_scheduled(priority))
    }

    /// Dispatches callbacks until none remain, stopping at the first error.
    /// Returns how many callbacks ran.
    pub fn pump_until_idle(&mut self) -> Result<usize, LayoutError> {
        let mut dispatched = 0;
        while let Some(result) = self.dispatch_next() {
            dispatched += 1;
            if dispatched > 1000 {
                panic!("pump_until_idle looped too many times!");
            }
            result?;
        }
        Ok(dispatched)
    }

    /// Dump the layout tree under `root` for debugging.
    pub fn dump_tree(&self, root: NodeId) -> String {
        self.layout.dump_tree(Some(root))
    }
}

impl Default for LayoutTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `LayoutTestRule`.
pub fn run_layout_test<R>(f: impl FnOnce(&mut LayoutTestRule) -> R) -> R {
    let mut rule = LayoutTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;
