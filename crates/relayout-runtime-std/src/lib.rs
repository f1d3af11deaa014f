//! Standard host services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `relayout-core`. Applications can
//! construct a [`StdRuntime`], create one layout context per UI thread
//! context, and call [`StdRuntime::run_pending`] from their event loop to
//! deliver the deferred layout callbacks the managers asked for.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use relayout_core::{
    Clock, ContextId, ContextRegistry, DispatchPriority, LayoutError, LayoutManager,
    LayoutScheduler, LayoutTuning,
};
use web_time::Instant;

/// Scheduler that queues callback requests for the host loop to drain.
pub struct StdScheduler {
    requests: RefCell<Vec<DispatchPriority>>,
    disabled: Cell<u32>,
    waker: RefCell<Option<Rc<dyn Fn(DispatchPriority)>>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            disabled: Cell::new(0),
            waker: RefCell::new(None),
        }
    }

    /// Removes and returns the most urgent pending request.
    pub fn take_request(&self) -> Option<DispatchPriority> {
        let mut requests = self.requests.borrow_mut();
        let highest = requests.iter().copied().max()?;
        let index = requests.iter().position(|p| *p == highest)?;
        Some(requests.remove(index))
    }

    /// Returns whether any callback is waiting to be delivered.
    pub fn has_pending(&self) -> bool {
        !self.requests.borrow().is_empty()
    }

    pub fn pending(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Registers a waker that will be invoked whenever a callback is scheduled.
    pub fn set_waker(&self, waker: impl Fn(DispatchPriority) + 'static) {
        *self.waker.borrow_mut() = Some(Rc::new(waker));
    }

    /// Clears any registered waker.
    pub fn clear_waker(&self) {
        *self.waker.borrow_mut() = None;
    }

    fn wake(&self, priority: DispatchPriority) {
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker(priority);
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("requests", &self.requests.borrow())
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

impl LayoutScheduler for StdScheduler {
    fn schedule_layout(&self, priority: DispatchPriority) {
        self.requests.borrow_mut().push(priority);
        self.wake(priority);
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

/// Monotonic clock measured from its own creation.
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_millis(&self) -> u64 {
        saturating_millis(self.origin.elapsed())
    }
}

fn saturating_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Convenience container owning every layout context of a process together
/// with their schedulers and a shared clock.
pub struct StdRuntime {
    registry: ContextRegistry,
    schedulers: BTreeMap<ContextId, Rc<StdScheduler>>,
    clock: Rc<StdClock>,
    tuning: LayoutTuning,
}

impl StdRuntime {
    /// Creates a new standard runtime using the default tuning.
    pub fn new() -> Self {
        Self {
            registry: ContextRegistry::new(),
            schedulers: BTreeMap::new(),
            clock: Rc::new(StdClock::new()),
            tuning: LayoutTuning::default(),
        }
    }

    /// Creates a runtime whose contexts all use `tuning`.
    pub fn with_tuning(tuning: LayoutTuning) -> Result<Self, LayoutError> {
        tuning.validate()?;
        Ok(Self {
            tuning,
            ..Self::new()
        })
    }

    /// Creates a new layout context with its own scheduler.
    pub fn create_context(&mut self) -> Result<ContextId, LayoutError> {
        let scheduler = Rc::new(StdScheduler::new());
        let id = self
            .registry
            .create(scheduler.clone(), self.clock.clone(), self.tuning.clone())?;
        self.schedulers.insert(id, scheduler);
        Ok(id)
    }

    pub fn layout(&self, id: ContextId) -> Result<&LayoutManager, LayoutError> {
        self.registry.get(id)
    }

    pub fn layout_mut(&mut self, id: ContextId) -> Result<&mut LayoutManager, LayoutError> {
        self.registry.get_mut(id)
    }

    /// Returns the scheduler of a live context.
    pub fn scheduler(&self, id: ContextId) -> Option<Rc<StdScheduler>> {
        self.schedulers.get(&id).cloned()
    }

    /// Returns the shared clock.
    pub fn clock(&self) -> Rc<StdClock> {
        Rc::clone(&self.clock)
    }

    /// Delivers one pending callback to `id`. Returns `Ok(false)` when
    /// nothing was pending or dispatch is currently disabled.
    pub fn dispatch_once(&mut self, id: ContextId) -> Result<bool, LayoutError> {
        let scheduler = self
            .schedulers
            .get(&id)
            .cloned()
            .ok_or(LayoutError::ContextShutDown)?;
        if scheduler.is_processing_disabled() {
            return Ok(false);
        }
        let Some(priority) = scheduler.take_request() else {
            return Ok(false);
        };
        self.registry.get_mut(id)?.on_scheduled(priority)?;
        Ok(true)
    }

    /// Delivers every callback that was pending when the call started, across
    /// all contexts. Requests made while dispatching wait for the next call.
    /// Returns how many callbacks ran.
    pub fn run_pending(&mut self) -> Result<usize, LayoutError> {
        let snapshot: Vec<(ContextId, usize)> = self
            .schedulers
            .iter()
            .map(|(id, scheduler)| (*id, scheduler.pending()))
            .filter(|(_, pending)| *pending > 0)
            .collect();
        let mut dispatched = 0;
        for (id, pending) in snapshot {
            for _ in 0..pending {
                if !self.dispatch_once(id)? {
                    break;
                }
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Shuts down a context and drops its pending callbacks.
    pub fn shutdown_context(&mut self, id: ContextId) -> bool {
        self.schedulers.remove(&id);
        self.registry.shutdown(id)
    }

    pub fn context_count(&self) -> usize {
        self.registry.len()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("contexts", &self.registry.ids())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs `env_logger` with an `info` default filter. Safe to call more
/// than once.
#[cfg(feature = "logging")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
