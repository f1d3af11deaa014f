//! Per-context layout manager and its fixed-point update loop.
//!
//! The manager owns the node tree, both invalidation queues, both subscriber
//! lists, and the size-changed chain. It never drives itself: invalidations
//! ask the host for a deferred callback through [`LayoutScheduler`], and the
//! host answers by calling [`LayoutManager::on_scheduled`].
//!
//! One update runs `measure → arrange → size-changed → layout-updated →
//! automation` repeatedly until nothing is dirty. Each stage re-checks for
//! dirtiness first, so observers never see a half-computed tree. Two escape
//! hatches defer the rest of the work to a background callback instead of
//! spinning forever: a cap on outer iterations and a wall-clock budget inside
//! each pass.

use std::rc::Rc;

use crate::config::LayoutTuning;
use crate::diagnostics::{EscapeReason, LayoutStats};
use crate::events::{AutomationEventSource, LayoutUpdatedListener};
use crate::geometry::Size;
use crate::node::LayoutBehavior;
use crate::platform::{Clock, DispatchPriority, LayoutScheduler, ProcessingDisabled};
use crate::queue::{InvalidationQueue, QueueKind, UpdateRequester};
use crate::subscribers::WeakSubscriberList;
use crate::tree::{LayoutNode, LayoutTree, NodeId, Visibility};
use crate::LayoutError;

/// Scheduling half of the manager, lent to the queues so they can request a
/// pass without borrowing the whole manager.
struct UpdateSchedule {
    scheduler: Rc<dyn LayoutScheduler>,
    request_posted: bool,
    is_updating: bool,
}

impl UpdateSchedule {
    fn post(&mut self, priority: DispatchPriority) {
        self.scheduler.schedule_layout(priority);
    }
}

impl UpdateRequester for UpdateSchedule {
    fn request_update(&mut self) {
        if !self.request_posted && !self.is_updating {
            self.scheduler.schedule_layout(DispatchPriority::Render);
            self.request_posted = true;
        }
    }
}

/// Coarse state of the manager, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    /// A render-priority callback has been requested and not yet delivered.
    Scheduled,
    Running,
    /// A failed pass left a faulting node to re-layout on the next update.
    Recovering,
    Dead,
}

enum PassOutcome {
    Completed,
    Deferred,
}

/// Wall-clock check performed every `pass_check_interval` recomputed nodes.
struct PassBudget {
    count: u32,
    started_at: Option<u64>,
}

impl PassBudget {
    fn new() -> Self {
        Self {
            count: 0,
            started_at: None,
        }
    }

    fn exhausted(&mut self, tuning: &LayoutTuning, clock: &dyn Clock) -> bool {
        self.count += 1;
        if self.count <= tuning.pass_check_interval {
            return false;
        }
        self.count = 0;
        match self.started_at {
            None => {
                self.started_at = Some(clock.now_millis());
                false
            }
            Some(start) => clock.elapsed_millis(start) > tuning.pass_time_budget_ms,
        }
    }
}

pub struct LayoutManager {
    pub(crate) tree: LayoutTree,
    pub(crate) measure_queue: InvalidationQueue,
    pub(crate) arrange_queue: InvalidationQueue,
    pub(crate) layout_updated: WeakSubscriberList<dyn LayoutUpdatedListener>,
    pub(crate) automation: WeakSubscriberList<dyn AutomationEventSource>,
    pub(crate) size_changed_chain: Vec<NodeId>,
    schedule: UpdateSchedule,
    clock: Rc<dyn Clock>,
    pub(crate) tuning: LayoutTuning,
    update_in_progress: bool,
    pub(crate) fire_post_layout_events: bool,
    pub(crate) in_fire_layout_updated: bool,
    pub(crate) in_fire_automation: bool,
    pub(crate) measures_on_stack: u32,
    pub(crate) arranges_on_stack: u32,
    pub(crate) last_exception_node: Option<NodeId>,
    force_layout_node: Option<NodeId>,
    got_exception: bool,
    dead: bool,
    pub(crate) stats: LayoutStats,
}

impl LayoutManager {
    pub fn new(
        scheduler: Rc<dyn LayoutScheduler>,
        clock: Rc<dyn Clock>,
        tuning: LayoutTuning,
    ) -> Result<Self, LayoutError> {
        tuning.validate()?;
        Ok(Self {
            tree: LayoutTree::new(),
            measure_queue: InvalidationQueue::new(QueueKind::Measure, &tuning),
            arrange_queue: InvalidationQueue::new(QueueKind::Arrange, &tuning),
            layout_updated: WeakSubscriberList::new(tuning.subscriber_pocket_capacity),
            automation: WeakSubscriberList::new(tuning.subscriber_pocket_capacity),
            size_changed_chain: Vec::new(),
            schedule: UpdateSchedule {
                scheduler,
                request_posted: false,
                is_updating: false,
            },
            clock,
            tuning,
            update_in_progress: false,
            fire_post_layout_events: false,
            in_fire_layout_updated: false,
            in_fire_automation: false,
            measures_on_stack: 0,
            arranges_on_stack: 0,
            last_exception_node: None,
            force_layout_node: None,
            got_exception: false,
            dead: false,
            stats: LayoutStats::default(),
        })
    }

    pub fn tree(&self) -> &LayoutTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Result<&LayoutNode, LayoutError> {
        self.tree.get(id)
    }

    pub fn tuning(&self) -> &LayoutTuning {
        &self.tuning
    }

    pub fn stats(&self) -> LayoutStats {
        self.stats
    }

    pub fn measure_queue(&self) -> &InvalidationQueue {
        &self.measure_queue
    }

    pub fn arrange_queue(&self) -> &InvalidationQueue {
        &self.arrange_queue
    }

    /// Deepest node whose measure or arrange failed most recently.
    pub fn last_exception_node(&self) -> Option<NodeId> {
        self.last_exception_node
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn state(&self) -> ManagerState {
        if self.dead {
            ManagerState::Dead
        } else if self.update_in_progress {
            ManagerState::Running
        } else if self.got_exception || self.force_layout_node.is_some() {
            ManagerState::Recovering
        } else if self.schedule.request_posted {
            ManagerState::Scheduled
        } else {
            ManagerState::Idle
        }
    }

    /// True while either queue holds work.
    pub fn has_dirtiness(&self) -> bool {
        !self.measure_queue.is_empty() || !self.arrange_queue.is_empty()
    }

    /// Creates a detached node; append it under a parent or lay it out as a
    /// root.
    pub fn create_node(&mut self, behavior: Rc<dyn LayoutBehavior>) -> NodeId {
        self.tree.insert(behavior)
    }

    /// Moves `child` under `parent` and invalidates the measure of both the
    /// new and the previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), LayoutError> {
        let previous = self.tree.parent(child);
        self.tree.append_child(parent, child)?;
        if let Some(previous) = previous.filter(|p| *p != parent) {
            self.invalidate_measure(previous);
        }
        self.invalidate_measure(parent);
        Ok(())
    }

    /// Removes `node` and its subtree. Queue tokens still pointing into the
    /// subtree are pruned lazily.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), LayoutError> {
        let parent = self.tree.parent(node);
        self.tree.remove(node)?;
        if let Some(parent) = parent {
            self.invalidate_measure(parent);
        }
        Ok(())
    }

    pub fn set_visibility(&mut self, node: NodeId, visibility: Visibility) -> Result<(), LayoutError> {
        let state = self.tree.get_mut(node)?;
        let previous = state.visibility;
        if previous == visibility {
            return Ok(());
        }
        state.visibility = visibility;
        let parent = state.parent();
        if previous == Visibility::Collapsed || visibility == Visibility::Collapsed {
            match parent {
                Some(parent) => self.invalidate_measure(parent),
                None => {
                    // A collapsed root leaves the queue but keeps its dirty bit.
                    let flags = self.tree.get(node)?.flags;
                    if flags.measure_dirty && !flags.never_measured {
                        self.measure_queue
                            .add(&mut self.tree, node, &mut self.schedule);
                    } else {
                        self.invalidate_measure(node);
                    }
                }
            }
        }
        Ok(())
    }

    /// Suspends or resumes layout for the subtree under `node`. Resuming
    /// queues every dirty node of the subtree that has been laid out before.
    pub fn set_layout_suspended(&mut self, node: NodeId, suspended: bool) -> Result<(), LayoutError> {
        let state = self.tree.get_mut(node)?;
        if state.flags.layout_suspended == suspended {
            return Ok(());
        }
        state.flags.layout_suspended = suspended;
        if suspended || self.tree.is_layout_suspended(node) {
            return Ok(());
        }
        for id in self.tree.subtree(node) {
            let Ok(state) = self.tree.get(id) else {
                continue;
            };
            let flags = state.flags;
            if flags.measure_dirty && !flags.never_measured {
                self.measure_queue
                    .add(&mut self.tree, id, &mut self.schedule);
            }
            if flags.arrange_dirty && !flags.never_arranged {
                self.arrange_queue
                    .add(&mut self.tree, id, &mut self.schedule);
            }
        }
        Ok(())
    }

    /// Marks `node` as needing a new measure. Repeated calls before the next
    /// measure are no-ops; stale ids are ignored.
    pub fn invalidate_measure(&mut self, node: NodeId) {
        if self.dead {
            return;
        }
        let Ok(state) = self.tree.get(node) else {
            return;
        };
        let flags = state.flags;
        if flags.measure_dirty || flags.measure_in_progress {
            return;
        }
        if !flags.never_measured {
            self.measure_queue
                .add(&mut self.tree, node, &mut self.schedule);
        }
        if let Ok(state) = self.tree.get_mut(node) {
            state.flags.measure_dirty = true;
        }
    }

    /// Marks `node` as needing a new arrange.
    pub fn invalidate_arrange(&mut self, node: NodeId) {
        if self.dead {
            return;
        }
        let Ok(state) = self.tree.get(node) else {
            return;
        };
        let flags = state.flags;
        if flags.arrange_dirty || flags.arrange_in_progress {
            return;
        }
        if !flags.never_arranged {
            self.arrange_queue
                .add(&mut self.tree, node, &mut self.schedule);
        }
        if let Ok(state) = self.tree.get_mut(node) {
            state.flags.arrange_dirty = true;
        }
    }

    /// Entry point for the deferred callback requested from the scheduler.
    pub fn on_scheduled(&mut self, priority: DispatchPriority) -> Result<(), LayoutError> {
        if self.dead {
            return Ok(());
        }
        log::trace!("layout callback delivered at {priority:?}");
        self.update_layout()
    }

    /// Runs the fixed-point loop now. A no-op while an update, a measure, or
    /// an arrange is already running.
    ///
    /// When a node fails, the error is returned after the manager arranged
    /// for the whole tree around that node to be re-laid out on the next
    /// idle callback.
    pub fn update_layout(&mut self) -> Result<(), LayoutError> {
        if self.update_in_progress
            || self.measures_on_stack > 0
            || self.arranges_on_stack > 0
            || self.dead
        {
            return Ok(());
        }

        let mut current = None;
        self.update_in_progress = true;
        let result = self.run_update_loop(&mut current);
        self.update_in_progress = false;
        self.schedule.is_updating = false;
        self.schedule.request_posted = false;

        if let Err(err) = &result {
            self.stats.failures += 1;
            self.got_exception = true;
            self.force_layout_node = current.or(self.last_exception_node);
            log::warn!(
                "layout update failed at {:?}: {err}; re-laying out on idle",
                self.force_layout_node
            );
            self.schedule.request_posted = true;
            self.schedule.post(DispatchPriority::Idle);
        }
        result
    }

    fn run_update_loop(&mut self, current: &mut Option<NodeId>) -> Result<(), LayoutError> {
        self.invalidate_tree_if_recovering();

        let mut passes = 0u32;
        while self.has_dirtiness() || self.fire_post_layout_events {
            passes += 1;
            if passes > self.tuning.max_update_passes {
                self.defer_to_background(EscapeReason::PassLimit);
                return Ok(());
            }
            self.stats.update_passes += 1;
            self.schedule.is_updating = true;

            {
                let _processing = self.disable_processing();
                if let PassOutcome::Deferred = self.run_measure_pass(current)? {
                    return Ok(());
                }
                if let PassOutcome::Deferred = self.run_arrange_pass(current)? {
                    return Ok(());
                }
                if !self.measure_queue.is_empty() {
                    continue;
                }
                *current = None;
                self.schedule.is_updating = false;
            }

            self.fire_size_changed_events();
            if self.has_dirtiness() {
                continue;
            }
            self.fire_post_layout_events = false;
            self.fire_layout_updated_event();
            if self.has_dirtiness() {
                continue;
            }
            self.fire_automation_events();
            if self.has_dirtiness() {
                continue;
            }
            self.fire_size_changed_events();
        }
        log::debug!("layout converged after {passes} pass(es)");
        Ok(())
    }

    fn run_measure_pass(&mut self, current: &mut Option<NodeId>) -> Result<PassOutcome, LayoutError> {
        let mut budget = PassBudget::new();
        loop {
            if budget.exhausted(&self.tuning, self.clock.as_ref()) {
                self.defer_to_background(EscapeReason::TimeBudget);
                return Ok(PassOutcome::Deferred);
            }
            let Some(node) = self.measure_queue.top_most(&self.tree) else {
                return Ok(PassOutcome::Completed);
            };
            *current = Some(node);
            let constraint = self.tree.get(node)?.previous_constraint();
            self.measure(node, constraint)?;
        }
    }

    fn run_arrange_pass(&mut self, current: &mut Option<NodeId>) -> Result<PassOutcome, LayoutError> {
        let mut budget = PassBudget::new();
        while self.measure_queue.is_empty() {
            if budget.exhausted(&self.tuning, self.clock.as_ref()) {
                self.defer_to_background(EscapeReason::TimeBudget);
                return Ok(PassOutcome::Deferred);
            }
            let Some(node) = self.arrange_queue.top_most(&self.tree) else {
                break;
            };
            *current = Some(node);
            let rect = self.proper_arrange_rect(node)?;
            self.arrange(node, rect)?;
        }
        Ok(PassOutcome::Completed)
    }

    fn defer_to_background(&mut self, reason: EscapeReason) {
        match reason {
            EscapeReason::PassLimit => self.stats.pass_limit_escapes += 1,
            EscapeReason::TimeBudget => self.stats.time_budget_escapes += 1,
        }
        log::debug!("layout loop yielding to background: {reason:?}");
        self.schedule.post(DispatchPriority::Background);
    }

    /// After a failed update, dirties the whole tree that contained the
    /// faulting node and queues its root.
    fn invalidate_tree_if_recovering(&mut self) {
        if self.force_layout_node.is_none() && !self.got_exception {
            return;
        }
        if let Some(node) = self.force_layout_node.take() {
            self.mark_tree_dirty(node);
        }
        self.got_exception = false;
    }

    fn mark_tree_dirty(&mut self, node: NodeId) {
        let Some(root) = self.tree.root_of(node) else {
            return;
        };
        self.stats.recoveries += 1;
        log::debug!("recovering layout from {node}: re-laying out tree rooted at {root}");
        for id in self.tree.subtree(root) {
            if let Ok(state) = self.tree.get_mut(id) {
                state.flags.measure_dirty = true;
                state.flags.arrange_dirty = true;
            }
        }
        self.measure_queue
            .add(&mut self.tree, root, &mut self.schedule);
        self.arrange_queue
            .add(&mut self.tree, root, &mut self.schedule);
    }

    pub(crate) fn request_update(&mut self) {
        if !self.dead {
            self.schedule.request_update();
        }
    }

    pub(crate) fn disable_processing(&self) -> ProcessingDisabled {
        ProcessingDisabled::new(Rc::clone(&self.schedule.scheduler))
    }

    /// Tears the manager down with its thread context. Every later request
    /// is ignored.
    pub fn shutdown(&mut self) {
        if self.dead {
            return;
        }
        self.dead = true;
        self.measure_queue.clear(&mut self.tree);
        self.arrange_queue.clear(&mut self.tree);
        self.layout_updated.clear();
        self.automation.clear();
        for node in self.size_changed_chain.drain(..) {
            if let Ok(state) = self.tree.get_mut(node) {
                state.size_changed = None;
            }
        }
        self.force_layout_node = None;
        self.got_exception = false;
        log::debug!("layout manager shut down");
    }

    /// Text dump of the tree under `root` for debugging.
    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        self.tree.dump_tree(root)
    }

    /// Desired size of `node`, zero for collapsed nodes.
    pub fn desired_size(&self, node: NodeId) -> Result<Size, LayoutError> {
        Ok(self.tree.get(node)?.desired_size())
    }
}
