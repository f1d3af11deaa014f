//! Node-side measure/arrange contract.
//!
//! A node's layout logic lives behind [`LayoutBehavior`]; the manager owns the
//! bookkeeping around it: bypassing clean nodes, keeping dirty flags and queue
//! membership in sync, recursion limits, the desired-size waterfall to the
//! parent, and size-changed notifications.

use crate::geometry::{Rect, Size};
use crate::manager::LayoutManager;
use crate::tree::{NodeId, Visibility};
use crate::{LayoutError, Phase};

/// Layout logic of a single node.
///
/// Implementations measure and arrange their children by calling back into
/// [`LayoutManager::measure`] and [`LayoutManager::arrange`].
pub trait LayoutBehavior {
    /// Computes the size this node wants given `available` space.
    fn measure_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        available: Size,
    ) -> Result<Size, LayoutError>;

    /// Positions children inside `final_size` and returns the size actually
    /// used.
    fn arrange_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError>;

    /// Called when a child's desired size changed outside of this node's own
    /// measure.
    fn on_child_desired_size_changed(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        _child: NodeId,
    ) {
        if layout
            .node(node)
            .map(|n| n.is_measure_valid())
            .unwrap_or(false)
        {
            layout.invalidate_measure(node);
        }
    }

    /// Called after layout settles when the arranged size changed.
    fn on_render_size_changed(
        &self,
        _layout: &mut LayoutManager,
        _node: NodeId,
        _info: &SizeChangedInfo,
    ) {
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Pending size-change notification for one node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeChangedInfo {
    pub previous_size: Size,
    pub new_size: Size,
    pub width_changed: bool,
    pub height_changed: bool,
}

impl SizeChangedInfo {
    fn merge(&mut self, width_changed: bool, height_changed: bool) {
        self.width_changed |= width_changed;
        self.height_changed |= height_changed;
    }
}

impl LayoutManager {
    /// Measures `node` at `available`, returning its desired size.
    ///
    /// Clean nodes measured at (nearly) the same constraint return the cached
    /// size without calling into their behavior.
    pub fn measure(&mut self, node: NodeId, available: Size) -> Result<Size, LayoutError> {
        let _processing = self.disable_processing();
        if available.has_nan() {
            return Err(LayoutError::NanConstraint { id: node });
        }

        let state = self.tree.get(node)?;
        let flags = state.flags;
        let is_close = available.is_close(state.previous_constraint);
        let behavior = state.behavior();

        if state.visibility == Visibility::Collapsed || self.tree.is_layout_suspended(node) {
            self.measure_queue.remove(&mut self.tree, node);
            if !is_close {
                let state = self.tree.get_mut(node)?;
                state.flags.measure_dirty = true;
                state.previous_constraint = available;
            }
            return Ok(self.tree.get(node)?.desired_size());
        }

        if !flags.measure_dirty && !flags.never_measured && is_close {
            self.measure_queue.remove(&mut self.tree, node);
            return Ok(self.tree.get(node)?.desired_size);
        }

        let previous_size = {
            let state = self.tree.get_mut(node)?;
            state.flags.never_measured = false;
            state.desired_size
        };

        // Ask for an arrange before measuring so children invalidated below
        // coalesce into this node's request.
        self.invalidate_arrange(node);
        self.tree.get_mut(node)?.flags.measure_in_progress = true;

        let entered = self.enter_measure();
        let result = entered.and_then(|()| {
            self.stats.measures += 1;
            behavior.measure_override(self, node, available)
        });

        if let Ok(state) = self.tree.get_mut(node) {
            state.flags.measure_in_progress = false;
            state.previous_constraint = available;
        }
        self.exit_measure();

        let desired = match result {
            Ok(desired) => desired,
            Err(err) => {
                if self.last_exception_node.is_none() {
                    self.last_exception_node = Some(node);
                }
                return Err(err);
            }
        };
        if desired.has_infinity() || desired.has_nan() {
            return Err(LayoutError::InvalidDesiredSize {
                id: node,
                size: desired,
            });
        }

        let (measure_during_arrange, parent) = {
            let state = self.tree.get_mut(node)?;
            state.flags.measure_dirty = false;
            state.desired_size = desired;
            (state.flags.measure_during_arrange, state.parent())
        };
        self.measure_queue.remove(&mut self.tree, node);

        if !measure_during_arrange && !previous_size.is_close(desired) {
            if let Some(parent) = parent {
                self.notify_desired_size_changed(parent, node);
            }
        }
        Ok(desired)
    }

    /// Arranges `node` into `final_rect`, measuring it first if needed.
    pub fn arrange(&mut self, node: NodeId, final_rect: Rect) -> Result<(), LayoutError> {
        let _processing = self.disable_processing();
        if !final_rect.is_arrangeable() {
            return Err(LayoutError::InvalidArrangeRect {
                id: node,
                rect: final_rect,
            });
        }

        let state = self.tree.get(node)?;
        if state.visibility == Visibility::Collapsed || self.tree.is_layout_suspended(node) {
            self.arrange_queue.remove(&mut self.tree, node);
            self.tree.get_mut(node)?.final_rect = final_rect;
            return Ok(());
        }

        let flags = state.flags;
        if flags.measure_dirty || flags.never_measured {
            let constraint = if flags.never_measured {
                final_rect.size()
            } else {
                state.previous_constraint
            };
            self.tree.get_mut(node)?.flags.measure_during_arrange = true;
            let measured = self.measure(node, constraint);
            if let Ok(state) = self.tree.get_mut(node) {
                state.flags.measure_during_arrange = false;
            }
            measured?;
        }

        let state = self.tree.get(node)?;
        let needs_arrange = state.flags.arrange_dirty
            || state.flags.never_arranged
            || !final_rect.is_close(state.final_rect);
        if !needs_arrange {
            self.arrange_queue.remove(&mut self.tree, node);
            return Ok(());
        }

        let behavior = state.behavior();
        let old_size = state.render_size;
        {
            let state = self.tree.get_mut(node)?;
            state.flags.never_arranged = false;
            state.flags.arrange_in_progress = true;
        }

        let entered = self.enter_arrange();
        let result = entered.and_then(|()| {
            self.stats.arranges += 1;
            behavior.arrange_override(self, node, final_rect.size())
        });

        if let Ok(state) = self.tree.get_mut(node) {
            state.flags.arrange_in_progress = false;
        }
        self.exit_arrange();

        let render_size = match result {
            Ok(size) => size,
            Err(err) => {
                if self.last_exception_node.is_none() {
                    self.last_exception_node = Some(node);
                }
                return Err(err);
            }
        };

        {
            let state = self.tree.get_mut(node)?;
            state.render_size = render_size;
            state.final_rect = final_rect;
            state.flags.arrange_dirty = false;
        }
        self.mark_for_size_changed(node, old_size, render_size);
        self.arrange_queue.remove(&mut self.tree, node);
        Ok(())
    }

    /// Measures and arranges a root at an explicit size. Infinite axes are
    /// sized to content. Post-layout events fire on the next update.
    pub fn layout_root(&mut self, root: NodeId, available: Size) -> Result<(), LayoutError> {
        if self.is_dead() {
            return Err(LayoutError::ContextShutDown);
        }
        self.request_update();
        let desired = self.measure(root, available)?;
        let width = if available.width.is_infinite() {
            desired.width
        } else {
            available.width
        };
        let height = if available.height.is_infinite() {
            desired.height
        } else {
            available.height
        };
        self.arrange(root, Rect::new(0.0, 0.0, width, height))
    }

    /// Rect used when the arrange queue hands out `node`: its previous rect,
    /// except that roots sit at the origin and take their desired size on
    /// axes they were measured "to content".
    pub(crate) fn proper_arrange_rect(&self, node: NodeId) -> Result<Rect, LayoutError> {
        let state = self.tree.get(node)?;
        let mut rect = state.final_rect;
        if state.parent().is_none() {
            rect.x = 0.0;
            rect.y = 0.0;
            if state.previous_constraint.width.is_infinite() {
                rect.width = state.desired_size.width;
            }
            if state.previous_constraint.height.is_infinite() {
                rect.height = state.desired_size.height;
            }
        }
        Ok(rect)
    }

    fn notify_desired_size_changed(&mut self, parent: NodeId, child: NodeId) {
        let Ok(state) = self.tree.get(parent) else {
            return;
        };
        if state.flags.measure_in_progress {
            return;
        }
        let behavior = state.behavior();
        behavior.on_child_desired_size_changed(self, parent, child);
    }

    fn mark_for_size_changed(&mut self, node: NodeId, old_size: Size, new_size: Size) {
        let width_changed = !crate::geometry::are_close(old_size.width, new_size.width);
        let height_changed = !crate::geometry::are_close(old_size.height, new_size.height);
        let Ok(state) = self.tree.get_mut(node) else {
            return;
        };
        if let Some(info) = state.size_changed.as_mut() {
            info.merge(width_changed, height_changed);
        } else if width_changed || height_changed {
            state.size_changed = Some(SizeChangedInfo {
                previous_size: old_size,
                new_size,
                width_changed,
                height_changed,
            });
            self.size_changed_chain.push(node);
        }
    }

    fn enter_measure(&mut self) -> Result<(), LayoutError> {
        self.last_exception_node = None;
        self.measures_on_stack += 1;
        self.fire_post_layout_events = true;
        if self.measures_on_stack > self.tuning.recursion_limit {
            return Err(LayoutError::RecursionLimit {
                phase: Phase::Measure,
                limit: self.tuning.recursion_limit,
            });
        }
        Ok(())
    }

    fn exit_measure(&mut self) {
        self.measures_on_stack -= 1;
    }

    fn enter_arrange(&mut self) -> Result<(), LayoutError> {
        self.last_exception_node = None;
        self.arranges_on_stack += 1;
        self.fire_post_layout_events = true;
        if self.arranges_on_stack > self.tuning.recursion_limit {
            return Err(LayoutError::RecursionLimit {
                phase: Phase::Arrange,
                limit: self.tuning.recursion_limit,
            });
        }
        Ok(())
    }

    fn exit_arrange(&mut self) {
        self.arranges_on_stack -= 1;
    }
}
