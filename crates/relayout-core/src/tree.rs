//! Arena-backed node storage with parent links and maintained tree levels.
//!
//! Nodes are addressed by generation-checked [`NodeId`]s. Removing a node
//! bumps its slot generation, so handles held by queues, subscribers, or user
//! code quietly stop resolving instead of aliasing a newer node.

use crate::geometry::{Rect, Size};
use crate::node::{LayoutBehavior, SizeChangedInfo};
use crate::queue::{QueueKind, RequestId};
use crate::LayoutError;
use smallvec::SmallVec;
use std::fmt::{self, Write};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    /// Takes part in layout but is not drawn.
    Hidden,
    /// Skipped by measure and arrange; reports a zero desired size.
    Collapsed,
}

/// Per-node layout state bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeFlags {
    pub measure_dirty: bool,
    pub arrange_dirty: bool,
    pub measure_in_progress: bool,
    pub arrange_in_progress: bool,
    pub never_measured: bool,
    pub never_arranged: bool,
    pub measure_during_arrange: bool,
    pub layout_suspended: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            measure_dirty: true,
            arrange_dirty: true,
            measure_in_progress: false,
            arrange_in_progress: false,
            never_measured: true,
            never_arranged: true,
            measure_during_arrange: false,
            layout_suspended: false,
        }
    }
}

pub struct LayoutNode {
    behavior: Rc<dyn LayoutBehavior>,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    tree_level: u32,
    pub(crate) visibility: Visibility,
    pub(crate) flags: NodeFlags,
    pub(crate) desired_size: Size,
    pub(crate) render_size: Size,
    pub(crate) previous_constraint: Size,
    pub(crate) final_rect: Rect,
    pub(crate) measure_request: Option<RequestId>,
    pub(crate) arrange_request: Option<RequestId>,
    pub(crate) size_changed: Option<SizeChangedInfo>,
}

impl LayoutNode {
    fn new(behavior: Rc<dyn LayoutBehavior>) -> Self {
        Self {
            behavior,
            parent: None,
            children: SmallVec::new(),
            tree_level: 0,
            visibility: Visibility::Visible,
            flags: NodeFlags::default(),
            desired_size: Size::ZERO,
            render_size: Size::ZERO,
            previous_constraint: Size::ZERO,
            final_rect: Rect::default(),
            measure_request: None,
            arrange_request: None,
            size_changed: None,
        }
    }

    pub fn behavior(&self) -> Rc<dyn LayoutBehavior> {
        Rc::clone(&self.behavior)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Depth from the root of the tree this node belongs to.
    pub fn tree_level(&self) -> u32 {
        self.tree_level
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Size requested during the last measure. Collapsed nodes always
    /// report zero.
    pub fn desired_size(&self) -> Size {
        if self.visibility == Visibility::Collapsed {
            Size::ZERO
        } else {
            self.desired_size
        }
    }

    /// Size chosen by the last arrange.
    pub fn render_size(&self) -> Size {
        self.render_size
    }

    pub fn previous_constraint(&self) -> Size {
        self.previous_constraint
    }

    pub fn final_rect(&self) -> Rect {
        self.final_rect
    }

    pub fn is_measure_valid(&self) -> bool {
        !self.flags.measure_dirty
    }

    pub fn is_arrange_valid(&self) -> bool {
        !self.flags.arrange_dirty
    }

    pub(crate) fn request(&self, kind: QueueKind) -> Option<RequestId> {
        match kind {
            QueueKind::Measure => self.measure_request,
            QueueKind::Arrange => self.arrange_request,
        }
    }

    pub(crate) fn set_request(&mut self, kind: QueueKind, request: Option<RequestId>) {
        match kind {
            QueueKind::Measure => self.measure_request = request,
            QueueKind::Arrange => self.arrange_request = request,
        }
    }

    pub(crate) fn is_dirty(&self, kind: QueueKind) -> bool {
        match kind {
            QueueKind::Measure => self.flags.measure_dirty,
            QueueKind::Arrange => self.flags.arrange_dirty,
        }
    }

    pub(crate) fn in_progress(&self, kind: QueueKind) -> bool {
        match kind {
            QueueKind::Measure => self.flags.measure_in_progress,
            QueueKind::Arrange => self.flags.arrange_in_progress,
        }
    }

    pub(crate) fn mark_dirty(&mut self, kind: QueueKind) {
        match kind {
            QueueKind::Measure => self.flags.measure_dirty = true,
            QueueKind::Arrange => self.flags.arrange_dirty = true,
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<LayoutNode>,
}

/// Owning storage for the nodes of one layout context.
#[derive(Default)]
pub struct LayoutTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl LayoutTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached node. It becomes a root until appended somewhere.
    pub fn insert(&mut self, behavior: Rc<dyn LayoutBehavior>) -> NodeId {
        self.len += 1;
        let node = LayoutNode::new(behavior);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: NodeId) -> Result<&LayoutNode, LayoutError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(LayoutError::Missing { id })
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut LayoutNode, LayoutError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(LayoutError::Missing { id })
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).ok().and_then(LayoutNode::parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(LayoutNode::children).unwrap_or(&[])
    }

    pub fn tree_level(&self, id: NodeId) -> Option<u32> {
        self.get(id).ok().map(LayoutNode::tree_level)
    }

    /// Walks parent links up to the topmost node.
    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        Some(current)
    }

    /// Iterates the strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        self.ancestors(of).any(|id| id == ancestor)
    }

    /// True when `id` or one of its ancestors has layout suspended.
    pub fn is_layout_suspended(&self, id: NodeId) -> bool {
        let suspended = |node: NodeId| {
            self.get(node)
                .map(|n| n.flags.layout_suspended)
                .unwrap_or(false)
        };
        suspended(id) || self.ancestors(id).any(suspended)
    }

    /// Returns `id` and all of its descendants in pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Moves `child` (and its subtree) under `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), LayoutError> {
        let parent_level = self.get(parent)?.tree_level;
        self.get(child)?;
        if parent == child || self.is_ancestor(child, parent) {
            return Err(LayoutError::InvalidReparent { parent, child });
        }
        self.detach(child)?;
        self.get_mut(parent)?.children.push(child);
        self.get_mut(child)?.parent = Some(parent);
        self.set_subtree_level(child, parent_level + 1);
        Ok(())
    }

    /// Unlinks `child` from its parent, making it a root. Returns the former
    /// parent.
    pub fn detach(&mut self, child: NodeId) -> Result<Option<NodeId>, LayoutError> {
        let Some(parent) = self.get(child)?.parent else {
            return Ok(None);
        };
        if let Ok(parent_node) = self.get_mut(parent) {
            parent_node.children.retain(|id| *id != child);
        }
        self.get_mut(child)?.parent = None;
        self.set_subtree_level(child, 0);
        Ok(Some(parent))
    }

    /// Detaches and frees `id` together with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), LayoutError> {
        self.detach(id)?;
        for node in self.subtree(id) {
            let slot = &mut self.slots[node.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
            self.len -= 1;
        }
        Ok(())
    }

    fn set_subtree_level(&mut self, root: NodeId, level: u32) {
        let mut stack = vec![(root, level)];
        while let Some((id, level)) = stack.pop() {
            if let Ok(node) = self.get_mut(id) {
                node.tree_level = level;
                stack.extend(node.children.iter().map(|child| (*child, level + 1)));
            }
        }
    }

    /// Renders the subtree under `root` as indented text for debugging.
    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        match root {
            Some(root) => self.dump_node(&mut output, root, 0),
            None => output.push_str("(no root)\n"),
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Ok(node) = self.get(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        let flags = node.flags;
        let _ = writeln!(
            output,
            "{indent}[{id}] {} level={} desired={:.1}x{:.1} rect=({:.1}, {:.1}, {:.1}x{:.1}){}{}",
            node.behavior.name(),
            node.tree_level,
            node.desired_size.width,
            node.desired_size.height,
            node.final_rect.x,
            node.final_rect.y,
            node.final_rect.width,
            node.final_rect.height,
            if flags.measure_dirty { " measure-dirty" } else { "" },
            if flags.arrange_dirty { " arrange-dirty" } else { "" },
        );
        for child in node.children.iter() {
            self.dump_node(output, *child, depth + 1);
        }
    }
}

pub struct Ancestors<'a> {
    tree: &'a LayoutTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tests;
