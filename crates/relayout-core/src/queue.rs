//! Pending-measure and pending-arrange queues.
//!
//! Each queue is an unordered doubly linked list of request tokens threaded
//! through an index arena. Tokens come from a fixed-size pocket; once the
//! pocket runs low the queue stops handing out tokens and instead dirties the
//! whole ancestor chain directly, queueing only the root. Recomputing an
//! ancestor revalidates its descendants, so the broader invalidation is always
//! safe and keeps queue memory bounded.

use crate::config::LayoutTuning;
use crate::tree::{LayoutTree, NodeId, Visibility};

/// Which pass a queue feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Measure,
    Arrange,
}

/// Index of a request token inside its queue's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u32);

/// Narrow view of the manager that a queue needs: "please run a layout pass
/// soon".
pub(crate) trait UpdateRequester {
    fn request_update(&mut self);
}

/// Outcome of [`InvalidationQueue::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// The node is no longer part of the tree.
    Missing,
    /// The node already holds a token for this queue.
    AlreadyQueued,
    /// The node sits in a layout-suspended subtree.
    Suspended,
    /// The parent is already dirty and will revalidate this node.
    Coalesced,
    /// The node received its own token.
    Queued,
    /// The pocket was exhausted; the ancestor chain was dirtied and its root
    /// queued instead.
    Escalated { root: NodeId },
}

#[derive(Default)]
struct Request {
    target: Option<NodeId>,
    next: Option<u32>,
    prev: Option<u32>,
}

pub struct InvalidationQueue {
    kind: QueueKind,
    requests: Vec<Request>,
    head: Option<u32>,
    /// Free list of pre-allocated tokens, linked through `next`.
    pocket: Option<u32>,
    pocket_size: usize,
    pocket_capacity: usize,
    pocket_reserve: usize,
    /// Tokens returned while the pocket was full. Reused before the arena
    /// grows, but not counted as pocket space.
    retired: Vec<u32>,
    len: usize,
}

impl InvalidationQueue {
    pub fn new(kind: QueueKind, tuning: &LayoutTuning) -> Self {
        let capacity = tuning.queue_pocket_capacity;
        let mut requests = Vec::with_capacity(capacity);
        let mut pocket = None;
        for index in 0..capacity as u32 {
            requests.push(Request {
                target: None,
                next: pocket,
                prev: None,
            });
            pocket = Some(index);
        }
        Self {
            kind,
            requests,
            head: None,
            pocket,
            pocket_size: capacity,
            pocket_capacity: capacity,
            pocket_reserve: tuning.queue_pocket_reserve,
            retired: Vec::new(),
            len: 0,
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of live tokens, including ones whose target has since left the
    /// tree and has not been pruned yet.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn pocket_size(&self) -> usize {
        self.pocket_size
    }

    pub fn contains(&self, tree: &LayoutTree, node: NodeId) -> bool {
        tree.get(node)
            .map(|n| n.request(self.kind).is_some())
            .unwrap_or(false)
    }

    /// Targets of all live tokens, head first.
    pub fn pending(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let request = &self.requests[index as usize];
            if let Some(target) = request.target {
                out.push(target);
            }
            cursor = request.next;
        }
        out
    }

    pub(crate) fn add(
        &mut self,
        tree: &mut LayoutTree,
        node: NodeId,
        requester: &mut dyn UpdateRequester,
    ) -> AddOutcome {
        let Ok(target) = tree.get(node) else {
            return AddOutcome::Missing;
        };
        if target.request(self.kind).is_some() {
            return AddOutcome::AlreadyQueued;
        }
        if tree.is_layout_suspended(node) {
            return AddOutcome::Suspended;
        }

        self.remove_orphans(tree, node);

        if let Some(parent) = tree.parent(node) {
            if self.can_rely_on_parent_recalc(tree, parent) {
                log::trace!("{:?} queue: {node} covered by dirty parent {parent}", self.kind);
                return AddOutcome::Coalesced;
            }
        }

        let outcome = if self.pocket_size > self.pocket_reserve {
            self.add_request(tree, node);
            AddOutcome::Queued
        } else {
            let root = self.escalate(tree, node);
            log::debug!(
                "{:?} queue: pocket exhausted at {node}, escalated to root {root}",
                self.kind
            );
            AddOutcome::Escalated { root }
        };

        requester.request_update();
        outcome
    }

    pub(crate) fn remove(&mut self, tree: &mut LayoutTree, node: NodeId) {
        let Ok(target) = tree.get_mut(node) else {
            return;
        };
        let Some(RequestId(index)) = target.request(self.kind) else {
            return;
        };
        target.set_request(self.kind, None);
        self.unlink(index);
    }

    /// Drops tokens held by direct children of `parent`; recomputing the
    /// parent revalidates them. Tokens whose target left the tree are
    /// dropped on the way.
    pub(crate) fn remove_orphans(&mut self, tree: &mut LayoutTree, parent: NodeId) {
        let Some(parent_level) = tree.tree_level(parent) else {
            return;
        };
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let request = &self.requests[index as usize];
            cursor = request.next;
            let Some(child) = request.target else {
                continue;
            };
            match tree.get_mut(child) {
                Ok(node)
                    if node.tree_level() == parent_level + 1 && node.parent() == Some(parent) =>
                {
                    node.set_request(self.kind, None);
                    self.unlink(index);
                }
                Ok(_) => {}
                Err(_) => self.unlink(index),
            }
        }
    }

    /// Returns the queued node closest to the root. Ancestors are therefore
    /// always recomputed before their descendants.
    pub(crate) fn top_most(&mut self, tree: &LayoutTree) -> Option<NodeId> {
        let mut found: Option<(NodeId, u32)> = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let request = &self.requests[index as usize];
            cursor = request.next;
            let Some(target) = request.target else {
                continue;
            };
            match tree.tree_level(target) {
                Some(level) => {
                    if found.map_or(true, |(_, best)| level < best) {
                        found = Some((target, level));
                    }
                }
                None => self.unlink(index),
            }
        }
        found.map(|(node, _)| node)
    }

    /// Forgets every token, e.g. when the owning context shuts down.
    pub(crate) fn clear(&mut self, tree: &mut LayoutTree) {
        while let Some(index) = self.head {
            if let Some(target) = self.requests[index as usize].target {
                if let Ok(node) = tree.get_mut(target) {
                    node.set_request(self.kind, None);
                }
            }
            self.unlink(index);
        }
    }

    fn can_rely_on_parent_recalc(&self, tree: &LayoutTree, parent: NodeId) -> bool {
        tree.get(parent)
            .map(|p| p.is_dirty(self.kind) && !p.in_progress(self.kind))
            .unwrap_or(false)
    }

    /// Dirties every node from `node` up to its root without taking tokens,
    /// then queues the root alone. Returns the queued root.
    fn escalate(&mut self, tree: &mut LayoutTree, node: NodeId) -> NodeId {
        let mut current = Some(node);
        let mut root = node;
        while let Some(e) = current {
            let parent = tree.parent(e);
            if let Ok(n) = tree.get_mut(e) {
                n.mark_dirty(self.kind);
            }
            let parent_visible = parent
                .and_then(|p| tree.get(p).ok())
                .map(|p| p.visibility() != Visibility::Collapsed)
                .unwrap_or(false);
            if parent_visible {
                self.remove(tree, e);
            } else if !self.contains(tree, e) {
                self.remove_orphans(tree, e);
                self.add_request(tree, e);
                root = e;
            } else {
                root = e;
            }
            current = parent;
        }
        root
    }

    fn add_request(&mut self, tree: &mut LayoutTree, node: NodeId) {
        let index = self.take_request(node);
        let old_head = self.head;
        {
            let request = &mut self.requests[index as usize];
            request.next = old_head;
            request.prev = None;
        }
        if let Some(head) = old_head {
            self.requests[head as usize].prev = Some(index);
        }
        self.head = Some(index);
        self.len += 1;
        if let Ok(target) = tree.get_mut(node) {
            target.set_request(self.kind, Some(RequestId(index)));
        }
        log::trace!("{:?} queue: queued {node} ({} pending)", self.kind, self.len);
    }

    fn take_request(&mut self, node: NodeId) -> u32 {
        let index = if let Some(index) = self.pocket {
            self.pocket = self.requests[index as usize].next;
            self.pocket_size -= 1;
            index
        } else if let Some(index) = self.retired.pop() {
            index
        } else {
            self.requests.push(Request::default());
            (self.requests.len() - 1) as u32
        };
        let request = &mut self.requests[index as usize];
        request.target = Some(node);
        request.next = None;
        request.prev = None;
        index
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let request = &self.requests[index as usize];
            (request.prev, request.next)
        };
        match prev {
            Some(prev) => self.requests[prev as usize].next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.requests[next as usize].prev = prev;
        }
        self.len -= 1;
        self.reuse_request(index);
    }

    fn reuse_request(&mut self, index: u32) {
        let pocket = self.pocket;
        let request = &mut self.requests[index as usize];
        request.target = None;
        request.prev = None;
        if self.pocket_size < self.pocket_capacity {
            request.next = pocket;
            self.pocket = Some(index);
            self.pocket_size += 1;
        } else {
            request.next = None;
            self.retired.push(index);
        }
    }
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
