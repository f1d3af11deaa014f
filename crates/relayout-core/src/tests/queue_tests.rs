use super::*;
use crate::geometry::Size;
use crate::manager::LayoutManager;
use crate::node::LayoutBehavior;
use crate::LayoutError;
use std::rc::Rc;

struct Leaf;

impl LayoutBehavior for Leaf {
    fn measure_override(
        &self,
        _layout: &mut LayoutManager,
        _node: NodeId,
        _available: Size,
    ) -> Result<Size, LayoutError> {
        Ok(Size::ZERO)
    }

    fn arrange_override(
        &self,
        _layout: &mut LayoutManager,
        _node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        Ok(final_size)
    }
}

#[derive(Default)]
struct CountingRequester {
    requests: usize,
}

impl UpdateRequester for CountingRequester {
    fn request_update(&mut self) {
        self.requests += 1;
    }
}

/// Inserts a node that has been laid out once and is currently clean.
fn clean_node(tree: &mut LayoutTree, parent: Option<NodeId>) -> NodeId {
    let id = tree.insert(Rc::new(Leaf));
    if let Some(parent) = parent {
        tree.append_child(parent, id).unwrap();
    }
    let flags = &mut tree.get_mut(id).unwrap().flags;
    flags.measure_dirty = false;
    flags.arrange_dirty = false;
    flags.never_measured = false;
    flags.never_arranged = false;
    id
}

fn measure_queue(tuning: &LayoutTuning) -> InvalidationQueue {
    InvalidationQueue::new(QueueKind::Measure, tuning)
}

#[test]
fn adding_twice_keeps_a_single_token() {
    let mut tree = LayoutTree::new();
    let node = clean_node(&mut tree, None);
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    assert_eq!(queue.add(&mut tree, node, &mut requester), AddOutcome::Queued);
    assert_eq!(
        queue.add(&mut tree, node, &mut requester),
        AddOutcome::AlreadyQueued
    );

    assert_eq!(queue.len(), 1);
    assert!(queue.contains(&tree, node));
    assert_eq!(requester.requests, 1);
    assert_eq!(queue.pocket_size(), 152);
}

#[test]
fn dirty_parent_covers_child() {
    let mut tree = LayoutTree::new();
    let parent = clean_node(&mut tree, None);
    let child = clean_node(&mut tree, Some(parent));
    tree.get_mut(parent).unwrap().flags.measure_dirty = true;
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    assert_eq!(
        queue.add(&mut tree, child, &mut requester),
        AddOutcome::Coalesced
    );
    assert!(queue.is_empty());
    assert_eq!(requester.requests, 0);
}

#[test]
fn parent_in_progress_does_not_cover_child() {
    let mut tree = LayoutTree::new();
    let parent = clean_node(&mut tree, None);
    let child = clean_node(&mut tree, Some(parent));
    {
        let flags = &mut tree.get_mut(parent).unwrap().flags;
        flags.measure_dirty = true;
        flags.measure_in_progress = true;
    }
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    assert_eq!(queue.add(&mut tree, child, &mut requester), AddOutcome::Queued);
    assert_eq!(queue.pending(), vec![child]);
}

#[test]
fn queueing_a_parent_drops_direct_children_only() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let child = clean_node(&mut tree, Some(root));
    let sibling = clean_node(&mut tree, Some(root));
    let grandchild = clean_node(&mut tree, Some(sibling));
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    queue.add(&mut tree, child, &mut requester);
    queue.add(&mut tree, grandchild, &mut requester);
    assert_eq!(queue.len(), 2);

    queue.add(&mut tree, root, &mut requester);

    assert!(!queue.contains(&tree, child));
    assert!(queue.contains(&tree, grandchild));
    assert!(queue.contains(&tree, root));
    assert_eq!(queue.len(), 2);
}

#[test]
fn top_most_picks_shallowest_node() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let a = clean_node(&mut tree, Some(root));
    let b = clean_node(&mut tree, Some(a));
    let c = clean_node(&mut tree, Some(b));
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    queue.add(&mut tree, c, &mut requester);
    queue.add(&mut tree, a, &mut requester);

    assert_eq!(queue.top_most(&tree), Some(a));
    queue.remove(&mut tree, a);
    assert_eq!(queue.top_most(&tree), Some(c));
    queue.remove(&mut tree, c);
    assert_eq!(queue.top_most(&tree), None);
    assert_eq!(queue.pocket_size(), 153);
}

#[test]
fn tokens_of_removed_nodes_are_pruned() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let child = clean_node(&mut tree, Some(root));
    let other = clean_node(&mut tree, None);
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();
    queue.add(&mut tree, child, &mut requester);
    queue.add(&mut tree, other, &mut requester);

    tree.remove(child).unwrap();

    assert_eq!(queue.top_most(&tree), Some(other));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pending(), vec![other]);
}

#[test]
fn suspended_nodes_are_not_queued() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let child = clean_node(&mut tree, Some(root));
    tree.get_mut(root).unwrap().flags.layout_suspended = true;
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();

    assert_eq!(
        queue.add(&mut tree, child, &mut requester),
        AddOutcome::Suspended
    );
    assert!(queue.is_empty());
}

#[test]
fn exhausted_pocket_escalates_to_root() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let children: Vec<_> = (0..160).map(|_| clean_node(&mut tree, Some(root))).collect();
    let tuning = LayoutTuning::default();
    let mut queue = measure_queue(&tuning);
    let mut requester = CountingRequester::default();

    let outcomes: Vec<_> = children
        .iter()
        .map(|child| queue.add(&mut tree, *child, &mut requester))
        .collect();

    let granted = tuning.queue_pocket_capacity - tuning.queue_pocket_reserve;
    assert!(outcomes[..granted]
        .iter()
        .all(|outcome| *outcome == AddOutcome::Queued));
    assert_eq!(outcomes[granted], AddOutcome::Escalated { root });
    assert!(outcomes[granted + 1..]
        .iter()
        .all(|outcome| *outcome == AddOutcome::Coalesced));

    assert_eq!(queue.pending(), vec![root]);
    assert!(tree.get(root).unwrap().flags.measure_dirty);
    assert!(tree.get(children[granted]).unwrap().flags.measure_dirty);
    assert_eq!(queue.pocket_size(), tuning.queue_pocket_capacity - 1);
}

#[test]
fn escalation_stops_at_collapsed_parent() {
    let mut tree = LayoutTree::new();
    let root = clean_node(&mut tree, None);
    let collapsed = clean_node(&mut tree, Some(root));
    let a = clean_node(&mut tree, Some(collapsed));
    let b = clean_node(&mut tree, Some(collapsed));
    let c = clean_node(&mut tree, Some(collapsed));
    tree.get_mut(collapsed).unwrap().visibility = Visibility::Collapsed;
    let tuning = LayoutTuning::new().with_queue_pocket(3, 1);
    let mut queue = measure_queue(&tuning);
    let mut requester = CountingRequester::default();

    assert_eq!(queue.add(&mut tree, a, &mut requester), AddOutcome::Queued);
    assert_eq!(queue.add(&mut tree, b, &mut requester), AddOutcome::Queued);
    let outcome = queue.add(&mut tree, c, &mut requester);

    assert_eq!(outcome, AddOutcome::Escalated { root });
    assert!(queue.contains(&tree, c));
    assert!(queue.contains(&tree, root));
    assert!(tree.get(collapsed).unwrap().flags.measure_dirty);
}

#[test]
fn clear_forgets_every_token() {
    let mut tree = LayoutTree::new();
    let a = clean_node(&mut tree, None);
    let b = clean_node(&mut tree, None);
    let mut queue = measure_queue(&LayoutTuning::default());
    let mut requester = CountingRequester::default();
    queue.add(&mut tree, a, &mut requester);
    queue.add(&mut tree, b, &mut requester);

    queue.clear(&mut tree);

    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);
    assert!(!queue.contains(&tree, a));
    assert_eq!(queue.pocket_size(), 153);
}
