use std::cell::{Cell, RefCell};
use std::rc::Rc;

use relayout_core::{
    AutomationEventSource, LayoutBehavior, LayoutError, LayoutManager, LayoutUpdatedListener,
    ManagerState, NodeId, Rect, Size, SizeChangedInfo,
};
use relayout_testing::{EventLog, FixedSize, LayoutTestRule, Recording, VerticalStack};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Leaf that resizes another leaf the first time its own render size changes.
struct ResizeSibling {
    inner: Rc<FixedSize>,
    sibling: Cell<Option<NodeId>>,
    sibling_behavior: Rc<FixedSize>,
    seen: RefCell<Vec<SizeChangedInfo>>,
}

impl LayoutBehavior for ResizeSibling {
    fn measure_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        available: Size,
    ) -> Result<Size, LayoutError> {
        self.inner.measure_override(layout, node, available)
    }

    fn arrange_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        self.inner.arrange_override(layout, node, final_size)
    }

    fn on_render_size_changed(
        &self,
        layout: &mut LayoutManager,
        _node: NodeId,
        info: &SizeChangedInfo,
    ) {
        self.seen.borrow_mut().push(*info);
        if let Some(sibling) = self.sibling.take() {
            self.sibling_behavior.set_size(10.0, 50.0);
            layout.invalidate_measure(sibling);
        }
    }
}

#[test]
fn ancestor_is_measured_before_descendant() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let log = EventLog::new();
    let leaf = FixedSize::new(10.0, 10.0);

    let root = rule.add_node(Recording::new("root", VerticalStack::new(), &log));
    let p = rule
        .add_child(root, Recording::new("P", VerticalStack::new(), &log))
        .unwrap();
    let x = rule
        .add_child(p, Recording::new("X", leaf.clone(), &log))
        .unwrap();
    assert_eq!(rule.layout().tree().tree_level(p), Some(1));
    assert_eq!(rule.layout().tree().tree_level(x), Some(2));

    rule.layout_mut()
        .layout_root(root, Size::new(100.0, f32::INFINITY))
        .unwrap();
    rule.pump_until_idle().unwrap();
    log.take();

    leaf.set_size(10.0, 25.0);
    rule.layout_mut().invalidate_measure(x);
    rule.layout_mut().invalidate_measure(p);
    assert_eq!(rule.layout().measure_queue().pending(), vec![p]);

    rule.pump_until_idle().unwrap();

    let measured_p = log.position("measure:P").expect("P measured");
    let measured_x = log.position("measure:X").expect("X measured");
    assert!(measured_p < measured_x);
    assert_eq!(log.count("measure:X"), 1);

    let layout = rule.layout();
    assert!(!layout.measure_queue().contains(layout.tree(), p));
    assert!(!layout.measure_queue().contains(layout.tree(), x));
    assert!(layout.measure_queue().is_empty());
    assert!(layout.arrange_queue().is_empty());
    assert_eq!(
        layout.node(root).unwrap().final_rect(),
        Rect::new(0.0, 0.0, 100.0, 25.0)
    );
}

#[test]
fn invalidating_under_a_dirty_parent_coalesces() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let root = rule.add_node(VerticalStack::new());
    let child = rule.add_child(root, FixedSize::new(5.0, 5.0)).unwrap();
    rule.layout_mut()
        .layout_root(root, Size::new(50.0, 50.0))
        .unwrap();
    rule.pump_until_idle().unwrap();

    rule.layout_mut().invalidate_measure(root);
    rule.layout_mut().invalidate_measure(child);
    rule.layout_mut().invalidate_measure(child);

    assert_eq!(rule.layout().measure_queue().pending(), vec![root]);
    assert_eq!(rule.scheduler().pending(), 1);
    assert_eq!(rule.layout().state(), ManagerState::Scheduled);
}

#[test]
fn stages_run_in_order_after_layout_settles() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let log = EventLog::new();
    let root = rule.add_node(Recording::new("root", FixedSize::new(10.0, 10.0), &log));

    let updated: Rc<dyn LayoutUpdatedListener> = {
        let log = log.clone();
        Rc::new(move |_: &mut LayoutManager| log.push("updated"))
    };
    let automation: Rc<dyn AutomationEventSource> = {
        let log = log.clone();
        Rc::new(move |_: &mut LayoutManager| log.push("automation"))
    };
    rule.layout_mut().add_layout_updated_listener(&updated);
    rule.layout_mut().add_automation_event_source(&automation);

    rule.layout_mut()
        .layout_root(root, Size::new(40.0, 30.0))
        .unwrap();
    rule.pump_until_idle().unwrap();

    assert_eq!(
        log.snapshot(),
        vec![
            "measure:root",
            "arrange:root",
            "size:root",
            "updated",
            "automation"
        ]
    );
}

#[test]
fn size_changed_handler_dirtying_is_resolved_before_listeners_run() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let root = rule.add_node(VerticalStack::new());
    let sibling_behavior = FixedSize::new(10.0, 10.0);
    let resizer = Rc::new(ResizeSibling {
        inner: FixedSize::new(10.0, 10.0),
        sibling: Cell::new(None),
        sibling_behavior: sibling_behavior.clone(),
        seen: RefCell::new(Vec::new()),
    });
    rule.add_child(root, resizer.clone()).unwrap();
    let sibling = rule.add_child(root, sibling_behavior.clone()).unwrap();
    resizer.sibling.set(Some(sibling));

    let observed = Rc::new(RefCell::new(Vec::new()));
    let listener: Rc<dyn LayoutUpdatedListener> = {
        let observed = observed.clone();
        Rc::new(move |layout: &mut LayoutManager| {
            observed
                .borrow_mut()
                .push((layout.has_dirtiness(), layout.desired_size(sibling).ok()));
        })
    };
    rule.layout_mut().add_layout_updated_listener(&listener);

    rule.layout_mut()
        .layout_root(root, Size::new(100.0, f32::INFINITY))
        .unwrap();
    rule.pump_until_idle().unwrap();

    assert_eq!(
        observed.borrow().as_slice(),
        &[(false, Some(Size::new(10.0, 50.0)))]
    );
    assert_eq!(sibling_behavior.measures(), 2);
    assert_eq!(
        rule.layout().node(root).unwrap().final_rect(),
        Rect::new(0.0, 0.0, 100.0, 60.0)
    );

    let seen = resizer.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].previous_size, Size::ZERO);
    assert_eq!(seen[0].new_size, Size::new(100.0, 10.0));
    assert!(seen[0].width_changed && seen[0].height_changed);
}

#[test]
fn update_layout_is_a_no_op_while_running() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let root = rule.add_node(FixedSize::new(10.0, 10.0));
    let nested = Rc::new(Cell::new(None));
    let listener: Rc<dyn LayoutUpdatedListener> = {
        let nested = nested.clone();
        Rc::new(move |layout: &mut LayoutManager| {
            let passes = layout.stats().update_passes;
            let result = layout.update_layout();
            nested.set(Some((result.is_ok(), layout.stats().update_passes == passes)));
        })
    };
    rule.layout_mut().add_layout_updated_listener(&listener);
    rule.layout_mut()
        .layout_root(root, Size::new(10.0, 10.0))
        .unwrap();

    rule.pump_until_idle().unwrap();

    assert_eq!(nested.get(), Some((true, true)));
    assert_eq!(rule.scheduler().disabled_depth(), 0);
}

#[test]
fn arrange_measures_nodes_that_were_never_measured() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let leaf = FixedSize::new(7.0, 3.0);
    let node = rule.add_node(leaf.clone());

    rule.layout_mut()
        .arrange(node, Rect::new(2.0, 4.0, 20.0, 10.0))
        .unwrap();

    let state = rule.layout().node(node).unwrap();
    assert_eq!(leaf.measures(), 1);
    assert_eq!(state.previous_constraint(), Size::new(20.0, 10.0));
    assert_eq!(state.desired_size(), Size::new(7.0, 3.0));
    assert_eq!(state.render_size(), Size::new(20.0, 10.0));
    assert!(state.is_measure_valid() && state.is_arrange_valid());
}

#[test]
fn clean_nodes_at_the_same_constraint_are_not_remeasured() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let leaf = FixedSize::new(7.0, 3.0);
    let node = rule.add_node(leaf.clone());

    let first = rule.layout_mut().measure(node, Size::new(20.0, 20.0)).unwrap();
    let second = rule.layout_mut().measure(node, Size::new(20.0, 20.0)).unwrap();
    let third = rule.layout_mut().measure(node, Size::new(30.0, 20.0)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(leaf.measures(), 2);
}

#[test]
fn invalid_inputs_are_reported() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let node = rule.add_node(FixedSize::new(1.0, 1.0));
    let infinite = rule.add_node(FixedSize::new(f32::INFINITY, 1.0));

    assert_eq!(
        rule.layout_mut().measure(node, Size::new(f32::NAN, 1.0)),
        Err(LayoutError::NanConstraint { id: node })
    );
    assert!(matches!(
        rule.layout_mut().arrange(node, Rect::new(0.0, 0.0, f32::INFINITY, 1.0)),
        Err(LayoutError::InvalidArrangeRect { .. })
    ));
    assert!(matches!(
        rule.layout_mut().measure(infinite, Size::INFINITE),
        Err(LayoutError::InvalidDesiredSize { .. })
    ));
}
