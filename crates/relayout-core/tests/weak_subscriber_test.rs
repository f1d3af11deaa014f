use std::cell::{Cell, RefCell};
use std::rc::Rc;

use relayout_core::{AutomationEventSource, LayoutManager, LayoutUpdatedListener, Size, Subscription};
use relayout_testing::{EventLog, FixedSize, LayoutTestRule};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn settled_rule() -> LayoutTestRule {
    let mut rule = LayoutTestRule::new();
    let root = rule.add_node(FixedSize::new(10.0, 10.0));
    rule.layout_mut()
        .layout_root(root, Size::new(10.0, 10.0))
        .unwrap();
    rule
}

fn logging_listener(log: &EventLog, name: &'static str) -> Rc<dyn LayoutUpdatedListener> {
    let log = log.clone();
    Rc::new(move |_: &mut LayoutManager| log.push(name))
}

#[test]
fn dropped_listener_is_pruned_without_being_called() {
    init_logging();
    let mut rule = settled_rule();
    let log = EventLog::new();
    let kept = logging_listener(&log, "kept");
    let dropped = logging_listener(&log, "dropped");
    rule.layout_mut().add_layout_updated_listener(&kept);
    rule.layout_mut().add_layout_updated_listener(&dropped);
    drop(dropped);

    rule.pump_until_idle().unwrap();

    assert_eq!(log.snapshot(), vec!["kept"]);
    assert_eq!(rule.layout().layout_updated_listener_count(), 1);
    assert_eq!(rule.layout().stats().pruned_subscribers, 1);
}

#[test]
fn listener_removed_during_firing_is_not_called() {
    init_logging();
    let mut rule = settled_rule();
    let log = EventLog::new();
    let victim = logging_listener(&log, "victim");
    let victim_sub = rule.layout_mut().add_layout_updated_listener(&victim);

    let removed: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));
    let remover: Rc<dyn LayoutUpdatedListener> = {
        let log = log.clone();
        let removed = removed.clone();
        Rc::new(move |layout: &mut LayoutManager| {
            log.push("remover");
            removed.set(Some(layout.remove_layout_updated_listener(victim_sub)));
        })
    };
    // Added last, so it fires first.
    rule.layout_mut().add_layout_updated_listener(&remover);

    rule.pump_until_idle().unwrap();

    assert_eq!(log.snapshot(), vec!["remover"]);
    assert_eq!(removed.get(), Some(true));
    assert!(!rule.layout_mut().remove_layout_updated_listener(victim_sub));
}

#[test]
fn listener_collected_during_firing_is_not_called() {
    init_logging();
    let mut rule = settled_rule();
    let log = EventLog::new();
    let holder: Rc<RefCell<Option<Rc<dyn LayoutUpdatedListener>>>> =
        Rc::new(RefCell::new(Some(logging_listener(&log, "collected"))));
    if let Some(listener) = holder.borrow().as_ref() {
        rule.layout_mut().add_layout_updated_listener(listener);
    }

    let dropper: Rc<dyn LayoutUpdatedListener> = {
        let holder = holder.clone();
        let log = log.clone();
        Rc::new(move |_: &mut LayoutManager| {
            log.push("dropper");
            holder.borrow_mut().take();
        })
    };
    rule.layout_mut().add_layout_updated_listener(&dropper);

    rule.pump_until_idle().unwrap();

    assert_eq!(log.snapshot(), vec!["dropper"]);
    assert_eq!(rule.layout().layout_updated_listener_count(), 1);
}

#[test]
fn automation_source_requests_an_update_and_fires_after_listeners() {
    init_logging();
    let mut rule = LayoutTestRule::new();
    let log = EventLog::new();
    let listener = logging_listener(&log, "updated");
    rule.layout_mut().add_layout_updated_listener(&listener);
    assert!(!rule.scheduler().has_pending());

    let source: Rc<dyn AutomationEventSource> = {
        let log = log.clone();
        Rc::new(move |_: &mut LayoutManager| log.push("automation"))
    };
    let subscription: Subscription = rule.layout_mut().add_automation_event_source(&source);
    assert!(rule.scheduler().has_pending());

    rule.pump_until_idle().unwrap();
    assert_eq!(log.take(), vec!["updated", "automation"]);

    assert!(rule.layout_mut().remove_automation_event_source(subscription));
    assert_eq!(rule.layout().automation_event_source_count(), 0);
}
