//! Post-layout notifications: size-changed, layout-updated, and automation.
//!
//! All three stages run after measure and arrange have drained, and each
//! stops as soon as a handler dirties layout again so the update loop can
//! re-run its passes before anyone else observes the tree.

use std::rc::Rc;

use crate::manager::LayoutManager;
use crate::subscribers::Subscription;

/// Observer notified once per settled update.
pub trait LayoutUpdatedListener {
    fn on_layout_updated(&self, layout: &mut LayoutManager);
}

impl<F> LayoutUpdatedListener for F
where
    F: Fn(&mut LayoutManager),
{
    fn on_layout_updated(&self, layout: &mut LayoutManager) {
        self(layout)
    }
}

/// Accessibility peer that raises its events after layout settles.
pub trait AutomationEventSource {
    fn fire_automation_events(&self, layout: &mut LayoutManager);
}

impl<F> AutomationEventSource for F
where
    F: Fn(&mut LayoutManager),
{
    fn fire_automation_events(&self, layout: &mut LayoutManager) {
        self(layout)
    }
}

impl LayoutManager {
    /// Registers a weakly held layout-updated listener. Dropping the last
    /// strong reference unsubscribes it on the next firing.
    pub fn add_layout_updated_listener(
        &mut self,
        listener: &Rc<dyn LayoutUpdatedListener>,
    ) -> Subscription {
        self.layout_updated.add(listener)
    }

    /// Returns `false` when the subscription was already gone.
    pub fn remove_layout_updated_listener(&mut self, subscription: Subscription) -> bool {
        self.layout_updated.remove(subscription)
    }

    pub fn layout_updated_listener_count(&self) -> usize {
        self.layout_updated.len()
    }

    /// Registers a weakly held automation source and asks for an update so
    /// it gets a chance to fire.
    pub fn add_automation_event_source(
        &mut self,
        source: &Rc<dyn AutomationEventSource>,
    ) -> Subscription {
        let subscription = self.automation.add(source);
        self.fire_post_layout_events = true;
        self.request_update();
        subscription
    }

    pub fn remove_automation_event_source(&mut self, subscription: Subscription) -> bool {
        self.automation.remove(subscription)
    }

    pub fn automation_event_source_count(&self) -> usize {
        self.automation.len()
    }

    /// Drains the size-changed chain, newest first.
    pub(crate) fn fire_size_changed_events(&mut self) {
        while let Some(node) = self.size_changed_chain.pop() {
            let Ok(state) = self.tree.get_mut(node) else {
                continue;
            };
            let Some(mut info) = state.size_changed.take() else {
                continue;
            };
            info.new_size = state.render_size;
            let behavior = state.behavior();
            self.stats.size_changed_fired += 1;
            behavior.on_render_size_changed(self, node, &info);
            if self.has_dirtiness() {
                break;
            }
        }
    }

    pub(crate) fn fire_layout_updated_event(&mut self) {
        if self.in_fire_layout_updated {
            return;
        }
        self.in_fire_layout_updated = true;
        let _processing = self.disable_processing();
        for subscription in self.layout_updated.copy_to_array() {
            match self.layout_updated.target(subscription) {
                Some(listener) => {
                    listener.on_layout_updated(self);
                    if self.has_dirtiness() {
                        break;
                    }
                }
                None => {
                    if self.layout_updated.remove(subscription) {
                        self.stats.pruned_subscribers += 1;
                    }
                }
            }
        }
        self.in_fire_layout_updated = false;
    }

    pub(crate) fn fire_automation_events(&mut self) {
        if self.in_fire_automation {
            return;
        }
        self.in_fire_automation = true;
        let _processing = self.disable_processing();
        for subscription in self.automation.copy_to_array() {
            match self.automation.target(subscription) {
                Some(source) => {
                    source.fire_automation_events(self);
                    if self.has_dirtiness() {
                        break;
                    }
                }
                None => {
                    if self.automation.remove(subscription) {
                        self.stats.pruned_subscribers += 1;
                    }
                }
            }
        }
        self.in_fire_automation = false;
    }
}
