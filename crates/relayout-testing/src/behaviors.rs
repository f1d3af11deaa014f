//! Small layout behaviors for driving the manager in tests.

use relayout_core::{
    LayoutBehavior, LayoutError, LayoutManager, NodeId, Rect, Size, SizeChangedInfo,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared, ordered record of layout callbacks.
#[derive(Clone, Debug, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Returns the recorded events and clears the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }
}

/// Leaf that always wants a fixed size, changeable between passes.
#[derive(Debug)]
pub struct FixedSize {
    size: Cell<Size>,
    measures: Cell<u32>,
    arranges: Cell<u32>,
}

impl FixedSize {
    pub fn new(width: f32, height: f32) -> Rc<Self> {
        Rc::new(Self {
            size: Cell::new(Size::new(width, height)),
            measures: Cell::new(0),
            arranges: Cell::new(0),
        })
    }

    /// Changes the size reported by the next measure. The caller still has
    /// to invalidate the node.
    pub fn set_size(&self, width: f32, height: f32) {
        self.size.set(Size::new(width, height));
    }

    pub fn measures(&self) -> u32 {
        self.measures.get()
    }

    pub fn arranges(&self) -> u32 {
        self.arranges.get()
    }
}

impl LayoutBehavior for FixedSize {
    fn measure_override(
        &self,
        _layout: &mut LayoutManager,
        _node: NodeId,
        _available: Size,
    ) -> Result<Size, LayoutError> {
        self.measures.set(self.measures.get() + 1);
        Ok(self.size.get())
    }

    fn arrange_override(
        &self,
        _layout: &mut LayoutManager,
        _node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        self.arranges.set(self.arranges.get() + 1);
        Ok(final_size)
    }

    fn name(&self) -> &str {
        "FixedSize"
    }
}

/// Stacks children top to bottom, each given the full width.
#[derive(Debug, Default)]
pub struct VerticalStack;

impl VerticalStack {
    pub fn new() -> Rc<Self> {
        Rc::new(Self)
    }
}

impl LayoutBehavior for VerticalStack {
    fn measure_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        available: Size,
    ) -> Result<Size, LayoutError> {
        let children = layout.tree().children(node).to_vec();
        let mut desired = Size::ZERO;
        for child in children {
            let size = layout.measure(child, Size::new(available.width, f32::INFINITY))?;
            desired.width = desired.width.max(size.width);
            desired.height += size.height;
        }
        Ok(desired)
    }

    fn arrange_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        let children = layout.tree().children(node).to_vec();
        let mut y = 0.0;
        for child in children {
            let height = layout.desired_size(child)?.height;
            layout.arrange(child, Rect::new(0.0, y, final_size.width, height))?;
            y += height;
        }
        Ok(final_size)
    }

    fn name(&self) -> &str {
        "VerticalStack"
    }
}

/// Wraps another behavior and logs `measure:<label>`, `arrange:<label>`,
/// and `size:<label>` as the manager calls it.
pub struct Recording {
    label: String,
    inner: Rc<dyn LayoutBehavior>,
    log: EventLog,
}

impl Recording {
    pub fn new(
        label: impl Into<String>,
        inner: Rc<dyn LayoutBehavior>,
        log: &EventLog,
    ) -> Rc<Self> {
        Rc::new(Self {
            label: label.into(),
            inner,
            log: log.clone(),
        })
    }
}

impl LayoutBehavior for Recording {
    fn measure_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        available: Size,
    ) -> Result<Size, LayoutError> {
        self.log.push(format!("measure:{}", self.label));
        self.inner.measure_override(layout, node, available)
    }

    fn arrange_override(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        self.log.push(format!("arrange:{}", self.label));
        self.inner.arrange_override(layout, node, final_size)
    }

    fn on_child_desired_size_changed(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        child: NodeId,
    ) {
        self.inner.on_child_desired_size_changed(layout, node, child);
    }

    fn on_render_size_changed(
        &self,
        layout: &mut LayoutManager,
        node: NodeId,
        info: &SizeChangedInfo,
    ) {
        self.log.push(format!("size:{}", self.label));
        self.inner.on_render_size_changed(layout, node, info);
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Leaf whose measure or arrange fails while armed.
#[derive(Debug)]
pub struct Faulty {
    size: Size,
    fail_measure: Cell<bool>,
    fail_arrange: Cell<bool>,
}

impl Faulty {
    pub fn new(width: f32, height: f32) -> Rc<Self> {
        Rc::new(Self {
            size: Size::new(width, height),
            fail_measure: Cell::new(false),
            fail_arrange: Cell::new(false),
        })
    }

    pub fn fail_measure(&self, fail: bool) {
        self.fail_measure.set(fail);
    }

    pub fn fail_arrange(&self, fail: bool) {
        self.fail_arrange.set(fail);
    }
}

impl LayoutBehavior for Faulty {
    fn measure_override(
        &self,
        _layout: &mut LayoutManager,
        node: NodeId,
        _available: Size,
    ) -> Result<Size, LayoutError> {
        if self.fail_measure.get() {
            return Err(LayoutError::behavior(node, "measure failed"));
        }
        Ok(self.size)
    }

    fn arrange_override(
        &self,
        _layout: &mut LayoutManager,
        node: NodeId,
        final_size: Size,
    ) -> Result<Size, LayoutError> {
        if self.fail_arrange.get() {
            return Err(LayoutError::behavior(node, "arrange failed"));
        }
        Ok(final_size)
    }

    fn name(&self) -> &str {
        "Faulty"
    }
}
