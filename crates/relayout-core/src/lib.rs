#![doc = r"Layout invalidation queues and the fixed-point layout update loop."]

pub mod config;
pub mod diagnostics;
mod events;
pub mod geometry;
mod manager;
mod node;
pub mod platform;
pub mod queue;
pub mod registry;
pub mod subscribers;
pub mod tree;

pub use config::LayoutTuning;
pub use diagnostics::{EscapeReason, LayoutStats};
pub use events::{AutomationEventSource, LayoutUpdatedListener};
pub use geometry::{Point, Rect, Size};
pub use manager::{LayoutManager, ManagerState};
pub use node::{LayoutBehavior, SizeChangedInfo};
pub use platform::{Clock, DispatchPriority, LayoutScheduler, ProcessingDisabled};
pub use queue::{AddOutcome, InvalidationQueue, QueueKind};
pub use registry::{ContextId, ContextRegistry};
pub use subscribers::{Subscription, WeakSubscriberList};
pub use tree::{LayoutNode, LayoutTree, NodeFlags, NodeId, Visibility};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Measure,
    Arrange,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Measure => f.write_str("measure"),
            Phase::Arrange => f.write_str("arrange"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutError {
    Missing { id: NodeId },
    RecursionLimit { phase: Phase, limit: u32 },
    NanConstraint { id: NodeId },
    InvalidDesiredSize { id: NodeId, size: Size },
    InvalidArrangeRect { id: NodeId, rect: Rect },
    /// Raised by a node's own measure or arrange logic.
    Behavior { id: NodeId, message: String },
    InvalidTuning { reason: &'static str },
    InvalidReparent { parent: NodeId, child: NodeId },
    ContextShutDown,
}

impl LayoutError {
    pub fn behavior(id: NodeId, message: impl Into<String>) -> Self {
        LayoutError::Behavior {
            id,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::Missing { id } => write!(f, "node {id} missing"),
            LayoutError::RecursionLimit { phase, limit } => {
                write!(f, "{phase} recursion exceeded {limit} nested calls")
            }
            LayoutError::NanConstraint { id } => {
                write!(f, "node {id} measured with a NaN constraint")
            }
            LayoutError::InvalidDesiredSize { id, size } => write!(
                f,
                "node {id} reported invalid desired size {}x{}",
                size.width, size.height
            ),
            LayoutError::InvalidArrangeRect { id, rect } => write!(
                f,
                "node {id} arranged into invalid rect ({}, {}, {}x{})",
                rect.x, rect.y, rect.width, rect.height
            ),
            LayoutError::Behavior { id, message } => write!(f, "node {id} failed: {message}"),
            LayoutError::InvalidTuning { reason } => write!(f, "invalid layout tuning: {reason}"),
            LayoutError::InvalidReparent { parent, child } => {
                write!(f, "appending {child} under {parent} would create a cycle")
            }
            LayoutError::ContextShutDown => f.write_str("layout context has shut down"),
        }
    }
}

impl std::error::Error for LayoutError {}
