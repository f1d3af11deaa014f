//! Testing utilities and harness for relayout

pub mod behaviors;
pub mod testing;

pub use behaviors::*;
pub use testing::*;

pub mod prelude {
    pub use crate::behaviors::*;
    pub use crate::testing::*;
    pub use relayout_core::{
        DispatchPriority, LayoutBehavior, LayoutError, LayoutManager, LayoutTuning, NodeId,
        Rect, Size, Visibility,
    };
}
