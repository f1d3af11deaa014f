//! Lookup of layout managers by owning context.
//!
//! Every UI thread context owns exactly one [`LayoutManager`]; hosts that run
//! several contexts keep them here and route scheduled callbacks by
//! [`ContextId`].

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::config::LayoutTuning;
use crate::manager::LayoutManager;
use crate::platform::{Clock, LayoutScheduler};
use crate::LayoutError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[derive(Default)]
pub struct ContextRegistry {
    managers: FxHashMap<ContextId, LayoutManager>,
    next_id: u32,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the manager for a new context.
    pub fn create(
        &mut self,
        scheduler: Rc<dyn LayoutScheduler>,
        clock: Rc<dyn Clock>,
        tuning: LayoutTuning,
    ) -> Result<ContextId, LayoutError> {
        let manager = LayoutManager::new(scheduler, clock, tuning)?;
        let id = ContextId(self.next_id);
        self.next_id += 1;
        self.managers.insert(id, manager);
        log::debug!("created layout context {id}");
        Ok(id)
    }

    /// The manager of a live context.
    pub fn get(&self, id: ContextId) -> Result<&LayoutManager, LayoutError> {
        self.managers.get(&id).ok_or(LayoutError::ContextShutDown)
    }

    pub fn get_mut(&mut self, id: ContextId) -> Result<&mut LayoutManager, LayoutError> {
        self.managers
            .get_mut(&id)
            .ok_or(LayoutError::ContextShutDown)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.managers.contains_key(&id)
    }

    /// Shuts the context's manager down and forgets it. Later lookups fail
    /// with [`LayoutError::ContextShutDown`].
    pub fn shutdown(&mut self, id: ContextId) -> bool {
        match self.managers.remove(&id) {
            Some(mut manager) => {
                manager.shutdown();
                log::debug!("layout context {id} shut down");
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.managers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
