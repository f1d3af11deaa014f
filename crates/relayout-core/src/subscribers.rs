//! Weak subscriber list for post-layout notifications.
//!
//! Subscribers are held through [`Weak`] handles, so registering never keeps a
//! listener alive. Entries live in an index arena threaded as a doubly linked
//! list; freed entries go back to a bounded pocket for reuse. Handles carry a
//! generation, so removing through a stale [`Subscription`] after its entry
//! was recycled is a harmless no-op.

use std::fmt;
use std::rc::{Rc, Weak};

/// Handle returned by [`WeakSubscriberList::add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    index: u32,
    generation: u32,
}

struct Entry<T: ?Sized> {
    target: Option<Weak<T>>,
    next: Option<u32>,
    prev: Option<u32>,
    in_use: bool,
    generation: u32,
}

impl<T: ?Sized> Entry<T> {
    fn vacant() -> Self {
        Self {
            target: None,
            next: None,
            prev: None,
            in_use: false,
            generation: 0,
        }
    }
}

pub struct WeakSubscriberList<T: ?Sized> {
    entries: Vec<Entry<T>>,
    head: Option<u32>,
    pocket: Option<u32>,
    pocket_size: usize,
    pocket_capacity: usize,
    /// Entries freed while the pocket was full.
    spare: Vec<u32>,
    count: usize,
}

impl<T: ?Sized> fmt::Debug for WeakSubscriberList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSubscriberList")
            .field("count", &self.count)
            .field("pocket_size", &self.pocket_size)
            .finish()
    }
}

impl<T: ?Sized> WeakSubscriberList<T> {
    pub fn new(pocket_capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            head: None,
            pocket: None,
            pocket_size: 0,
            pocket_capacity,
            spare: Vec::new(),
            count: 0,
        }
    }

    /// Registers `target` at the head of the list.
    pub fn add(&mut self, target: &Rc<T>) -> Subscription {
        let index = self.take_entry();
        let old_head = self.head;
        let entry = &mut self.entries[index as usize];
        entry.target = Some(Rc::downgrade(target));
        entry.in_use = true;
        entry.next = old_head;
        entry.prev = None;
        let subscription = Subscription {
            index,
            generation: entry.generation,
        };
        if let Some(head) = old_head {
            self.entries[head as usize].prev = Some(index);
        }
        self.head = Some(index);
        self.count += 1;
        subscription
    }

    /// Unregisters a subscription. Returns `false` when it was already
    /// removed, whether by its owner or by firing code pruning an expired
    /// target.
    pub fn remove(&mut self, subscription: Subscription) -> bool {
        if !self.is_live(subscription) {
            return false;
        }
        let index = subscription.index;
        let (prev, next) = {
            let entry = &self.entries[index as usize];
            (entry.prev, entry.next)
        };
        match prev {
            Some(prev) => self.entries[prev as usize].next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.entries[next as usize].prev = prev;
        }
        self.count -= 1;
        self.reuse_entry(index);
        true
    }

    /// Upgrades the target behind `subscription`. `None` when the entry was
    /// removed or its target has been dropped.
    pub fn target(&self, subscription: Subscription) -> Option<Rc<T>> {
        if !self.is_live(subscription) {
            return None;
        }
        self.entries[subscription.index as usize]
            .target
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Snapshot of the current subscriptions, head first. Firing code walks
    /// the snapshot so handlers may add or remove entries while it runs.
    pub fn copy_to_array(&self) -> Vec<Subscription> {
        let mut out = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let entry = &self.entries[index as usize];
            out.push(Subscription {
                index,
                generation: entry.generation,
            });
            cursor = entry.next;
        }
        out
    }

    /// Removes every entry whose target has been dropped. Returns how many
    /// were pruned.
    pub fn prune_expired(&mut self) -> usize {
        let expired: Vec<_> = self
            .copy_to_array()
            .into_iter()
            .filter(|sub| self.target(*sub).is_none())
            .collect();
        expired.into_iter().filter(|sub| self.remove(*sub)).count()
    }

    pub fn clear(&mut self) {
        while let Some(head) = self.head {
            let generation = self.entries[head as usize].generation;
            self.remove(Subscription {
                index: head,
                generation,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn pocket_size(&self) -> usize {
        self.pocket_size
    }

    fn is_live(&self, subscription: Subscription) -> bool {
        self.entries
            .get(subscription.index as usize)
            .map(|entry| entry.in_use && entry.generation == subscription.generation)
            .unwrap_or(false)
    }

    fn take_entry(&mut self) -> u32 {
        if let Some(index) = self.pocket {
            self.pocket = self.entries[index as usize].next;
            self.pocket_size -= 1;
            return index;
        }
        if let Some(index) = self.spare.pop() {
            return index;
        }
        self.entries.push(Entry::vacant());
        (self.entries.len() - 1) as u32
    }

    fn reuse_entry(&mut self, index: u32) {
        let pocket = self.pocket;
        let entry = &mut self.entries[index as usize];
        entry.target = None;
        entry.in_use = false;
        entry.prev = None;
        entry.generation = entry.generation.wrapping_add(1);
        if self.pocket_size < self.pocket_capacity {
            entry.next = pocket;
            self.pocket = Some(index);
            self.pocket_size += 1;
        } else {
            entry.next = None;
            self.spare.push(index);
        }
    }
}

impl<T: ?Sized> Default for WeakSubscriberList<T> {
    fn default() -> Self {
        Self::new(153)
    }
}

#[cfg(test)]
#[path = "tests/subscribers_tests.rs"]
mod tests;
