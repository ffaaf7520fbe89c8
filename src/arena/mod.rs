// Arena-based storage for runtime metadata
//
// This module provides the registries the runtime is built on:
// - Component arena: ComponentMetadata plus the node -> component map
// - Scope arena: ScopeData (variables, functions, lifecycle hooks)
// - Watcher arena: WatcherMetadata (compiled expression, last value, callback)
//
// The runtime is single-threaded, so every registry lives in a thread-local
// RefCell. Ids are copyable keys carrying a generation: once an entry is
// removed its id goes stale and every accessor returns None, even after the
// slab slot has been reused.
//
// Borrow discipline: no accessor runs user code. Callbacks are taken out of
// the arena before they run and put back afterwards.

pub mod component_arena;
pub mod scope_arena;
pub mod watcher_arena;

pub use component_arena::{ComponentId, ComponentMetadata, NodeBinding};
pub use scope_arena::{ScopeData, ScopeFn, ScopeId};
pub use watcher_arena::{Derive, WatchCallback, WatcherId, WatcherMetadata};

use slab::Slab;

/// Slab index plus the generation it was allocated in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Slab index of the entry.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

struct Slot<T> {
    generation: u32,
    value: T,
}

/// Generation-checked slab.
pub struct Arena<T> {
    slots: Slab<Slot<T>>,
    generation: u32,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Slab::new(),
            generation: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Key {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let index = self.slots.insert(Slot { generation, value });
        Key {
            index: index as u32,
            generation,
        }
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: Key) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        Some(self.slots.remove(key.index()).value)
    }

    /// Snapshot of the live keys in slot order.
    pub fn keys(&self) -> Vec<Key> {
        self.slots
            .iter()
            .map(|(index, slot)| Key {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove every entry, handing the values back so they can be dropped
    /// outside of any borrow.
    pub fn drain(&mut self) -> Vec<T> {
        self.slots.drain().map(|slot| slot.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_keys_do_not_alias_reused_slots() {
        let mut arena = Arena::new();
        let first = arena.insert("first");
        assert_eq!(arena.remove(first), Some("first"));

        let second = arena.insert("second");
        assert_eq!(first.index(), second.index());
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn drain_empties_the_arena() {
        let mut arena = Arena::new();
        let keys: Vec<_> = (0..3).map(|i| arena.insert(i)).collect();
        assert_eq!(arena.keys(), keys);
        assert_eq!(arena.drain(), vec![0, 1, 2]);
        assert!(arena.is_empty());
    }
}
