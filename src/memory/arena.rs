//! Generation-checked slot arena for task records.
//!
//! Slots are addressed by [`ArenaIndex`]. Removing a value bumps the slot's
//! generation and pushes it onto a free list, so an index that outlived its
//! value is detected instead of aliasing whatever reused the slot.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Slot index plus the generation it was issued for.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

/// Single-threaded arena. See [`TaskArena`] for the shared wrapper.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.len += 1;

        if let Some(free) = self.free_head {
            let slot = &mut self.slots[free as usize];
            let (next_free, generation) = match *slot {
                Slot::Vacant {
                    next_free,
                    generation,
                } => (next_free, generation),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { value, generation };
            return ArenaIndex::new(free, generation);
        }

        let index = u32::try_from(self.slots.len()).expect("task arena exceeded u32::MAX slots");
        self.slots.push(Slot::Occupied {
            value,
            generation: 0,
        });
        ArenaIndex::new(index, 0)
    }

    pub fn get(&self, idx: ArenaIndex) -> Option<&T> {
        match self.slots.get(idx.index as usize)? {
            Slot::Occupied { value, generation } if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, idx: ArenaIndex) -> bool {
        self.get(idx).is_some()
    }

    /// Removes the value and retires `idx`. Stale indices return `None`.
    pub fn remove(&mut self, idx: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(idx.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == idx.generation => {}
            _ => return None,
        }

        let vacant = Slot::Vacant {
            next_free: self.free_head,
            generation: idx.generation.wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
            unreachable!("slot checked as occupied above");
        };

        self.free_head = Some(idx.index);
        self.len -= 1;
        Some(value)
    }

    /// Empties every slot, returning the values that were still live.
    ///
    /// Generations keep advancing so indices issued before the drain stay stale.
    pub fn drain(&mut self) -> Vec<T> {
        let mut live = Vec::with_capacity(self.len);
        for index in 0..self.slots.len() {
            let generation = match &self.slots[index] {
                Slot::Occupied { generation, .. } => *generation,
                Slot::Vacant { .. } => continue,
            };
            if let Some(value) = self.remove(ArenaIndex::new(index as u32, generation)) {
                live.push(value);
            }
        }
        live
    }
}

/// Arena shared between every thread of one task graph.
///
/// Values are handed out as `Arc` clones so a worker can run a task without
/// holding the arena lock; the arena's own reference is the owning one and is
/// dropped when the slot is removed.
pub struct TaskArena<T> {
    inner: RwLock<Arena<Arc<T>>>,
}

impl<T> TaskArena<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arena::with_capacity(1024)),
        }
    }

    pub fn insert(&self, value: T) -> ArenaIndex {
        self.inner.write().insert(Arc::new(value))
    }

    pub fn get(&self, idx: ArenaIndex) -> Option<Arc<T>> {
        self.inner.read().get(idx).cloned()
    }

    pub fn contains(&self, idx: ArenaIndex) -> bool {
        self.inner.read().contains(idx)
    }

    pub fn remove(&self, idx: ArenaIndex) -> Option<Arc<T>> {
        self.inner.write().remove(idx)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every live value. Values are dropped after the lock is released,
    /// so their destructors may touch the arena.
    pub fn clear(&self) -> usize {
        let drained = self.inner.write().drain();
        let count = drained.len();
        drop(drained);
        count
    }
}

impl<T> Default for TaskArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TaskArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskArena")
            .field("len", &self.len())
            .finish()
    }
}
