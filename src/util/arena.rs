//! Generational arena backing the runtime's record stores.
//!
//! Task records and pooled operation contexts both live in arenas: a `Vec` of
//! slots threaded with a free list, handed out as [`ArenaIndex`] values that
//! carry a generation counter. A slot's generation bumps on every vacate, so a
//! stale index (held across a release/reuse cycle) fails the generation check
//! instead of silently aliasing the new occupant.
//!
//! # Design
//!
//! - Insert pops the free list when possible, so vacated slots are reused
//!   LIFO and the backing `Vec` only grows when no slot is free.
//! - Remove vacates in place; slot storage is never returned to the allocator
//!   until the arena itself is dropped or [`Arena::clear`] runs.
//! - No unsafe code; bounds checks plus generation validation.

use core::fmt;
use core::hash::{Hash, Hasher};

/// A generation-stamped index into an [`Arena`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaIndex {
    slot: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Builds an index from raw parts (test construction, mostly).
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// The raw slot number, without the generation stamp.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// The generation the slot had when this index was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.slot, self.generation)
    }
}

impl Hash for ArenaIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64((u64::from(self.slot) << 32) | u64::from(self.generation));
    }
}

enum Entry<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

impl<T: fmt::Debug> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Occupied { value, generation } => f
                .debug_struct("Occupied")
                .field("value", value)
                .field("generation", generation)
                .finish(),
            Self::Vacant { next_free, generation } => f
                .debug_struct("Vacant")
                .field("next_free", next_free)
                .field("generation", generation)
                .finish(),
        }
    }
}

/// Slab of reusable slots with generation-checked access.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    occupied: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            occupied: 0,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.occupied
    }

    /// True when no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Total slots ever allocated, occupied or vacant.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of vacant (reusable) slots.
    #[must_use]
    pub fn vacant_count(&self) -> usize {
        self.entries.len() - self.occupied
    }

    /// Inserts `value`, reusing the most recently vacated slot if one exists.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Inserts the value produced by `build`, which receives the index the
    /// record will live at so it can embed its own id.
    pub fn insert_with<F>(&mut self, build: F) -> ArenaIndex
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        self.occupied += 1;
        if let Some(slot) = self.free_head {
            let entry = &mut self.entries[slot as usize];
            let Entry::Vacant { next_free, generation } = *entry else {
                unreachable!("free list points at occupied slot");
            };
            self.free_head = next_free;
            let index = ArenaIndex { slot, generation };
            *entry = Entry::Occupied {
                value: build(index),
                generation,
            };
            index
        } else {
            let slot = u32::try_from(self.entries.len()).expect("arena slot count exceeds u32");
            let index = ArenaIndex { slot, generation: 0 };
            self.entries.push(Entry::Occupied {
                value: build(index),
                generation: 0,
            });
            index
        }
    }

    /// Vacates the slot at `index` and returns its value.
    ///
    /// Returns `None` when the index is out of range, already vacant, or
    /// carries a stale generation.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == index.generation => {
                let vacated = core::mem::replace(
                    entry,
                    Entry::Vacant {
                        next_free: self.free_head,
                        generation: index.generation.wrapping_add(1),
                    },
                );
                self.free_head = Some(index.slot);
                self.occupied -= 1;
                match vacated {
                    Entry::Occupied { value, .. } => Some(value),
                    Entry::Vacant { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    /// Shared access to the value at `index`, if live.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.entries.get(index.slot as usize)? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable access to the value at `index`, if live.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.entries.get_mut(index.slot as usize)? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// True when `index` refers to a live slot.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Iterates over live slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| match entry {
            Entry::Occupied { value, generation } => Some((
                ArenaIndex {
                    slot: i as u32,
                    generation: *generation,
                },
                value,
            )),
            Entry::Vacant { .. } => None,
        })
    }

    /// Removes and yields every live value, leaving the arena empty.
    pub fn drain_occupied(&mut self) -> Vec<(ArenaIndex, T)> {
        let mut out = Vec::with_capacity(self.occupied);
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if let Entry::Occupied { generation, .. } = entry {
                let generation = *generation;
                let index = ArenaIndex {
                    slot: i as u32,
                    generation,
                };
                let vacated = core::mem::replace(
                    entry,
                    Entry::Vacant {
                        next_free: None,
                        generation: generation.wrapping_add(1),
                    },
                );
                if let Entry::Occupied { value, .. } = vacated {
                    out.push((index, value));
                }
            }
        }
        self.occupied = 0;
        self.rebuild_free_list();
        out
    }

    /// Drops every slot, vacant list included, returning storage to the
    /// allocator. Outstanding indices all become stale.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free_head = None;
        self.occupied = 0;
    }

    fn rebuild_free_list(&mut self) {
        self.free_head = None;
        // Thread vacants back-to-front so low slots are reused first.
        for i in (0..self.entries.len()).rev() {
            if let Entry::Vacant { next_free, .. } = &mut self.entries[i] {
                *next_free = self.free_head;
                self.free_head = Some(i as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut arena = Arena::new();
        let idx = arena.insert("alpha");
        assert_eq!(arena.get(idx), Some(&"alpha"));
        assert_eq!(arena.len(), 1);
        assert!(arena.contains(idx));
    }

    #[test]
    fn remove_vacates_and_reuses_slot() {
        let mut arena = Arena::new();
        let first = arena.insert(1);
        let second = arena.insert(2);

        assert_eq!(arena.remove(first), Some(1));
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.vacant_count(), 1);

        let third = arena.insert(3);
        assert_eq!(third.slot(), first.slot());
        assert_ne!(third.generation(), first.generation());
        assert_eq!(arena.get(second), Some(&2));
        assert_eq!(arena.get(third), Some(&3));
        assert_eq!(arena.vacant_count(), 0);
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut arena = Arena::new();
        let old = arena.insert(10);
        arena.remove(old);
        let new = arena.insert(20);

        assert_eq!(old.slot(), new.slot());
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.get(new), Some(&20));
    }

    #[test]
    fn insert_with_sees_final_index() {
        let mut arena = Arena::new();
        let idx = arena.insert_with(|i| u64::from(i.slot()) + 100);
        assert_eq!(arena.get(idx), Some(&100));
    }

    #[test]
    fn occupancy_accounting_is_exact() {
        let mut arena = Arena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        assert_eq!((arena.len(), arena.vacant_count(), arena.capacity()), (3, 0, 3));

        arena.remove(b);
        assert_eq!((arena.len(), arena.vacant_count(), arena.capacity()), (2, 1, 3));

        arena.remove(a);
        arena.remove(c);
        assert_eq!((arena.len(), arena.vacant_count(), arena.capacity()), (0, 3, 3));
    }

    #[test]
    fn drain_occupied_empties_and_invalidates() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        arena.insert(2);
        let drained = arena.drain_occupied();
        assert_eq!(drained.len(), 2);
        assert!(arena.is_empty());
        assert_eq!(arena.get(a), None);

        // Slots remain reusable after a drain.
        let reused = arena.insert(9);
        assert_eq!(arena.get(reused), Some(&9));
        assert_eq!(arena.capacity(), 2);
    }

    #[test]
    fn clear_releases_storage() {
        let mut arena = Arena::new();
        let idx = arena.insert(7);
        arena.clear();
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.get(idx), None);
    }
}
