//! Generational slot table for native objects
//!
//! Commands never carry raw pointers. A native object lives in a slot of the
//! owning context's table and is referred to by a [`NativeHandle`]: the slot
//! index plus the generation the slot had when the object was stored. Freeing
//! a slot bumps its generation, so an old handle can never resolve to a newer
//! occupant of the same slot.

use std::fmt;

/// Handle to a native object owned by one execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle {
    index: u32,
    generation: u32,
}

impl NativeHandle {
    /// Build a handle from raw parts (host side decoding)
    #[inline]
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        NativeHandle { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single word for the wire
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        NativeHandle {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot table with O(1) insert, lookup and removal
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    /// Indices of vacant slots, reused LIFO
    free: Vec<u32>,
    len: usize,
}

impl<T> SlotTable<T> {
    pub fn new() -> Self {
        SlotTable {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SlotTable {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its handle
    pub fn insert(&mut self, value: T) -> NativeHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return NativeHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NativeHandle {
            index,
            generation: 0,
        }
    }

    fn slot(&self, handle: NativeHandle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    #[inline]
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.get(handle).is_some()
    }

    #[inline]
    pub fn get(&self, handle: NativeHandle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: NativeHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Remove the value behind `handle`, invalidating the handle
    pub fn remove(&mut self, handle: NativeHandle) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Invalidate every live handle at once, returning the evicted values
    /// in slot order
    pub fn invalidate_all(&mut self) -> Vec<T> {
        let mut evicted = Vec::with_capacity(self.len);
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                evicted.push(value);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        self.free.reverse();
        self.len = 0;
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterator over live entries
    pub fn iter(&self) -> impl Iterator<Item = (NativeHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    NativeHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
