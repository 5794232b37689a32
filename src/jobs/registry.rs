//! Handle registry shared by every job coordinator
//!
//! Handles are allocated from a per-registry counter that only moves
//! forward, so a handle is never reused while its context lives and a stale
//! handle can never alias a newer job.

use std::collections::BTreeMap;

/// Opaque handle type of a registry
pub trait JobHandle: Copy + Ord + std::fmt::Debug {
    fn from_raw(raw: u64) -> Self;
    fn raw(self) -> u64;
}

macro_rules! job_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $crate::jobs::registry::JobHandle for $name {
            #[inline]
            fn from_raw(raw: u64) -> Self {
                $name(raw)
            }

            #[inline]
            fn raw(self) -> u64 {
                self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

pub(crate) use job_handle;

/// Mapping from handle to entry, iterated in allocation order
pub struct HandleRegistry<H: JobHandle, T> {
    entries: BTreeMap<H, T>,
    next_id: u64,
}

impl<H: JobHandle, T> HandleRegistry<H, T> {
    pub fn new() -> Self {
        HandleRegistry {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Store an entry under a fresh handle
    pub fn insert(&mut self, entry: T) -> H {
        let handle = H::from_raw(self.next_id);
        self.next_id += 1;
        self.entries.insert(handle, entry);
        handle
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.entries.get(&handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.entries.get_mut(&handle)
    }

    #[inline]
    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.entries.remove(&handle)
    }

    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `handle` was ever allocated by this registry
    #[inline]
    pub fn was_allocated(&self, handle: H) -> bool {
        handle.raw() >= 1 && handle.raw() < self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.entries.iter().map(|(h, t)| (*h, t))
    }

    /// Handles whose entry matches `pred`, in allocation order
    pub fn handles_where(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<H> {
        self.entries
            .iter()
            .filter(|(_, entry)| pred(entry))
            .map(|(h, _)| *h)
            .collect()
    }

    /// Drop every entry; the counter keeps going so old handles stay dead
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

impl<H: JobHandle, T> Default for HandleRegistry<H, T> {
    fn default() -> Self {
        Self::new()
    }
}
