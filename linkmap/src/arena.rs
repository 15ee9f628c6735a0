//! Node arena with stable handles.
//!
//! Storage provides insert/remove/get operations where handles remain
//! valid until explicitly removed. The [`Chain`](crate::Chain) stores its
//! neighbor links as handles into an arena instead of as pointers, so the
//! nodes have a single owner and no reference cycles.

use std::mem;

use crate::Handle;

/// Slab-like storage with stable handles.
///
/// # Requirements
///
/// Implementations must provide:
/// - **Stable handles**: a handle remains valid until explicitly removed
/// - **O(1)** insert, remove, get operations
/// - **Slot reuse**: removed slots can be reused by future inserts
///
/// # Implementations
///
/// - [`Arena<T>`] - growable, free-list backed (in this crate)
/// - `slab::Slab<T>` - growable, heap allocated (feature `slab`)
pub trait Storage<T> {
    /// Handle type for this storage.
    type Handle: Handle;

    /// Inserts a value, returning its stable handle.
    fn insert(&mut self, value: T) -> Self::Handle;

    /// Removes and returns the value at `handle`, if present.
    fn remove(&mut self, handle: Self::Handle) -> Option<T>;

    /// Returns a reference to the value at `handle`, if present.
    fn get(&self, handle: Self::Handle) -> Option<&T>;

    /// Returns a mutable reference to the value at `handle`, if present.
    fn get_mut(&mut self, handle: Self::Handle) -> Option<&mut T>;

    /// Returns the number of occupied slots.
    fn len(&self) -> usize;

    /// Returns `true` if no slots are occupied.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Arena - growable vector of slots, intrusive free list
// =============================================================================

#[derive(Debug)]
enum Slot<T, H> {
    Occupied(T),
    Vacant { next_free: H },
}

/// Growable storage with a free list threaded through vacant slots.
///
/// Removed slots are reused LIFO before the backing vector grows.
///
/// # Example
///
/// ```
/// use linkmap::{Arena, Storage};
///
/// let mut arena: Arena<u64> = Arena::with_capacity(16);
///
/// let h = arena.insert(42);
/// assert_eq!(arena.get(h), Some(&42));
/// assert_eq!(arena.remove(h), Some(42));
/// assert_eq!(arena.get(h), None);
/// ```
#[derive(Debug)]
pub struct Arena<T, H: Handle = u32> {
    slots: Vec<Slot<T, H>>,
    free_head: H,
    len: usize,
}

impl<T, H: Handle> Default for Arena<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, H: Handle> Arena<T, H> {
    /// Creates an empty arena.
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: H::NONE,
            len: 0,
        }
    }

    /// Creates an empty arena with room for `capacity` slots before growing.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: H::NONE,
            len: 0,
        }
    }

    /// Returns the number of slots the arena can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Removes all values, invalidating every handle.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_head = H::NONE;
        self.len = 0;
    }
}

impl<T, H: Handle> Storage<T> for Arena<T, H> {
    type Handle = H;

    /// # Panics
    ///
    /// Panics if the slot count would reach the handle type's sentinel.
    #[inline]
    fn insert(&mut self, value: T) -> H {
        if self.free_head.is_some() {
            let handle = self.free_head;
            let slot = &mut self.slots[handle.as_usize()];
            if let Slot::Vacant { next_free } = *slot {
                self.free_head = next_free;
            }
            *slot = Slot::Occupied(value);
            self.len += 1;
            return handle;
        }

        let handle = H::from_usize(self.slots.len());
        assert!(handle.is_some(), "arena exceeds handle type maximum");
        self.slots.push(Slot::Occupied(value));
        self.len += 1;
        handle
    }

    #[inline]
    fn remove(&mut self, handle: H) -> Option<T> {
        let slot = self.slots.get_mut(handle.as_usize())?;
        if let Slot::Vacant { .. } = slot {
            return None;
        }

        let old = mem::replace(
            slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = handle;
        self.len -= 1;

        match old {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get(&self, handle: H) -> Option<&T> {
        match self.slots.get(handle.as_usize())? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        match self.slots.get_mut(handle.as_usize())? {
            Slot::Occupied(value) => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }
}

// =============================================================================
// slab::Slab implementation
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Handle = usize;

    #[inline]
    fn insert(&mut self, value: T) -> usize {
        slab::Slab::insert(self, value)
    }

    #[inline]
    fn remove(&mut self, handle: usize) -> Option<T> {
        self.try_remove(handle)
    }

    #[inline]
    fn get(&self, handle: usize) -> Option<&T> {
        slab::Slab::get(self, handle)
    }

    #[inline]
    fn get_mut(&mut self, handle: usize) -> Option<&mut T> {
        slab::Slab::get_mut(self, handle)
    }

    #[inline]
    fn len(&self) -> usize {
        slab::Slab::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let arena: Arena<u64> = Arena::new();
        assert!(arena.is_empty());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<u64> = Arena::with_capacity(16);

        let h = arena.insert(42);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(h), Some(&42));

        assert_eq!(arena.remove(h), Some(42));
        assert_eq!(arena.get(h), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn get_mut() {
        let mut arena: Arena<u64> = Arena::new();

        let h = arena.insert(10);
        *arena.get_mut(h).unwrap() = 20;

        assert_eq!(arena.get(h), Some(&20));
    }

    #[test]
    fn slot_reuse_is_lifo() {
        let mut arena: Arena<u64> = Arena::new();

        let h0 = arena.insert(0);
        let h1 = arena.insert(1);
        let _h2 = arena.insert(2);

        arena.remove(h0);
        arena.remove(h1);

        // Most recently freed slot comes back first
        assert_eq!(arena.insert(10), h1);
        assert_eq!(arena.insert(11), h0);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut arena: Arena<u64> = Arena::with_capacity(2);

        let handles: Vec<_> = (0..100).map(|i| arena.insert(i)).collect();
        assert_eq!(arena.len(), 100);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(arena.get(*h), Some(&(i as u64)));
        }
    }

    #[test]
    fn remove_nonexistent() {
        let mut arena: Arena<u64> = Arena::new();

        let h = arena.insert(42);
        arena.remove(h);

        // Double remove returns None
        assert_eq!(arena.remove(h), None);
        assert_eq!(arena.remove(u32::NONE), None);
        assert_eq!(arena.remove(1000), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn clear_resets() {
        let mut arena: Arena<u64> = Arena::new();
        let h = arena.insert(1);
        arena.insert(2);

        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.get(h), None);
        assert_eq!(arena.insert(3), 0);
    }

    #[test]
    fn drop_cleans_up() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        #[derive(Debug)]
        struct DropCounter;
        impl Drop for DropCounter {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);

        {
            let mut arena: Arena<DropCounter> = Arena::new();
            arena.insert(DropCounter);
            let h = arena.insert(DropCounter);
            arena.insert(DropCounter);
            drop(arena.remove(h));
            assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 1);
        }

        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn u16_handle() {
        let mut arena: Arena<u64, u16> = Arena::new();

        let h = arena.insert(42);
        assert_eq!(arena.get(h), Some(&42));
    }

    #[test]
    fn len_unchanged_when_handles_run_out() {
        let mut arena: Arena<u8, u16> = Arena::new();
        for _ in 0..u16::MAX {
            arena.insert(0);
        }
        assert_eq!(arena.len(), u16::MAX as usize);

        let overflow = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| arena.insert(1)));
        assert!(overflow.is_err());
        assert_eq!(arena.len(), u16::MAX as usize);

        // A freed slot is still claimable after the failed insert
        arena.remove(7);
        assert_eq!(arena.insert(9), 7);
        assert_eq!(arena.len(), u16::MAX as usize);
    }

    #[cfg(feature = "slab")]
    mod slab_tests {
        use super::*;

        #[test]
        fn insert_get_remove() {
            let mut storage = slab::Slab::new();

            let h = Storage::insert(&mut storage, 42);
            assert_eq!(Storage::get(&storage, h), Some(&42));

            assert_eq!(Storage::remove(&mut storage, h), Some(42));
            assert_eq!(Storage::get(&storage, h), None);
        }

        #[test]
        fn slot_reuse() {
            let mut storage = slab::Slab::new();

            let h1 = Storage::insert(&mut storage, 1);
            Storage::remove(&mut storage, h1);

            let h2 = Storage::insert(&mut storage, 2);
            assert_eq!(h1, h2); // Slot reused
        }
    }
}
