//! Doubly-linked chain over arena storage.
//!
//! Nodes live in a [`Storage`], with the chain tracking head, tail and
//! length. Neighbor links are handles, so splicing a node in or out is
//! O(1) given its handle and no node ever holds an owning reference to
//! another.
//!
//! # Storage Invariant
//!
//! A chain instance must always be used with the same storage instance.
//! Passing a different storage corrupts the chain (it will panic on the
//! first dangling link it follows). The [`KeyedList`](crate::KeyedList)
//! pairs one chain with one arena and never hands either out.
//!
//! # Example
//!
//! ```
//! use linkmap::{Arena, Chain, Node};
//!
//! let mut arena: Arena<Node<u64>> = Arena::new();
//! let mut chain: Chain<u64, Arena<Node<u64>>> = Chain::new();
//!
//! let a = chain.push_back(&mut arena, 1);
//! let b = chain.push_back(&mut arena, 2);
//! chain.insert_before(&mut arena, b, 3);
//!
//! let values: Vec<_> = chain.iter(&arena).copied().collect();
//! assert_eq!(values, vec![1, 3, 2]);
//!
//! // Remove from anywhere - O(1)
//! assert_eq!(chain.remove(&mut arena, a), Some(1));
//! assert_eq!(chain.len(), 2);
//! ```

use std::marker::PhantomData;

use crate::{Handle, Storage};

/// A node in the chain.
///
/// Wraps user data with prev/next links. The chain owns the links; callers
/// reach the data through the chain's accessors.
#[derive(Debug)]
pub struct Node<T, H: Handle = u32> {
    pub(crate) data: T,
    pub(crate) prev: H,
    pub(crate) next: H,
}

impl<T, H: Handle> Node<T, H> {
    /// Creates a new unlinked node.
    #[inline]
    fn new(data: T) -> Self {
        Self {
            data,
            prev: H::NONE,
            next: H::NONE,
        }
    }

    /// Returns the node's data.
    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }
}

/// A doubly-linked chain over external storage.
///
/// # Type Parameters
///
/// - `T`: Element type
/// - `S`: Storage type (e.g., [`Arena<Node<T>>`](crate::Arena))
/// - `H`: Handle type (default `u32`)
#[derive(Debug)]
pub struct Chain<T, S, H: Handle = u32>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    head: H,
    tail: H,
    len: usize,
    _marker: PhantomData<(T, S)>,
}

impl<T, S, H: Handle> Default for Chain<T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, H: Handle> Chain<T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    /// Creates an empty chain.
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: H::NONE,
            tail: H::NONE,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Returns the number of linked nodes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the chain is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the head node's handle, or `None` if empty.
    #[inline]
    pub fn front_handle(&self) -> Option<H> {
        self.head.into_option()
    }

    /// Returns the tail node's handle, or `None` if empty.
    #[inline]
    pub fn back_handle(&self) -> Option<H> {
        self.tail.into_option()
    }

    /// Returns `true` if the node is currently the head of this chain.
    #[inline]
    pub fn is_head(&self, handle: H) -> bool {
        self.head == handle
    }

    /// Returns `true` if the node is currently the tail of this chain.
    #[inline]
    pub fn is_tail(&self, handle: H) -> bool {
        self.tail == handle
    }

    // ========================================================================
    // Insert operations (allocate + link)
    // ========================================================================

    /// Pushes a value to the back of the chain, returning its handle.
    #[inline]
    pub fn push_back(&mut self, storage: &mut S, value: T) -> H {
        let handle = storage.insert(Node::new(value));
        self.link_back(storage, handle);
        handle
    }

    /// Pushes a value to the front of the chain, returning its handle.
    #[inline]
    pub fn push_front(&mut self, storage: &mut S, value: T) -> H {
        let handle = storage.insert(Node::new(value));
        self.link_front(storage, handle);
        handle
    }

    /// Inserts a value immediately after `anchor`, returning its handle.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not valid in storage.
    #[inline]
    pub fn insert_after(&mut self, storage: &mut S, anchor: H, value: T) -> H {
        let handle = storage.insert(Node::new(value));
        self.link_after(storage, anchor, handle);
        handle
    }

    /// Inserts a value immediately before `anchor`, returning its handle.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not valid in storage.
    #[inline]
    pub fn insert_before(&mut self, storage: &mut S, anchor: H, value: T) -> H {
        let handle = storage.insert(Node::new(value));
        self.link_before(storage, anchor, handle);
        handle
    }

    // ========================================================================
    // Link operations (just relink, no alloc/dealloc)
    // ========================================================================

    fn link_back(&mut self, storage: &mut S, handle: H) {
        let node = node_mut(storage, handle);
        node.prev = self.tail;
        node.next = H::NONE;

        if self.tail.is_some() {
            node_mut(storage, self.tail).next = handle;
        } else {
            self.head = handle;
        }

        self.tail = handle;
        self.len += 1;
    }

    fn link_front(&mut self, storage: &mut S, handle: H) {
        let node = node_mut(storage, handle);
        node.next = self.head;
        node.prev = H::NONE;

        if self.head.is_some() {
            node_mut(storage, self.head).prev = handle;
        } else {
            self.tail = handle;
        }

        self.head = handle;
        self.len += 1;
    }

    fn link_after(&mut self, storage: &mut S, anchor: H, handle: H) {
        let next = node_mut(storage, anchor).next;
        let node = node_mut(storage, handle);
        node.prev = anchor;
        node.next = next;

        node_mut(storage, anchor).next = handle;

        if next.is_some() {
            node_mut(storage, next).prev = handle;
        } else {
            self.tail = handle;
        }

        self.len += 1;
    }

    fn link_before(&mut self, storage: &mut S, anchor: H, handle: H) {
        let prev = node_mut(storage, anchor).prev;
        let node = node_mut(storage, handle);
        node.next = anchor;
        node.prev = prev;

        node_mut(storage, anchor).prev = handle;

        if prev.is_some() {
            node_mut(storage, prev).next = handle;
        } else {
            self.head = handle;
        }

        self.len += 1;
    }

    /// Unlinks a node from the chain without deallocating it.
    ///
    /// Returns `true` if the node was in the chain.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not valid in storage.
    pub fn unlink(&mut self, storage: &mut S, handle: H) -> bool {
        let node = storage.get(handle).expect("invalid handle");
        let (prev, next) = (node.prev, node.next);

        match (prev.into_option(), next.into_option()) {
            // Sole node
            (None, None) => {
                if self.head != handle {
                    return false;
                }
                self.head = H::NONE;
                self.tail = H::NONE;
            }
            // Head with a successor
            (None, Some(next)) => {
                node_mut(storage, next).prev = H::NONE;
                self.head = next;
            }
            // Tail with a predecessor
            (Some(prev), None) => {
                node_mut(storage, prev).next = H::NONE;
                self.tail = prev;
            }
            // Interior
            (Some(prev), Some(next)) => {
                node_mut(storage, prev).next = next;
                node_mut(storage, next).prev = prev;
            }
        }

        let node = node_mut(storage, handle);
        node.prev = H::NONE;
        node.next = H::NONE;

        self.len -= 1;
        true
    }

    // ========================================================================
    // Remove operations (unlink + deallocate)
    // ========================================================================

    /// Removes a node by handle, returning its value.
    ///
    /// Returns `None` if the handle is vacant.
    #[inline]
    pub fn remove(&mut self, storage: &mut S, handle: H) -> Option<T> {
        storage.get(handle)?;
        self.unlink(storage, handle);
        storage.remove(handle).map(|node| node.data)
    }

    /// Removes and returns the front value.
    #[inline]
    pub fn pop_front(&mut self, storage: &mut S) -> Option<T> {
        let head = self.front_handle()?;
        self.remove(storage, head)
    }

    /// Removes and returns the back value.
    #[inline]
    pub fn pop_back(&mut self, storage: &mut S) -> Option<T> {
        let tail = self.back_handle()?;
        self.remove(storage, tail)
    }

    /// Removes every node.
    pub fn clear(&mut self, storage: &mut S) {
        let mut handle = self.head;
        while handle.is_some() {
            let next = node_mut(storage, handle).next;
            storage.remove(handle);
            handle = next;
        }

        self.head = H::NONE;
        self.tail = H::NONE;
        self.len = 0;
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Returns a reference to the value at `handle`.
    #[inline]
    pub fn get<'a>(&self, storage: &'a S, handle: H) -> Option<&'a T>
    where
        H: 'a,
    {
        storage.get(handle).map(|node| &node.data)
    }

    /// Returns a mutable reference to the value at `handle`.
    #[inline]
    pub fn get_mut<'a>(&self, storage: &'a mut S, handle: H) -> Option<&'a mut T>
    where
        H: 'a,
    {
        storage.get_mut(handle).map(|node| &mut node.data)
    }

    /// Returns a reference to the front value.
    #[inline]
    pub fn front<'a>(&self, storage: &'a S) -> Option<&'a T>
    where
        H: 'a,
    {
        self.get(storage, self.front_handle()?)
    }

    /// Returns a reference to the back value.
    #[inline]
    pub fn back<'a>(&self, storage: &'a S) -> Option<&'a T>
    where
        H: 'a,
    {
        self.get(storage, self.back_handle()?)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Returns the handle of the node after `handle`.
    ///
    /// Returns `None` if `handle` is the tail or vacant.
    #[inline]
    pub fn next_handle(&self, storage: &S, handle: H) -> Option<H> {
        storage.get(handle)?.next.into_option()
    }

    /// Returns the handle of the node before `handle`.
    ///
    /// Returns `None` if `handle` is the head or vacant.
    #[inline]
    pub fn prev_handle(&self, storage: &S, handle: H) -> Option<H> {
        storage.get(handle)?.prev.into_option()
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Returns an iterator over values, front to back.
    #[inline]
    pub fn iter<'a>(&self, storage: &'a S) -> Iter<'a, T, S, H> {
        Iter {
            handles: self.handles(storage),
        }
    }

    /// Returns an iterator over handles, front to back.
    ///
    /// Collect the handles first when the chain will be modified while
    /// walking it.
    #[inline]
    pub fn handles<'a>(&self, storage: &'a S) -> Handles<'a, T, S, H> {
        Handles {
            storage,
            front: self.head,
            back: self.tail,
            _marker: PhantomData,
        }
    }
}

/// Follows a link that the chain invariants guarantee to be occupied.
#[inline]
fn node_mut<T, S, H>(storage: &mut S, handle: H) -> &mut Node<T, H>
where
    H: Handle,
    S: Storage<Node<T, H>, Handle = H>,
{
    storage
        .get_mut(handle)
        .expect("chain link points at a vacant slot")
}

// =============================================================================
// Iterators
// =============================================================================

/// Iterator over chain handles, double-ended.
pub struct Handles<'a, T, S, H: Handle> {
    storage: &'a S,
    front: H,
    back: H,
    _marker: PhantomData<T>,
}

impl<'a, T: 'a, S, H: Handle + 'a> Handles<'a, T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    #[inline]
    fn node(&self, handle: H) -> &'a Node<T, H> {
        let storage: &'a S = self.storage;
        storage
            .get(handle)
            .expect("chain link points at a vacant slot")
    }
}

impl<'a, T: 'a, S, H: Handle + 'a> Iterator for Handles<'a, T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    type Item = H;

    #[inline]
    fn next(&mut self) -> Option<H> {
        if self.front.is_none() {
            return None;
        }

        let handle = self.front;

        // Check if we've met in the middle
        if self.front == self.back {
            self.front = H::NONE;
            self.back = H::NONE;
        } else {
            self.front = self.node(handle).next;
        }

        Some(handle)
    }
}

impl<'a, T: 'a, S, H: Handle + 'a> DoubleEndedIterator for Handles<'a, T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    #[inline]
    fn next_back(&mut self) -> Option<H> {
        if self.back.is_none() {
            return None;
        }

        let handle = self.back;

        if self.front == self.back {
            self.front = H::NONE;
            self.back = H::NONE;
        } else {
            self.back = self.node(handle).prev;
        }

        Some(handle)
    }
}

/// Iterator over references to chain values, double-ended.
pub struct Iter<'a, T, S, H: Handle> {
    handles: Handles<'a, T, S, H>,
}

impl<'a, T: 'a, S, H: Handle + 'a> Iterator for Iter<'a, T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        let handle = self.handles.next()?;
        Some(&self.handles.node(handle).data)
    }
}

impl<'a, T: 'a, S, H: Handle + 'a> DoubleEndedIterator for Iter<'a, T, S, H>
where
    S: Storage<Node<T, H>, Handle = H>,
{
    #[inline]
    fn next_back(&mut self) -> Option<&'a T> {
        let handle = self.handles.next_back()?;
        Some(&self.handles.node(handle).data)
    }
}
