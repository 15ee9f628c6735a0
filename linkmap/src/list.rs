//! Keyed, ordered, doubly-linked list.
//!
//! [`KeyedList`] pairs a hash index (key to handle) with a [`Chain`] of
//! entries living in an [`Arena`]. Lookup by key is O(1); so is inserting
//! next to, or removing, a node whose key is known.
//!
//! # Locking
//!
//! All state sits behind one `parking_lot::Mutex`. Every public method
//! takes the lock exactly once and works on the unlocked `Core` inside it;
//! `Core` methods never lock, so a read-through from [`KeyedList::find`]
//! can insert the fetched value without re-entering the mutex. Callbacks
//! that run under the lock (predicates, the diagnostic hook, store calls)
//! must not call back into the same list.
//!
//! # Events and storage
//!
//! Each committed mutation emits one [`Event`] to the installed sink (see
//! [`delivery`](crate::delivery)) and then writes through to the
//! [`Store`], if any. Mutations that originate from the store
//! (read-through, [`KeyedList::upsert_from_store`],
//! [`KeyedList::remove_from_store`]) emit events but are not written back.
//!
//! # Example
//!
//! ```
//! use linkmap::{EventKind, KeyedList};
//!
//! let list = KeyedList::new();
//! let (_, events) = list.create_sink(64);
//!
//! list.add_last("a", 1).unwrap();
//! list.add_last("b", 2).unwrap();
//! list.add_first("z", 0).unwrap();
//!
//! assert_eq!(list.keys(), vec!["z", "a", "b"]);
//! assert_eq!(list.remove_last(), Some(("b".to_owned(), 2)));
//! assert_eq!(list.len(), 2);
//!
//! let kinds: Vec<_> = events.try_iter().map(|e| e.kind).collect();
//! assert_eq!(kinds.last(), Some(&EventKind::Deleted));
//! assert_eq!(kinds.len(), 4);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use linkmap_sink::Sink;
use parking_lot::Mutex;
use serde::Serialize;

use crate::arena::Arena;
use crate::chain::{Chain, Node};
use crate::config::ListConfig;
use crate::delivery::{Broadcaster, DeliveryPolicy};
use crate::diagnostics::{Diagnostic, DiagnosticHook, Diagnostics};
use crate::error::{ListError, Result};
use crate::event::{Event, EventKind};
use crate::store::{Origin, Store, StoreBridge};

type Handle = u32;

struct Entry<V> {
    key: String,
    value: V,
}

type Slots<V> = Arena<Node<Entry<V>>, Handle>;

#[derive(Debug, Clone, Copy)]
enum Placement {
    Front,
    Back,
    After(Handle),
    Before(Handle),
}

// =============================================================================
// Core - unlocked state and operations
// =============================================================================

struct Core<V> {
    index: HashMap<String, Handle>,
    chain: Chain<Entry<V>, Slots<V>, Handle>,
    slots: Slots<V>,
    broadcaster: Broadcaster<V>,
    store: StoreBridge<V>,
    diagnostics: Diagnostics,
}

impl<V> Core<V>
where
    V: Clone + Serialize + Send + 'static,
{
    fn new(
        config: &ListConfig,
        store: Option<Arc<dyn Store<V>>>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            index: HashMap::with_capacity(config.initial_capacity),
            chain: Chain::new(),
            slots: Arena::with_capacity(config.initial_capacity),
            broadcaster: Broadcaster::new(config.delivery, diagnostics.clone()),
            store: StoreBridge::new(store, diagnostics.clone()),
            diagnostics,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn handle(&self, key: &str) -> Option<Handle> {
        self.index.get(key).copied()
    }

    fn entry(&self, handle: Handle) -> Option<&Entry<V>> {
        self.chain.get(&self.slots, handle)
    }

    fn pair(&self, handle: Handle) -> Option<(String, V)> {
        self.entry(handle)
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }

    // ------------------------------------------------------------------------
    // Commit: event, diagnostics, write-through
    // ------------------------------------------------------------------------

    fn committed(&self, kind: EventKind, key: &str, value: &V, origin: Origin) {
        self.diagnostics.mutation(kind, key);
        if self.broadcaster.sink().is_some() {
            self.broadcaster
                .broadcast(Event::new(key, value.clone(), kind));
        }
        self.store.write(kind, key, value, origin);
    }

    fn committed_at(&self, kind: EventKind, handle: Handle, origin: Origin) {
        if let Some(entry) = self.entry(handle) {
            self.committed(kind, &entry.key, &entry.value, origin);
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    fn insert(
        &mut self,
        key: String,
        value: V,
        placement: Placement,
        origin: Origin,
    ) -> Result<()> {
        if self.index.contains_key(&key) {
            return Err(ListError::DuplicateKey(key));
        }

        let entry = Entry {
            key: key.clone(),
            value,
        };
        let handle = match placement {
            Placement::Front => self.chain.push_front(&mut self.slots, entry),
            Placement::Back => self.chain.push_back(&mut self.slots, entry),
            Placement::After(anchor) => self.chain.insert_after(&mut self.slots, anchor, entry),
            Placement::Before(anchor) => self.chain.insert_before(&mut self.slots, anchor, entry),
        };
        self.index.insert(key, handle);

        self.committed_at(EventKind::Added, handle, origin);
        Ok(())
    }

    fn insert_adjacent(&mut self, key: String, value: V, anchor: &str, after: bool) -> Result<()> {
        if self.index.contains_key(&key) {
            return Err(ListError::DuplicateKey(key));
        }
        let anchor = self
            .handle(anchor)
            .ok_or_else(|| ListError::TargetNotFound(anchor.to_owned()))?;

        let placement = if after {
            Placement::After(anchor)
        } else {
            Placement::Before(anchor)
        };
        self.insert(key, value, placement, Origin::Caller)
    }

    fn insert_where<F>(&mut self, key: String, value: V, mut predicate: F) -> Result<bool>
    where
        F: FnMut(&V) -> bool,
    {
        if self.index.contains_key(&key) {
            return Err(ListError::DuplicateKey(key));
        }

        let target = self.chain.handles(&self.slots).find(|&handle| {
            self.chain
                .get(&self.slots, handle)
                .is_some_and(|entry| predicate(&entry.value))
        });

        match target {
            Some(anchor) => {
                self.insert(key, value, Placement::Before(anchor), Origin::Caller)?;
                Ok(true)
            }
            None => {
                self.insert(key, value, Placement::Back, Origin::Caller)?;
                Ok(false)
            }
        }
    }

    fn replace(&mut self, handle: Handle, value: V, origin: Origin) {
        if let Some(entry) = self.chain.get_mut(&mut self.slots, handle) {
            entry.value = value;
        }
        self.committed_at(EventKind::Updated, handle, origin);
    }

    /// Inserts at the back, or replaces in place if the key exists.
    fn upsert(&mut self, key: String, value: V, origin: Origin) -> EventKind {
        match self.handle(&key) {
            Some(handle) => {
                self.replace(handle, value, origin);
                EventKind::Updated
            }
            None => {
                let entry = Entry {
                    key: key.clone(),
                    value,
                };
                let handle = self.chain.push_back(&mut self.slots, entry);
                self.index.insert(key, handle);
                self.committed_at(EventKind::Added, handle, origin);
                EventKind::Added
            }
        }
    }

    fn update(&mut self, key: &str, value: V) -> Result<()> {
        let handle = self
            .handle(key)
            .ok_or_else(|| ListError::DataNotFound(key.to_owned()))?;
        self.replace(handle, value, Origin::Caller);
        Ok(())
    }

    fn evict(&mut self, handle: Handle, origin: Origin) -> Option<(String, V)> {
        let entry = self.chain.remove(&mut self.slots, handle)?;
        self.index.remove(&entry.key);
        self.committed(EventKind::Deleted, &entry.key, &entry.value, origin);
        Some((entry.key, entry.value))
    }

    fn remove(&mut self, key: &str, origin: Origin) -> Option<V> {
        match self.handle(key) {
            Some(handle) => self.evict(handle, origin).map(|(_, value)| value),
            None => {
                // Not cached, but the store may still hold it
                self.store.delete(key, origin);
                None
            }
        }
    }

    fn find(&mut self, key: &str) -> Option<V> {
        if let Some(handle) = self.handle(key) {
            return self.entry(handle).map(|entry| entry.value.clone());
        }

        let value = self.store.fetch(key)?;
        self.upsert(key.to_owned(), value.clone(), Origin::Store);
        Some(value)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    fn entries(&self) -> impl DoubleEndedIterator<Item = &Entry<V>> {
        self.chain.iter(&self.slots)
    }
}

// =============================================================================
// KeyedList - locked public surface
// =============================================================================

/// A keyed, ordered list with change events and optional persistence.
///
/// See the [module documentation](self) for the locking, event and storage
/// model.
pub struct KeyedList<V> {
    core: Mutex<Core<V>>,
}

impl<V> Default for KeyedList<V>
where
    V: Clone + Serialize + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedList<V>
where
    V: Clone + Serialize + Send + 'static,
{
    /// Creates an empty list with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates an empty list that writes through to and reads through
    /// from `store`.
    pub fn with_store(store: impl Store<V> + 'static) -> Self {
        Self::builder().store(store).build()
    }

    /// Creates an empty list with the given configuration.
    pub fn with_config(config: ListConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> KeyedListBuilder<V> {
        KeyedListBuilder::new()
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Inserts at the head.
    ///
    /// # Errors
    ///
    /// [`ListError::DuplicateKey`] if `key` is present.
    pub fn add_first(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.core
            .lock()
            .insert(key.into(), value, Placement::Front, Origin::Caller)
    }

    /// Inserts at the tail.
    ///
    /// # Errors
    ///
    /// [`ListError::DuplicateKey`] if `key` is present.
    pub fn add_last(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.core
            .lock()
            .insert(key.into(), value, Placement::Back, Origin::Caller)
    }

    /// Inserts immediately after `anchor`.
    ///
    /// # Errors
    ///
    /// [`ListError::DuplicateKey`] if `key` is present, otherwise
    /// [`ListError::TargetNotFound`] if `anchor` is absent.
    pub fn add_after(&self, key: impl Into<String>, value: V, anchor: &str) -> Result<()> {
        self.core
            .lock()
            .insert_adjacent(key.into(), value, anchor, true)
    }

    /// Inserts immediately before `anchor`.
    ///
    /// # Errors
    ///
    /// [`ListError::DuplicateKey`] if `key` is present, otherwise
    /// [`ListError::TargetNotFound`] if `anchor` is absent.
    pub fn add_before(&self, key: impl Into<String>, value: V, anchor: &str) -> Result<()> {
        self.core
            .lock()
            .insert_adjacent(key.into(), value, anchor, false)
    }

    /// Inserts at the tail, or replaces the value in place if `key` is
    /// present. Returns which of the two happened.
    pub fn add_or_update(&self, key: impl Into<String>, value: V) -> EventKind {
        self.core.lock().upsert(key.into(), value, Origin::Caller)
    }

    /// Inserts at the tail unless `key` is present. Returns `true` if the
    /// value was inserted.
    pub fn add_if_absent(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let mut core = self.core.lock();
        if core.index.contains_key(&key) {
            return false;
        }
        core.insert(key, value, Placement::Back, Origin::Caller).is_ok()
    }

    /// Inserts before the first node whose value satisfies `predicate`,
    /// scanning from the head. Appends at the tail if nothing matches.
    ///
    /// Returns `true` if a match was found. The scan is linear and runs
    /// under the lock; `predicate` must not touch this list.
    ///
    /// # Errors
    ///
    /// [`ListError::DuplicateKey`] if `key` is present.
    pub fn add_with_condition<F>(
        &self,
        key: impl Into<String>,
        value: V,
        predicate: F,
    ) -> Result<bool>
    where
        F: FnMut(&V) -> bool,
    {
        self.core.lock().insert_where(key.into(), value, predicate)
    }

    // ========================================================================
    // Update / remove
    // ========================================================================

    /// Replaces the value of an existing key in place.
    ///
    /// # Errors
    ///
    /// [`ListError::DataNotFound`] if `key` is absent.
    pub fn update(&self, key: &str, value: V) -> Result<()> {
        self.core.lock().update(key, value)
    }

    /// Removes `key`, returning its value.
    ///
    /// An absent key is still deleted from the store, which may hold
    /// entries that were never loaded.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.core.lock().remove(key, Origin::Caller)
    }

    pub fn remove_first(&self) -> Option<(String, V)> {
        let mut core = self.core.lock();
        let head = core.chain.front_handle()?;
        core.evict(head, Origin::Caller)
    }

    pub fn remove_last(&self) -> Option<(String, V)> {
        let mut core = self.core.lock();
        let tail = core.chain.back_handle()?;
        core.evict(tail, Origin::Caller)
    }

    /// Removes the node following `anchor`.
    pub fn remove_after(&self, anchor: &str) -> Option<(String, V)> {
        let mut core = self.core.lock();
        let anchor = core.handle(anchor)?;
        let next = core.chain.next_handle(&core.slots, anchor)?;
        core.evict(next, Origin::Caller)
    }

    /// Removes the node preceding `anchor`.
    pub fn remove_before(&self, anchor: &str) -> Option<(String, V)> {
        let mut core = self.core.lock();
        let anchor = core.handle(anchor)?;
        let prev = core.chain.prev_handle(&core.slots, anchor)?;
        core.evict(prev, Origin::Caller)
    }

    // ========================================================================
    // Store-originated mutations
    // ========================================================================

    /// Applies a change that originated in the store: inserts or replaces
    /// without writing back.
    pub fn upsert_from_store(&self, key: impl Into<String>, value: V) -> EventKind {
        self.core.lock().upsert(key.into(), value, Origin::Store)
    }

    /// Applies a deletion that originated in the store, without writing
    /// back.
    pub fn remove_from_store(&self, key: &str) -> Option<V> {
        self.core.lock().remove(key, Origin::Store)
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Returns the value for `key`.
    ///
    /// On a miss, a configured store is asked for the key. A hit there is
    /// appended to the list (emitting an `Added` event, not written back)
    /// and returned.
    pub fn find(&self, key: &str) -> Option<V> {
        self.core.lock().find(key)
    }

    /// Returns `true` if `key` is in memory. Never consults the store.
    pub fn contains_key(&self, key: &str) -> bool {
        self.core.lock().index.contains_key(key)
    }

    pub fn head(&self) -> Option<(String, V)> {
        let core = self.core.lock();
        core.pair(core.chain.front_handle()?)
    }

    pub fn tail(&self) -> Option<(String, V)> {
        let core = self.core.lock();
        core.pair(core.chain.back_handle()?)
    }

    /// Returns the successor of `key`.
    pub fn next(&self, key: &str) -> Option<(String, V)> {
        let core = self.core.lock();
        let handle = core.handle(key)?;
        core.pair(core.chain.next_handle(&core.slots, handle)?)
    }

    /// Returns the predecessor of `key`.
    pub fn prev(&self, key: &str) -> Option<(String, V)> {
        let core = self.core.lock();
        let handle = core.handle(key)?;
        core.pair(core.chain.prev_handle(&core.slots, handle)?)
    }

    pub fn len(&self) -> usize {
        self.core.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.lock().len() == 0
    }

    /// Keys from head to tail.
    pub fn keys(&self) -> Vec<String> {
        self.core
            .lock()
            .entries()
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Keys from tail to head.
    pub fn keys_rev(&self) -> Vec<String> {
        self.core
            .lock()
            .entries()
            .rev()
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// `(key, value)` pairs from head to tail.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.core
            .lock()
            .entries()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    /// Unordered snapshot of every key and value.
    pub fn contents(&self) -> HashMap<String, V> {
        self.core
            .lock()
            .entries()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    /// Sorting is not supported.
    ///
    /// # Errors
    ///
    /// Always [`ListError::NotImplemented`].
    pub fn sort<F>(&self, _compare: F) -> Result<()>
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        Err(ListError::NotImplemented("sort"))
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Installs the sink that receives this list's events.
    ///
    /// Returns `false`, leaving the current sink in place, if one is
    /// already installed.
    pub fn install_sink(&self, sink: Sink<Event<V>>) -> bool {
        self.core.lock().broadcaster.install(sink)
    }

    /// Returns the installed sink and its capacity, creating one that holds
    /// `capacity` events (at least one) if there is none yet.
    pub fn create_sink(&self, capacity: usize) -> (usize, Sink<Event<V>>) {
        let sink = self.core.lock().broadcaster.get_or_create(capacity);
        (sink.capacity(), sink)
    }

    /// Like [`create_sink`](Self::create_sink), sized by the configured
    /// delivery policy.
    pub fn event_sink(&self) -> Sink<Event<V>> {
        let mut core = self.core.lock();
        let capacity = core.broadcaster.policy().capacity;
        core.broadcaster.get_or_create(capacity)
    }

    /// Returns the installed sink, if any.
    pub fn sink(&self) -> Option<Sink<Event<V>>> {
        self.core.lock().broadcaster.sink().cloned()
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        *self.core.lock().broadcaster.policy()
    }

    /// Detached deliveries that have not reached the sink yet.
    ///
    /// Only [`OnNearFull::SpawnDetached`](crate::OnNearFull::SpawnDetached)
    /// creates them. The count grows without bound while the consumer
    /// stalls.
    pub fn pending_deliveries(&self) -> usize {
        self.core.lock().broadcaster.outstanding()
    }

    pub fn has_store(&self) -> bool {
        self.core.lock().store.is_configured()
    }
}

impl<V> fmt::Debug for KeyedList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.lock();
        f.debug_struct("KeyedList")
            .field("len", &core.index.len())
            .field("broadcaster", &core.broadcaster)
            .field("store", &core.store)
            .field("diagnostics", &core.diagnostics)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`KeyedList`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use linkmap::{DeliveryPolicy, KeyedList, ListConfig, MemoryStore, OnNearFull};
///
/// let store = Arc::new(MemoryStore::<String>::new());
/// let list = KeyedList::builder()
///     .config(ListConfig::default().with_delivery(
///         DeliveryPolicy::default().with_on_near_full(OnNearFull::DropOldest),
///     ))
///     .store(Arc::clone(&store))
///     .diagnostics(|d| eprintln!("{d}"))
///     .build();
///
/// list.add_last("k", "v".to_owned()).unwrap();
/// assert!(store.contains("k"));
/// ```
pub struct KeyedListBuilder<V> {
    config: ListConfig,
    store: Option<Arc<dyn Store<V>>>,
    hook: Option<DiagnosticHook>,
}

impl<V> Default for KeyedListBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedListBuilder<V> {
    pub fn new() -> Self {
        Self {
            config: ListConfig::default(),
            store: None,
            hook: None,
        }
    }

    pub fn config(mut self, config: ListConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.config.delivery = delivery;
        self
    }

    pub fn store(mut self, store: impl Store<V> + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets the diagnostic hook.
    pub fn diagnostics<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }
}

impl<V> KeyedListBuilder<V>
where
    V: Clone + Serialize + Send + 'static,
{
    pub fn build(self) -> KeyedList<V> {
        let diagnostics = Diagnostics::new(self.hook);
        KeyedList {
            core: Mutex::new(Core::new(&self.config, self.store, diagnostics)),
        }
    }
}

impl<V> fmt::Debug for KeyedListBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedListBuilder")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
