//! Persistence capability.
//!
//! A list can be constructed over a [`Store`]. Committed mutations are
//! written through to it, and [`KeyedList::find`](crate::KeyedList::find)
//! reads through it on a miss. The store is best-effort from the list's
//! point of view: a failed store call is reported as a
//! [`Diagnostic`](crate::Diagnostic) and logged, and the in-memory
//! mutation stands regardless.
//!
//! Values are written as JSON bytes (`serde_json`). What the store does
//! with the bytes is its own business.
//!
//! # Locking
//!
//! Store calls run while the list's lock is held. A reader that arrives
//! during a write-through waits for the store call to return, so it never
//! observes in-memory state newer than the last store write. The price is
//! that a slow store stalls every operation on the list.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::event::EventKind;

/// Failure reported by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend reported an error.
    #[error("store backend error: {0}")]
    Backend(#[from] Box<dyn Error + Send + Sync>),
}

/// External persistence for a list.
///
/// Each call is independent; no transaction spans two calls. `get` decodes
/// into `V` itself, so a store may keep whatever representation it likes.
pub trait Store<V>: Send + Sync {
    /// Persists a newly added key.
    fn add(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Persists a new value for an existing key.
    fn update(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Deletes a key. Deleting an unknown key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Loads a key, or `None` if the store does not have it.
    fn get(&self, key: &str) -> Result<Option<V>, StoreError>;
}

impl<V, S: Store<V> + ?Sized> Store<V> for Arc<S> {
    fn add(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).add(key, data)
    }

    fn update(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).update(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }
}

/// Who initiated a mutation.
///
/// Mutations that came from the store are not written back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Caller,
    Store,
}

// =============================================================================
// Bridge - write-through / read-through on behalf of the list
// =============================================================================

pub(crate) struct StoreBridge<V> {
    store: Option<Arc<dyn Store<V>>>,
    diagnostics: Diagnostics,
}

impl<V: Serialize> StoreBridge<V> {
    pub(crate) fn new(store: Option<Arc<dyn Store<V>>>, diagnostics: Diagnostics) -> Self {
        Self { store, diagnostics }
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Writes a committed mutation through to the store.
    pub(crate) fn write(&self, kind: EventKind, key: &str, value: &V, origin: Origin) {
        let Some(store) = self.writable(origin) else {
            return;
        };

        let (operation, result) = match kind {
            EventKind::Deleted => ("delete", store.delete(key)),
            EventKind::Added | EventKind::Updated => {
                let data = match serde_json::to_vec(value) {
                    Ok(data) => data,
                    Err(err) => {
                        self.diagnostics.emit(Diagnostic::EncodeFailed {
                            key: key.to_owned(),
                            reason: err.to_string(),
                        });
                        return;
                    }
                };
                if kind == EventKind::Added {
                    ("add", store.add(key, &data))
                } else {
                    ("update", store.update(key, &data))
                }
            }
        };

        self.check(operation, key, result);
    }

    /// Deletes a key that is not in memory.
    pub(crate) fn delete(&self, key: &str, origin: Origin) {
        if let Some(store) = self.writable(origin) {
            self.check("delete", key, store.delete(key));
        }
    }

    /// Reads a key from the store after an in-memory miss.
    pub(crate) fn fetch(&self, key: &str) -> Option<V> {
        let store = self.store.as_ref()?;
        tracing::trace!(key, "read-through");
        match store.get(key) {
            Ok(value) => value,
            Err(err) => {
                self.report("get", key, &err);
                None
            }
        }
    }

    fn writable(&self, origin: Origin) -> Option<&Arc<dyn Store<V>>> {
        match origin {
            Origin::Caller => self.store.as_ref(),
            Origin::Store => None,
        }
    }

    fn check(&self, operation: &'static str, key: &str, result: Result<(), StoreError>) {
        if let Err(err) = result {
            self.report(operation, key, &err);
        }
    }

    fn report(&self, operation: &'static str, key: &str, err: &StoreError) {
        self.diagnostics.emit(Diagnostic::StoreFailed {
            operation,
            key: key.to_owned(),
            reason: err.to_string(),
        });
    }
}

impl<V> fmt::Debug for StoreBridge<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBridge")
            .field("configured", &self.store.is_some())
            .finish()
    }
}

// =============================================================================
// MemoryStore - in-process reference implementation
// =============================================================================

/// A call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Add(String, Vec<u8>),
    Update(String, Vec<u8>),
    Delete(String),
    Get(String),
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, Vec<u8>>,
    journal: Vec<StoreOp>,
}

/// A [`Store`] backed by a map of JSON documents.
///
/// Every call is appended to a journal, which makes it useful for checking
/// exactly what a list wrote through.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use linkmap::{KeyedList, MemoryStore, StoreOp};
///
/// let store = Arc::new(MemoryStore::<u32>::new());
/// let list = KeyedList::<u32>::with_store(Arc::clone(&store));
///
/// list.add_last("k", 7).unwrap();
/// assert_eq!(store.journal(), vec![StoreOp::Add("k".into(), b"7".to_vec())]);
/// ```
pub struct MemoryStore<V> {
    state: Mutex<MemoryState>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            _marker: PhantomData,
        }
    }

    /// Raw bytes stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().records.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every call received so far, oldest first.
    pub fn journal(&self) -> Vec<StoreOp> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }
}

impl<V: Serialize> MemoryStore<V> {
    /// Stores a value directly, bypassing the journal.
    pub fn seed(&self, key: impl Into<String>, value: &V) -> Result<(), StoreError> {
        let data = serde_json::to_vec(value).map_err(|err| StoreError::Backend(Box::new(err)))?;
        self.state.lock().records.insert(key.into(), data);
        Ok(())
    }
}

impl<V: DeserializeOwned> Store<V> for MemoryStore<V> {
    fn add(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.journal.push(StoreOp::Add(key.to_owned(), data.to_vec()));
        state.records.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn update(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state
            .journal
            .push(StoreOp::Update(key.to_owned(), data.to_vec()));
        state.records.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.journal.push(StoreOp::Delete(key.to_owned()));
        state.records.remove(key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let mut state = self.state.lock();
        state.journal.push(StoreOp::Get(key.to_owned()));
        state
            .records
            .get(key)
            .map(|data| serde_json::from_slice(data))
            .transpose()
            .map_err(|err| StoreError::Backend(Box::new(err)))
    }
}

impl<V> fmt::Debug for MemoryStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("records", &state.records.len())
            .field("journal", &state.journal.len())
            .finish()
    }
}
