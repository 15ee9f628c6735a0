//! Write-through and read-through against a store.

use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use linkmap::{Diagnostic, Event, EventKind, KeyedList, MemoryStore, Store, StoreError, StoreOp};
use parking_lot::Mutex;

type Recorded = Arc<Mutex<Vec<Diagnostic>>>;

fn recorder() -> (Recorded, impl Fn(&Diagnostic) + Send + Sync + 'static) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |d: &Diagnostic| sink.lock().push(d.clone()))
}

// ============================================================================
// Write-through
// ============================================================================

#[test]
fn every_mutation_writes_through() {
    let store = Arc::new(MemoryStore::<u32>::new());
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));

    list.add_last("a", 1).unwrap();
    list.add_first("b", 2).unwrap();
    list.add_after("c", 3, "a").unwrap();
    list.add_or_update("a", 10);
    list.update("b", 20).unwrap();
    list.remove_first();
    list.remove_last();

    assert_eq!(
        store.journal(),
        vec![
            StoreOp::Add("a".into(), b"1".to_vec()),
            StoreOp::Add("b".into(), b"2".to_vec()),
            StoreOp::Add("c".into(), b"3".to_vec()),
            StoreOp::Update("a".into(), b"10".to_vec()),
            StoreOp::Update("b".into(), b"20".to_vec()),
            StoreOp::Delete("b".into()),
            StoreOp::Delete("c".into()),
        ]
    );
    assert_eq!(store.raw("a"), Some(b"10".to_vec()));
    assert_eq!(store.len(), 1);
}

#[test]
fn failed_structural_operations_do_not_write() {
    let store = Arc::new(MemoryStore::<u32>::new());
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));
    list.add_last("a", 1).unwrap();
    store.clear_journal();

    let _ = list.add_last("a", 2);
    let _ = list.add_before("b", 2, "missing");
    let _ = list.update("missing", 2);
    assert!(!list.add_if_absent("a", 3));
    list.remove_after("a");

    assert!(store.journal().is_empty());
}

#[test]
fn removing_absent_key_still_deletes_from_store() {
    let store = Arc::new(MemoryStore::<u32>::new());
    store.seed("cold", &7).unwrap();
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));

    assert_eq!(list.remove("cold"), None);
    assert_eq!(store.journal(), vec![StoreOp::Delete("cold".into())]);
    assert!(!store.contains("cold"));
}

// ============================================================================
// Read-through
// ============================================================================

#[test]
fn find_reads_through_and_caches() {
    let store = Arc::new(MemoryStore::<u32>::new());
    store.seed("cold", &42).unwrap();
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));
    let (_, events) = list.create_sink(16);

    assert_eq!(list.find("cold"), Some(42));
    assert!(list.contains_key("cold"));
    assert_eq!(list.tail(), Some(("cold".into(), 42)));

    // Second lookup is served from memory
    assert_eq!(list.find("cold"), Some(42));

    // Fetched, never written back
    assert_eq!(store.journal(), vec![StoreOp::Get("cold".into())]);
    assert_eq!(events.try_recv(), Some(Event::added("cold", 42)));
    assert!(events.is_empty());
}

#[test]
fn find_miss_everywhere() {
    let store = Arc::new(MemoryStore::<u32>::new());
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));

    assert_eq!(list.find("nowhere"), None);
    assert!(list.is_empty());
}

#[test]
fn find_without_store_is_memory_only() {
    let list: KeyedList<u32> = KeyedList::new();
    assert!(!list.has_store());
    assert_eq!(list.find("k"), None);
}

// ============================================================================
// Store-originated mutations
// ============================================================================

#[test]
fn store_originated_changes_are_not_echoed() {
    let store = Arc::new(MemoryStore::<u32>::new());
    let list: KeyedList<u32> = KeyedList::with_store(Arc::clone(&store));
    let (_, events) = list.create_sink(16);

    assert_eq!(list.upsert_from_store("a", 1), EventKind::Added);
    assert_eq!(list.upsert_from_store("a", 2), EventKind::Updated);
    assert_eq!(list.remove_from_store("a"), Some(2));
    assert_eq!(list.remove_from_store("a"), None);

    assert!(store.journal().is_empty());
    let kinds: Vec<_> = events.try_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Added, EventKind::Updated, EventKind::Deleted]
    );
}

// ============================================================================
// Failures
// ============================================================================

struct Offline;

impl Store<u32> for Offline {
    fn add(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn update(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn get(&self, _key: &str) -> Result<Option<u32>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[test]
fn store_failures_do_not_fail_mutations() {
    let (seen, hook) = recorder();
    let list: KeyedList<u32> = KeyedList::builder()
        .store(Offline)
        .diagnostics(hook)
        .build();

    list.add_last("a", 1).unwrap();
    list.update("a", 2).unwrap();
    assert_eq!(list.find("missing"), None);
    assert_eq!(list.remove("a"), Some(2));
    assert!(list.is_empty());

    let operations: Vec<_> = seen
        .lock()
        .iter()
        .filter_map(|d| match d {
            Diagnostic::StoreFailed { operation, .. } => Some(*operation),
            _ => None,
        })
        .collect();
    assert_eq!(operations, vec!["add", "update", "get", "delete"]);
}

/// A value whose serialization always fails.
#[derive(Debug, Clone, PartialEq)]
struct Opaque(u32);

impl serde::Serialize for Opaque {
    fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("opaque values cannot be encoded"))
    }
}

#[derive(Default)]
struct CountingStore {
    writes: Mutex<usize>,
}

impl Store<Opaque> for CountingStore {
    fn add(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        *self.writes.lock() += 1;
        Ok(())
    }

    fn update(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        *self.writes.lock() += 1;
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        *self.writes.lock() += 1;
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<Opaque>, StoreError> {
        Ok(None)
    }
}

#[test]
fn encode_failure_is_surfaced_and_skips_the_store() {
    let store = Arc::new(CountingStore::default());
    let (seen, hook) = recorder();
    let list: KeyedList<Opaque> = KeyedList::builder()
        .store(Arc::clone(&store))
        .diagnostics(hook)
        .build();

    list.add_last("a", Opaque(1)).unwrap();
    assert_eq!(list.find("a"), Some(Opaque(1)));
    assert_eq!(*store.writes.lock(), 0);

    let encode_failures: Vec<_> = seen
        .lock()
        .iter()
        .filter_map(|d| match d {
            Diagnostic::EncodeFailed { key, reason } => Some((key.clone(), reason.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(encode_failures.len(), 1);
    assert_eq!(encode_failures[0].0, "a");
    assert!(encode_failures[0].1.contains("opaque values cannot be encoded"));

    // Deletes carry no payload, so they still go through
    list.remove("a");
    assert_eq!(*store.writes.lock(), 1);
}

// ============================================================================
// Locking
// ============================================================================

/// Blocks inside `add` until released.
struct GatedStore {
    entered: Barrier,
    release: Barrier,
}

impl Store<u32> for GatedStore {
    fn add(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        self.entered.wait();
        self.release.wait();
        Ok(())
    }

    fn update(&self, _key: &str, _data: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<u32>, StoreError> {
        Ok(None)
    }
}

#[test]
fn readers_wait_for_write_through() {
    let store = Arc::new(GatedStore {
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let list = Arc::new(KeyedList::<u32>::with_store(Arc::clone(&store)));

    let writer = {
        let list = Arc::clone(&list);
        thread::spawn(move || list.add_last("k", 1).unwrap())
    };

    // Writer is now inside the store call, holding the list lock
    store.entered.wait();

    let (tx, rx) = mpsc::channel();
    let reader = {
        let list = Arc::clone(&list);
        thread::spawn(move || tx.send(list.find("k")).unwrap())
    };

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    store.release.wait();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Some(1));

    writer.join().unwrap();
    reader.join().unwrap();
}
