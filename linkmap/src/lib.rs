//! Keyed, ordered, doubly-linked list with change events and write-through
//! storage.
//!
//! A [`KeyedList`] is a map and a linked list at once: every key is unique
//! and found in O(1), every node has a position, and inserting next to or
//! removing a known key is O(1) as well.
//!
//! # Design
//!
//! Nodes never point at each other. They live in an [`Arena`] and link to
//! their neighbors by [`Handle`]:
//!
//! ```text
//! index: HashMap<String, u32>       "a" -> 0   "b" -> 2   "c" -> 1
//!
//! arena: [0] a  prev=NONE next=2
//!        [1] c  prev=2    next=NONE
//!        [2] b  prev=0    next=1
//!
//! chain: head=0 tail=1 len=3        a <-> b <-> c
//! ```
//!
//! The arena owns every node, the index and chain only hold handles, and a
//! removed slot goes on a free list for the next insert.
//!
//! Around that structure sit three collaborators:
//!
//! - a single event [`Sink`] receiving one [`Event`] per committed mutation,
//!   with a configurable [`DeliveryPolicy`] for when the sink is near full;
//! - an optional [`Store`] that mutations are written through to and that
//!   [`KeyedList::find`] reads through on a miss;
//! - an optional [`DiagnosticHook`] observing mutations and recoverable
//!   failures, alongside `tracing` output.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use linkmap::{EventKind, KeyedList, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::<u64>::new());
//! let list = KeyedList::<u64>::with_store(Arc::clone(&store));
//! let (_, events) = list.create_sink(128);
//!
//! list.add_last("a", 1).unwrap();
//! list.add_after("b", 2, "a").unwrap();
//!
//! assert_eq!(list.next("a"), Some(("b".to_owned(), 2)));
//! assert_eq!(events.recv().kind, EventKind::Added);
//! assert!(store.contains("b"));
//!
//! // Misses fall through to the store
//! store.seed("c", &3).unwrap();
//! assert_eq!(list.find("c"), Some(3));
//! assert_eq!(list.keys(), vec!["a", "b", "c"]);
//! ```
//!
//! # Building Blocks
//!
//! [`Arena`] and [`Chain`] are public and usable on their own:
//!
//! ```
//! use linkmap::{Arena, Chain, Node};
//!
//! let mut arena: Arena<Node<&str>> = Arena::with_capacity(16);
//! let mut chain: Chain<&str, Arena<Node<&str>>> = Chain::new();
//!
//! let b = chain.push_back(&mut arena, "b");
//! chain.push_front(&mut arena, "a");
//! chain.insert_after(&mut arena, b, "c");
//!
//! assert_eq!(chain.iter(&arena).copied().collect::<Vec<_>>(), ["a", "b", "c"]);
//! ```
//!
//! # Features
//!
//! - `slab`: implements [`Storage`] for `slab::Slab`, so a [`Chain`] can
//!   live in a slab instead of an [`Arena`].

pub mod arena;
pub mod chain;
pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod handle;
pub mod list;
pub mod store;

pub use arena::{Arena, Storage};
pub use chain::{Chain, Node};
pub use config::ListConfig;
pub use delivery::{DeliveryPolicy, OnNearFull};
pub use diagnostics::{Diagnostic, DiagnosticHook};
pub use error::{ConfigError, ListError, Result};
pub use event::{Event, EventKind};
pub use handle::Handle;
pub use list::{KeyedList, KeyedListBuilder};
pub use store::{MemoryStore, Store, StoreError, StoreOp};

pub use linkmap_sink::{Full, Sink, sink};
