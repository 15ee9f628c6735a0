//! Change notifications emitted by a [`KeyedList`](crate::KeyedList).

use serde::Serialize;

/// What a committed mutation did to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new node was linked into the list.
    Added,
    /// An existing node's value was replaced in place.
    Updated,
    /// A node was unlinked and evicted.
    Deleted,
}

impl EventKind {
    /// Returns the lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation.
///
/// `value` is a snapshot taken when the mutation committed. Later updates
/// to the same key do not show through an event already in a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event<V> {
    pub key: String,
    pub value: V,
    pub kind: EventKind,
}

impl<V> Event<V> {
    pub fn new(key: impl Into<String>, value: V, kind: EventKind) -> Self {
        Self {
            key: key.into(),
            value,
            kind,
        }
    }

    pub fn added(key: impl Into<String>, value: V) -> Self {
        Self::new(key, value, EventKind::Added)
    }

    pub fn updated(key: impl Into<String>, value: V) -> Self {
        Self::new(key, value, EventKind::Updated)
    }

    pub fn deleted(key: impl Into<String>, value: V) -> Self {
        Self::new(key, value, EventKind::Deleted)
    }
}
