//! Event delivery under backpressure.
//!
//! A list owns at most one [`Sink`]. Each committed mutation produces one
//! [`Event`], and the [`Broadcaster`] decides how it reaches the sink:
//!
//! ```text
//! len + capacity / margin_divisor <= capacity   -> send() on the caller's thread
//! otherwise (near full), per OnNearFull:
//!     SpawnDetached  -> send() on a new thread, caller returns at once
//!     BlockingSend   -> send() on the caller's thread
//!     DropOldest     -> force_send(), displacing the oldest buffered event
//! ```
//!
//! Synchronous sends preserve commit order. Detached sends do not: two
//! detached deliveries may land in either order, and a later synchronous
//! send can overtake both. Detached threads are never joined or cancelled,
//! so a consumer that stops draining leaves them parked forever;
//! [`KeyedList::pending_deliveries`](crate::KeyedList::pending_deliveries)
//! exposes the count. `DropOldest` bounds memory instead, at the cost of
//! losing events.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use linkmap_sink::{DEFAULT_SNOOZE_ITERS, Sink, sink_with_config};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::event::Event;

/// Capacity of a sink created without an explicit size.
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Reserve one tenth of the sink as the near-full margin.
pub const DEFAULT_MARGIN_DIVISOR: usize = 10;

/// Name given to detached delivery threads.
const DELIVERY_THREAD_NAME: &str = "linkmap-deliver";

/// What to do with an event when the sink is near capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnNearFull {
    /// Deliver on a detached thread and return immediately.
    #[default]
    SpawnDetached,
    /// Deliver on the caller's thread, blocking until there is room.
    BlockingSend,
    /// Deliver without blocking, displacing the oldest buffered event.
    DropOldest,
}

/// Backpressure policy for event delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryPolicy {
    /// Capacity of a sink created by the list.
    pub capacity: usize,

    /// The near-full margin is `capacity / margin_divisor`. Zero disables
    /// the margin, so every event is sent synchronously.
    pub margin_divisor: usize,

    /// Behavior once the margin is breached.
    pub on_near_full: OnNearFull,

    /// Backoff iterations before a blocked send parks.
    pub snooze_iters: usize,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SINK_CAPACITY,
            margin_divisor: DEFAULT_MARGIN_DIVISOR,
            on_near_full: OnNearFull::default(),
            snooze_iters: DEFAULT_SNOOZE_ITERS,
        }
    }
}

impl DeliveryPolicy {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_margin_divisor(mut self, margin_divisor: usize) -> Self {
        self.margin_divisor = margin_divisor;
        self
    }

    pub fn with_on_near_full(mut self, on_near_full: OnNearFull) -> Self {
        self.on_near_full = on_near_full;
        self
    }

    pub fn with_snooze_iters(mut self, snooze_iters: usize) -> Self {
        self.snooze_iters = snooze_iters;
        self
    }

    /// Slots reserved at the top of a sink of the given capacity.
    #[inline]
    pub fn margin(&self, capacity: usize) -> usize {
        capacity.checked_div(self.margin_divisor).unwrap_or(0)
    }

    /// Returns `true` once `len` has entered the reserved margin.
    #[inline]
    pub fn is_near_full(&self, len: usize, capacity: usize) -> bool {
        len + self.margin(capacity) > capacity
    }
}

/// Routes events to the installed sink.
pub(crate) struct Broadcaster<V> {
    sink: Option<Sink<Event<V>>>,
    policy: DeliveryPolicy,
    outstanding: Arc<AtomicUsize>,
    diagnostics: Diagnostics,
}

impl<V: Send + 'static> Broadcaster<V> {
    pub(crate) fn new(policy: DeliveryPolicy, diagnostics: Diagnostics) -> Self {
        Self {
            sink: None,
            policy,
            outstanding: Arc::new(AtomicUsize::new(0)),
            diagnostics,
        }
    }

    /// Installs `sink` unless one is already present.
    pub(crate) fn install(&mut self, sink: Sink<Event<V>>) -> bool {
        if self.sink.is_some() {
            return false;
        }
        self.sink = Some(sink);
        true
    }

    /// Returns the installed sink, creating one of `capacity` (at least 1)
    /// if there is none.
    pub(crate) fn get_or_create(&mut self, capacity: usize) -> Sink<Event<V>> {
        let snooze_iters = self.policy.snooze_iters;
        self.sink
            .get_or_insert_with(|| sink_with_config(capacity.max(1), snooze_iters))
            .clone()
    }

    pub(crate) fn sink(&self) -> Option<&Sink<Event<V>>> {
        self.sink.as_ref()
    }

    pub(crate) fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Detached deliveries spawned but not yet enqueued.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Delivers `event` according to the policy. A no-op without a sink.
    pub(crate) fn broadcast(&self, event: Event<V>) {
        let Some(sink) = &self.sink else {
            return;
        };

        if !self.policy.is_near_full(sink.len(), sink.capacity()) {
            tracing::trace!(key = %event.key, kind = %event.kind, "synchronous delivery");
            sink.send(event);
            return;
        }

        match self.policy.on_near_full {
            OnNearFull::BlockingSend => {
                tracing::trace!(key = %event.key, kind = %event.kind, "blocking near capacity");
                sink.send(event);
            }
            OnNearFull::DropOldest => {
                tracing::trace!(key = %event.key, kind = %event.kind, "forcing near capacity");
                if let Some(displaced) = sink.force_send(event) {
                    self.diagnostics.emit(Diagnostic::EventDropped {
                        key: displaced.key,
                        kind: displaced.kind,
                    });
                }
            }
            OnNearFull::SpawnDetached => self.spawn_detached(sink, event),
        }
    }

    fn spawn_detached(&self, sink: &Sink<Event<V>>, event: Event<V>) {
        let key = event.key.clone();
        let outstanding = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(key = %key, outstanding, "detached delivery near capacity");
        self.diagnostics.emit(Diagnostic::DetachedDelivery {
            key: key.clone(),
            outstanding,
        });

        // The event rides in a shared slot so it can be reclaimed if the
        // thread never starts.
        let handoff = Arc::new(Mutex::new(Some(event)));
        let task_handoff = Arc::clone(&handoff);
        let task_sink = sink.clone();
        let task_outstanding = Arc::clone(&self.outstanding);

        let spawned = thread::Builder::new()
            .name(DELIVERY_THREAD_NAME.to_owned())
            .spawn(move || {
                let event = task_handoff.lock().take();
                if let Some(event) = event {
                    task_sink.send(event);
                }
                task_outstanding.fetch_sub(1, Ordering::AcqRel);
            });

        if let Err(err) = spawned {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            self.diagnostics.emit(Diagnostic::SpawnFailed {
                key,
                reason: err.to_string(),
            });
            let event = handoff.lock().take();
            if let Some(event) = event {
                sink.send(event);
            }
        }
    }
}

impl<V> fmt::Debug for Broadcaster<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("sink", &self.sink)
            .field("policy", &self.policy)
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish()
    }
}
