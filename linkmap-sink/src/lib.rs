//! A bounded event sink with blocking semantics and observable occupancy.
//!
//! This crate wraps `crossbeam_queue`'s lock-free [`ArrayQueue`] and adds
//! blocking send/recv operations with the same parking strategy as a
//! single-producer channel: try the queue, back off, and only then park.
//!
//! Unlike a plain channel, a [`Sink`] is a single cloneable handle. The
//! producer side (a keyed list broadcasting change events) and the consumer
//! side share the same handle type, and the producer can read the current
//! occupancy with [`Sink::len`] to decide how to deliver.
//!
//! # Delivery Modes
//!
//! ```text
//! send()        -> push -> backoff -> park until room     (blocking, ordered)
//! try_send()    -> push or Err(Full)                        (never blocks)
//! force_send()  -> push, displacing the oldest when full    (never blocks)
//! ```
//!
//! # Example
//!
//! ```
//! use linkmap_sink::sink;
//!
//! let events = sink::<u64>(1024);
//! let consumer = events.clone();
//!
//! // Blocking send - waits if the buffer is full
//! events.send(42);
//!
//! // Blocking recv - waits if the buffer is empty
//! assert_eq!(consumer.recv(), 42);
//! ```
//!
//! # Non-blocking Operations
//!
//! ```
//! use linkmap_sink::{sink, Full};
//!
//! let events = sink::<u64>(2);
//!
//! events.try_send(1).unwrap();
//! events.try_send(2).unwrap();
//! assert_eq!(events.try_send(3), Err(Full(3)));
//!
//! // force_send makes room by dropping the oldest entry
//! assert_eq!(events.force_send(3), Some(1));
//!
//! assert_eq!(events.try_recv(), Some(2));
//! assert_eq!(events.try_recv(), Some(3));
//! assert_eq!(events.try_recv(), None);
//! ```
//!
//! # Parking
//!
//! Parked senders and receivers are counted in cache-padded atomics. A
//! producer only takes the park lock to wake a receiver when the receiver
//! count is non-zero, and vice versa:
//!
//! ```text
//! Receiver:                          Sender:
//! ─────────────────────              ─────────────────────
//! lock()
//! parked_receivers += 1 [SeqCst]
//! pop() -> empty                     push(data)
//! wait() (releases lock)             load(parked_receivers) [SeqCst] -> 1
//!                                    lock(); notify_one()
//! ```
//!
//! The re-check after the increment, done while holding the lock, closes
//! the window in which a wakeup could be missed.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot::{Condvar, Mutex};

/// Default number of backoff snooze iterations before parking.
///
/// Each snooze uses `crossbeam_utils::Backoff::snooze()` which starts with
/// spinning and eventually yields to the OS scheduler.
pub const DEFAULT_SNOOZE_ITERS: usize = 8;

/// State shared by every clone of a [`Sink`].
struct Shared<T> {
    queue: ArrayQueue<T>,
    park_lock: Mutex<()>,
    not_full: Condvar,
    not_empty: Condvar,
    parked_senders: CachePadded<AtomicUsize>,
    parked_receivers: CachePadded<AtomicUsize>,
    snooze_iters: usize,
}

/// A bounded, cloneable event queue.
///
/// All clones refer to the same buffer. Any clone may send; the intended
/// usage is one consuming clone, although nothing prevents several.
///
/// # Example
///
/// ```
/// use linkmap_sink::sink;
/// use std::thread;
///
/// let events = sink::<i32>(10);
/// let producer = events.clone();
///
/// thread::spawn(move || {
///     producer.send(42);
/// });
///
/// assert_eq!(events.recv(), 42);
/// ```
pub struct Sink<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a sink holding at most `capacity` events.
///
/// Uses default backoff settings (8 snooze iterations before parking).
/// For custom backoff tuning, use [`sink_with_config`].
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn sink<T>(capacity: usize) -> Sink<T> {
    sink_with_config(capacity, DEFAULT_SNOOZE_ITERS)
}

/// Creates a sink with custom backoff configuration.
///
/// # Arguments
///
/// * `capacity` - Maximum number of events the sink can hold (exact, not rounded)
/// * `snooze_iters` - Number of backoff iterations before parking. Higher values
///   burn more CPU but reduce latency for bursty workloads.
///
/// # Panics
///
/// Panics if `capacity` is 0.
///
/// # Example
///
/// ```
/// use linkmap_sink::sink_with_config;
///
/// let events = sink_with_config::<u64>(100, 32);
/// assert_eq!(events.capacity(), 100);
/// ```
pub fn sink_with_config<T>(capacity: usize, snooze_iters: usize) -> Sink<T> {
    assert!(capacity > 0, "capacity must be > 0");

    Sink {
        shared: Arc::new(Shared {
            queue: ArrayQueue::new(capacity),
            park_lock: Mutex::new(()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            parked_senders: CachePadded::new(AtomicUsize::new(0)),
            parked_receivers: CachePadded::new(AtomicUsize::new(0)),
            snooze_iters,
        }),
    }
}

impl<T> Sink<T> {
    /// Sends an event, blocking while the sink is full.
    ///
    /// If the sink is full, this method will:
    /// 1. Try once (fast path)
    /// 2. Use exponential backoff with yields
    /// 3. Park the thread until a receiver frees a slot
    ///
    /// There is no timeout: a consumer that never drains blocks the
    /// caller indefinitely.
    pub fn send(&self, value: T) {
        let shared = &*self.shared;
        let mut val = value;

        // Fast path
        match shared.queue.push(val) {
            Ok(()) => {
                self.notify_receiver();
                return;
            }
            Err(v) => val = v,
        }

        // Backoff phase
        let backoff = Backoff::new();
        for _ in 0..shared.snooze_iters {
            backoff.snooze();

            match shared.queue.push(val) {
                Ok(()) => {
                    self.notify_receiver();
                    return;
                }
                Err(v) => val = v,
            }
        }

        // Park phase
        loop {
            let mut guard = shared.park_lock.lock();
            shared.parked_senders.fetch_add(1, Ordering::SeqCst);

            // Check after signaling - prevents missed wakeup race
            match shared.queue.push(val) {
                Ok(()) => {
                    shared.parked_senders.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                    self.notify_receiver();
                    return;
                }
                Err(v) => val = v,
            }

            shared.not_full.wait(&mut guard);
            shared.parked_senders.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Attempts to send an event without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the sink is full.
    #[inline]
    pub fn try_send(&self, value: T) -> Result<(), Full<T>> {
        match self.shared.queue.push(value) {
            Ok(()) => {
                self.notify_receiver();
                Ok(())
            }
            Err(v) => Err(Full(v)),
        }
    }

    /// Sends an event without blocking, displacing the oldest buffered
    /// event if the sink is full.
    ///
    /// Returns the displaced event, if any.
    #[inline]
    pub fn force_send(&self, value: T) -> Option<T> {
        let displaced = self.shared.queue.force_push(value);
        self.notify_receiver();
        displaced
    }

    /// Receives an event, blocking while the sink is empty.
    pub fn recv(&self) -> T {
        let shared = &*self.shared;

        // Fast path
        if let Some(v) = self.try_recv() {
            return v;
        }

        // Backoff phase
        let backoff = Backoff::new();
        for _ in 0..shared.snooze_iters {
            backoff.snooze();

            if let Some(v) = self.try_recv() {
                return v;
            }
        }

        // Park phase
        loop {
            let mut guard = shared.park_lock.lock();
            shared.parked_receivers.fetch_add(1, Ordering::SeqCst);

            if let Some(v) = shared.queue.pop() {
                shared.parked_receivers.fetch_sub(1, Ordering::SeqCst);
                drop(guard);
                self.notify_sender();
                return v;
            }

            shared.not_empty.wait(&mut guard);
            shared.parked_receivers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Receives an event, waiting at most `timeout` for one to arrive.
    ///
    /// Returns `None` if the sink stayed empty for the whole timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let shared = &*self.shared;
        let deadline = Instant::now() + timeout;

        if let Some(v) = self.try_recv() {
            return Some(v);
        }

        loop {
            let mut guard = shared.park_lock.lock();
            shared.parked_receivers.fetch_add(1, Ordering::SeqCst);

            if let Some(v) = shared.queue.pop() {
                shared.parked_receivers.fetch_sub(1, Ordering::SeqCst);
                drop(guard);
                self.notify_sender();
                return Some(v);
            }

            let result = shared.not_empty.wait_until(&mut guard, deadline);
            shared.parked_receivers.fetch_sub(1, Ordering::SeqCst);

            if result.timed_out() {
                drop(guard);
                return self.try_recv();
            }
        }
    }

    /// Attempts to receive an event without blocking.
    #[inline]
    pub fn try_recv(&self) -> Option<T> {
        let value = self.shared.queue.pop()?;
        self.notify_sender();
        Some(value)
    }

    /// Returns an iterator that drains the currently buffered events
    /// without blocking.
    #[inline]
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { sink: self }
    }

    /// Returns the number of buffered events.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns `true` if no events are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Returns `true` if the sink cannot accept another event without
    /// blocking or displacing.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.queue.is_full()
    }

    /// Returns the capacity of the sink.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Returns `true` if `other` refers to the same buffer.
    #[inline]
    pub fn same_sink(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Wakes a receiver if one is parked.
    ///
    /// When no receiver is parked this is just an atomic load.
    #[inline]
    fn notify_receiver(&self) {
        let shared = &*self.shared;
        if shared.parked_receivers.load(Ordering::SeqCst) > 0 {
            let _guard = shared.park_lock.lock();
            shared.not_empty.notify_one();
        }
    }

    /// Wakes a sender if one is parked waiting for room.
    #[inline]
    fn notify_sender(&self) {
        let shared = &*self.shared;
        if shared.parked_senders.load(Ordering::SeqCst) > 0 {
            let _guard = shared.park_lock.lock();
            shared.not_full.notify_one();
        }
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Non-blocking draining iterator returned by [`Sink::try_iter`].
pub struct TryIter<'a, T> {
    sink: &'a Sink<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.sink.try_recv()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error returned by [`Sink::try_send`] when the sink is full.
///
/// Contains the event that could not be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the event that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // ============================================================================
    // Basic Operations
    // ============================================================================

    #[test]
    fn basic_send_recv() {
        let s = sink::<u64>(4);

        s.send(1);
        s.send(2);
        s.send(3);

        assert_eq!(s.len(), 3);
        assert_eq!(s.recv(), 1);
        assert_eq!(s.recv(), 2);
        assert_eq!(s.recv(), 3);
        assert!(s.is_empty());
    }

    #[test]
    fn try_send_try_recv() {
        let s = sink::<u64>(2);

        assert!(s.try_send(1).is_ok());
        assert!(s.try_send(2).is_ok());
        assert!(s.is_full());
        assert_eq!(s.try_send(3), Err(Full(3)));

        assert_eq!(s.try_recv(), Some(1));
        assert_eq!(s.try_recv(), Some(2));
        assert_eq!(s.try_recv(), None);
    }

    #[test]
    fn capacity_is_exact() {
        let s = sink::<u64>(10);
        assert_eq!(s.capacity(), 10);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = sink::<u64>(0);
    }

    #[test]
    fn force_send_displaces_oldest() {
        let s = sink::<u64>(3);

        assert_eq!(s.force_send(1), None);
        assert_eq!(s.force_send(2), None);
        assert_eq!(s.force_send(3), None);
        assert_eq!(s.force_send(4), Some(1));

        let drained: Vec<_> = s.try_iter().collect();
        assert_eq!(drained, vec![2, 3, 4]);
    }

    #[test]
    fn clones_share_buffer() {
        let a = sink::<u64>(4);
        let b = a.clone();

        a.send(7);
        assert_eq!(b.len(), 1);
        assert_eq!(b.recv(), 7);
        assert!(a.same_sink(&b));
        assert!(!a.same_sink(&sink::<u64>(4)));
    }

    #[test]
    fn recv_timeout_on_empty() {
        let s = sink::<u64>(4);
        let start = Instant::now();
        assert_eq!(s.recv_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn recv_timeout_gets_late_value() {
        let s = sink::<u64>(4);
        let producer = s.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.send(9);
        });

        assert_eq!(s.recv_timeout(Duration::from_secs(5)), Some(9));
        handle.join().unwrap();
    }

    // ============================================================================
    // Blocking Behavior
    // ============================================================================

    #[test]
    fn send_blocks_until_room() {
        let s = sink::<u64>(1);
        s.send(1);

        let producer = s.clone();
        let handle = thread::spawn(move || {
            producer.send(2);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        assert_eq!(s.recv(), 1);
        handle.join().unwrap();
        assert_eq!(s.recv(), 2);
    }

    #[test]
    fn recv_blocks_until_send() {
        let s = sink::<u64>(4);
        let consumer = s.clone();

        let handle = thread::spawn(move || consumer.recv());

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        s.send(5);
        assert_eq!(handle.join().unwrap(), 5);
    }

    #[test]
    fn many_producers_one_consumer() {
        const PER_PRODUCER: u64 = 1_000;
        let s = sink::<u64>(16);

        let handles: Vec<_> = (0..4)
            .map(|p| {
                let producer = s.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        producer.send(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let mut received: Vec<u64> = (0..4 * PER_PRODUCER).map(|_| s.recv()).collect();
        for h in handles {
            h.join().unwrap();
        }

        received.sort_unstable();
        let expected: Vec<u64> = (0..4 * PER_PRODUCER).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn per_producer_order_preserved() {
        let s = sink::<u64>(8);
        let producer = s.clone();

        let handle = thread::spawn(move || {
            for i in 0..500 {
                producer.send(i);
            }
        });

        for i in 0..500 {
            assert_eq!(s.recv(), i);
        }
        handle.join().unwrap();
    }

    #[test]
    fn debug_format() {
        let s = sink::<u64>(4);
        s.send(1);
        let text = format!("{s:?}");
        assert!(text.contains("capacity: 4"));
        assert!(text.contains("len: 1"));
    }
}
