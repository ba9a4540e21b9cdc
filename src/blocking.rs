//! A blocking wrapper over [`Queue`], grounded on the original C++ source's
//! semaphore-paired queue (`rcv_wait_lockfree_queue.hpp`): every enqueue
//! posts to a [`CountingSemaphore`], every `dequeue_wait` blocks on it
//! before touching the queue, so a waiter is never woken to find nothing
//! there.
//!
//! `close()` has no counterpart in the C++ source, which provides no
//! shutdown path at all. It's added here because a wrapper that can block
//! forever with no way to release its waiters is a poor fit for Rust's
//! structured-concurrency idioms (threads are expected to join).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::QueueConfig;
use crate::queue::Queue;
use crate::registry::HazardRegistry;
use crate::semaphore::CountingSemaphore;

/// An unbounded MPMC queue with a blocking `dequeue_wait`, plus a one-way
/// `close()` that wakes every blocked waiter without requiring the queue to
/// be empty first.
pub struct BlockingQueue<T> {
    queue: Queue<T>,
    items: CountingSemaphore,
    closed: AtomicBool,
    waiting: AtomicUsize,
}

impl<T: 'static> BlockingQueue<T> {
    /// Creates an empty queue backed by the crate's process-wide default
    /// hazard registry and default tunables.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Creates an empty queue backed by the default registry with custom
    /// tunables.
    pub fn with_config(config: QueueConfig) -> Self {
        Self::with_registry(crate::hazards(), config)
    }

    /// Creates an empty queue backed by an explicit registry.
    pub fn with_registry(registry: &'static HazardRegistry, config: QueueConfig) -> Self {
        Self {
            queue: Queue::with_registry(registry, config),
            items: CountingSemaphore::new(0),
            closed: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Appends `value` and wakes one waiter if any is blocked in
    /// `dequeue_wait`. Succeeds even after `close()`.
    pub fn enqueue(&self, value: T) {
        self.queue.enqueue(value);
        self.items.post();
    }

    /// Attempts to dequeue one value without blocking.
    pub fn dequeue_try(&self) -> Option<T> {
        self.queue.dequeue_try()
    }

    /// Blocks until a value is available or the queue is closed and
    /// drained, whichever happens first.
    ///
    /// Returns `None` only when the queue has been [`Self::close`]d and has
    /// no remaining values; a `None` result is therefore a permanent signal
    /// that no further call will ever return `Some`.
    pub fn dequeue_wait(&self) -> Option<T> {
        loop {
            // `waiting`'s RMW and `closed`'s load must be SeqCst, matching
            // `close`'s SeqCst store/load: plain release/acquire only
            // orders each pair of accesses against each other, not against
            // the other thread's store-buffer, so the store/load
            // (Dekker-style) handshake between this and `close` needs the
            // single total order SeqCst provides to rule out both sides
            // observing the other's pre-update value and the waiter
            // blocking forever on a `close` that thinks nobody is waiting.
            self.waiting.fetch_add(1, Ordering::SeqCst);
            if self.closed.load(Ordering::SeqCst) {
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                return self.queue.dequeue_try();
            }
            self.items.wait();
            self.waiting.fetch_sub(1, Ordering::AcqRel);

            if let Some(value) = self.queue.dequeue_try() {
                return Some(value);
            }
            // woken with nothing to take: this was one of close()'s
            // synthetic permits handed to an already-registered waiter.
            // loop back around to take the closed fast path.
        }
    }

    /// Signals shutdown and wakes every thread currently blocked in
    /// `dequeue_wait`. Idempotent.
    ///
    /// After this call, `dequeue_wait` never blocks again: it drains
    /// whatever remains in the queue and then returns `None` forever.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let waiters = self.waiting.load(Ordering::SeqCst);
        if waiters > 0 {
            self.items.post_n(waiters);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T: 'static> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HazardRegistry;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn fresh<T: 'static>() -> BlockingQueue<T> {
        BlockingQueue::with_registry(HazardRegistry::leak(), QueueConfig::default())
    }

    #[test]
    fn dequeue_wait_returns_immediately_when_nonempty() {
        let q: BlockingQueue<i32> = fresh();
        q.enqueue(1);
        assert_eq!(q.dequeue_wait(), Some(1));
    }

    #[test]
    fn blocked_waiter_wakes_on_enqueue() {
        let q = Arc::new(fresh::<i32>());
        let reader = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue_wait())
        };
        thread::sleep(Duration::from_millis(20));
        q.enqueue(42);
        assert_eq!(reader.join().unwrap(), Some(42));
    }

    #[test]
    fn close_wakes_blocked_waiters_with_none() {
        let q = Arc::new(fresh::<i32>());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.dequeue_wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        q.close();
        for r in readers {
            assert_eq!(r.join().unwrap(), None);
        }
    }

    #[test]
    fn close_drains_remaining_values_before_returning_none() {
        let q: BlockingQueue<i32> = fresh();
        q.enqueue(1);
        q.enqueue(2);
        q.close();
        assert_eq!(q.dequeue_wait(), Some(1));
        assert_eq!(q.dequeue_wait(), Some(2));
        assert_eq!(q.dequeue_wait(), None);
        assert_eq!(q.dequeue_wait(), None);
    }

    #[test]
    fn close_is_idempotent() {
        let q: BlockingQueue<i32> = fresh();
        q.close();
        q.close();
        assert!(q.is_closed());
        assert_eq!(q.dequeue_wait(), None);
    }
}
