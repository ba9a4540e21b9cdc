//! The unbounded Michael–Scott lock-free FIFO queue.
//!
//! Every dereference of `head`, `tail`, and `next` goes through a
//! [`HazardPointer`], grounded on the corpus's own hazard-pointer MS-queue
//! (`pelyams-lock-freedom`'s `MSQueue`) generalized to this crate's
//! bucket/record/group hazard machinery instead of a flat per-thread
//! hazard-pointer array.

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{AtomicPtr, Ordering};
use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::ptr;

#[cfg(feature = "check-loom")]
use loom::sync::atomic::{AtomicPtr, Ordering};

use crate::config::QueueConfig;
use crate::group::HazardGroup;
use crate::handle::HazardPointer;
use crate::registry::HazardRegistry;

struct Node<V> {
    /// Holds a live `V` for every node except the current sentinel, whose
    /// slot is either never initialized (the node allocated by
    /// `Queue::new`) or has already been read out by the dequeue that
    /// promoted it to sentinel. Using `MaybeUninit` rather than `Option`
    /// avoids an extra discriminant and matches the corpus's
    /// `ManuallyDrop`-backed node value slots (e.g. `Lee-Janggun`'s
    /// `ebr`-based MS-queue).
    value: UnsafeCell<MaybeUninit<V>>,
    next: AtomicPtr<Node<V>>,
}

impl<V> Node<V> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn with_value(value: V) -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// An unbounded, lock-free, multi-producer/multi-consumer FIFO queue.
///
/// Every operation requires the calling thread to have (or lazily acquire)
/// a hazard record against the queue's registry; see [`crate::HazardContext`]
/// for callers that want to control when that record is released.
pub struct Queue<V> {
    head: AtomicPtr<Node<V>>,
    tail: AtomicPtr<Node<V>>,
    registry: &'static HazardRegistry,
    config: QueueConfig,
}

// SAFETY: `V` values only ever cross between threads through the queue's
// own synchronization (CAS on `head`/`tail`/`next`); the queue itself holds
// no non-atomic shared mutable state outside what hazard pointers guard.
unsafe impl<V: Send> Send for Queue<V> {}
unsafe impl<V: Send> Sync for Queue<V> {}

impl<V: 'static> Queue<V> {
    /// Creates an empty queue backed by the crate's process-wide default
    /// hazard registry and default tunables.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Creates an empty queue backed by the default registry with custom
    /// tunables (e.g. [`QueueConfig::aggressive_flush`] for `HAZARD_FLUSH_SIZE=1`
    /// stress runs).
    pub fn with_config(config: QueueConfig) -> Self {
        Self::with_registry(crate::hazards(), config)
    }

    /// Creates an empty queue backed by an explicit registry — typically
    /// one obtained from [`HazardRegistry::leak`] for test isolation.
    pub fn with_registry(registry: &'static HazardRegistry, config: QueueConfig) -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            registry,
            config,
        }
    }

    /// Appends `value`. Never blocks and never reports failure; the only
    /// way this can fail to make progress is allocation failure, which
    /// aborts the process per Rust's global allocator policy.
    pub fn enqueue(&self, value: V) {
        let new_node = Node::with_value(value);
        let group: HazardGroup<'_, 1> = HazardGroup::new(self.registry);
        let th = HazardPointer::<Node<V>>::new(&group);

        loop {
            let tail_ptr = th.load(&self.tail);
            // SAFETY: `tail_ptr` was just hazard-protected by `th.load`.
            let tail_ref = unsafe { &*tail_ptr };
            let next = tail_ref.next.load(Ordering::Acquire);

            if !next.is_null() {
                // `tail` is lagging behind the true tail; help it catch up
                // and retry rather than linking past it.
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                tracing::trace!("enqueue: helped advance lagging tail");
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(
                    ptr::null_mut(),
                    new_node,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                // best-effort: advance tail to the node we just linked.
                // failure is fine, a later operation will finish the job.
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    new_node,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                return;
            }
        }
    }

    /// Attempts to dequeue one value without blocking.
    ///
    /// Returns `false` iff the queue was observed empty at some point
    /// during the call; this is a normal outcome, not an error.
    pub fn dequeue_try(&self) -> Option<V> {
        let group: HazardGroup<'_, 2> = HazardGroup::new(self.registry);
        let hh = HazardPointer::<Node<V>>::new(&group);
        let nh = HazardPointer::<Node<V>>::new(&group);

        loop {
            let head_ptr = hh.load(&self.head);
            // SAFETY: `head_ptr` is hazard-protected by `hh`.
            let head_ref = unsafe { &*head_ptr };
            let next_ptr = nh.load(&head_ref.next);

            if self.head.load(Ordering::Acquire) != head_ptr {
                continue;
            }

            let tail_ptr = self.tail.load(Ordering::Acquire);
            if head_ptr == tail_ptr {
                if next_ptr.is_null() {
                    return None;
                }
                // tail is lagging one behind the sentinel; help it along.
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next_ptr,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }

            if next_ptr.is_null() {
                // transient inconsistency between our hazard-protected reads;
                // never assume progress from a partial observation.
                continue;
            }

            // SAFETY: `next_ptr` is hazard-protected by `nh` and, being
            // non-sentinel at this point, holds an initialized value that
            // nobody else has read yet (only the thread whose CAS below
            // succeeds is entitled to keep this copy).
            let value = unsafe { ptr::read((*next_ptr).value.get() as *const V) };

            if self
                .head
                .compare_exchange(head_ptr, next_ptr, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: `head_ptr` is now unreachable from `head`, and was
                // never observable from `tail` or any `next` pointer other
                // than the one we just overwrote via this CAS.
                unsafe { hh.retire(self.registry, self.config.flush_size) };
                return Some(value);
            }

            // lost the race: someone else advanced head first. our copy of
            // `value` is a bitwise duplicate of memory the winning thread
            // will also read; forget it rather than drop it to avoid a
            // double-drop, and restart.
            mem::forget(value);
        }
    }

    /// Returns `true` if the queue is observed empty at the moment of the
    /// call. Advisory only: a concurrent enqueue/dequeue can invalidate the
    /// result immediately after it's returned.
    pub fn is_empty(&self) -> bool {
        let group: HazardGroup<'_, 2> = HazardGroup::new(self.registry);
        let hh = HazardPointer::<Node<V>>::new(&group);
        let nh = HazardPointer::<Node<V>>::new(&group);
        let head_ptr = hh.load(&self.head);
        let head_ref = unsafe { &*head_ptr };
        nh.load(&head_ref.next).is_null()
    }
}

impl<V: 'static> Default for Queue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for Queue<V> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` proves no other thread holds a reference to
        // this queue, so no hazard pointer anywhere can be protecting any
        // of its nodes; a plain, non-atomic walk is sound here.
        let mut current = *self.head.get_mut();
        if current.is_null() {
            return;
        }
        // the sentinel's value slot is always uninitialized; free it
        // without touching `value`.
        let mut next = unsafe { (*current).next.load(Ordering::Relaxed) };
        drop(unsafe { Box::from_raw(current) });
        current = next;

        while !current.is_null() {
            next = unsafe { (*current).next.load(Ordering::Relaxed) };
            unsafe { ptr::drop_in_place((*(*current).value.get()).as_mut_ptr()) };
            drop(unsafe { Box::from_raw(current) });
            current = next;
        }
    }
}
