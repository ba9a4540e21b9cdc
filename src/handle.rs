//! The hazard pointer handle and its safe-load protocol.
//!
//! A handle owns exactly one published atomic slot drawn from a
//! [`crate::HazardGroup`], and offers `load`/`reset`/`reset_without_fence`/
//! `reset_dummy_pointer`/`swap` as the ways to get a pointer into (or out
//! of) that slot.

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{fence, AtomicPtr, Ordering};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;

#[cfg(feature = "check-loom")]
use loom::sync::atomic::{fence, AtomicPtr, Ordering};

use crate::group::HazardGroup;
use crate::registry::HazardRecord;

/// A handle over exactly one hazard-pointer slot within an enclosing
/// [`HazardGroup`].
///
/// A `HazardPointer` must not outlive the group it was created from (the
/// lifetime parameter `'r` ties it to the group's record). Dropping the
/// handle clears the slot, releasing the protection — but does *not* return
/// the slot to the group; the group itself tracks slot count and is
/// released, as a whole, by its own `Drop`.
pub struct HazardPointer<'r, T> {
    record: &'r HazardRecord,
    slot: Cell<&'r AtomicPtr<()>>,
    ptr: Cell<*mut T>,
    _marker: PhantomData<*mut T>, // !Send + !Sync: a slot is single-writer
}

impl<'r, T> HazardPointer<'r, T> {
    /// Draws a fresh slot from `group`.
    pub fn new<const N: usize>(group: &HazardGroup<'r, N>) -> Self {
        let offset = group.next_slot_offset();
        let slot = group.record().hp_slot(group.start_bucket(), offset);
        Self {
            record: group.record(),
            slot: Cell::new(slot),
            ptr: Cell::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// The "safe load" / validate-after-publish protocol: publish a
    /// candidate pointer read from `src`, then re-read `src` to confirm it
    /// hasn't changed (and thus hasn't been retired) before trusting it.
    ///
    /// ```text
    /// loop:
    ///   p := relaxed load(src)
    ///   store(slot, p, release)
    ///   fence(seq_cst)
    ///   q := acquire load(src)
    ///   if p == q: return q
    ///   else: continue
    /// ```
    pub fn load(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut p = src.load(Ordering::Relaxed);
        loop {
            self.slot.get().store(p as *mut (), Ordering::Release);
            fence(Ordering::SeqCst);
            let q = src.load(Ordering::Acquire);
            if p == q {
                self.ptr.set(q);
                return q;
            }
            p = q;
        }
    }

    /// Publishes `p` directly, without reading it from an atomic source.
    ///
    /// Requires the caller to already have some other reason to trust `p`
    /// is alive. Never use this to hand a pointer from one handle to
    /// another in order to move a protection — use [`Self::swap`] instead,
    /// which never has an unprotected window.
    pub fn reset(&self, p: *mut T) {
        self.slot.get().store(p as *mut (), Ordering::Release);
        fence(Ordering::SeqCst);
        self.ptr.set(p);
    }

    /// Like [`Self::reset`], but omits the seq_cst fence.
    ///
    /// # Safety
    /// The caller must have established, by other means, that no concurrent
    /// scan can run before the publication of `p` becomes visible to it.
    pub unsafe fn reset_without_fence(&self, p: *mut T) {
        self.slot.get().store(p as *mut (), Ordering::Release);
        self.ptr.set(p);
    }

    /// Clears the published slot.
    pub fn clear(&self) {
        self.reset(ptr::null_mut());
    }

    /// Seeds the handle's cached pointer to `p` *without* publishing it.
    ///
    /// For traversal of externally-owned roots that are never retired (this
    /// crate's own [`crate::Queue`] does not use this: its sentinel *is*
    /// retired on head advancement, so every node the queue touches goes
    /// through [`Self::load`]).
    pub fn reset_dummy_pointer(&self, p: *mut T) {
        self.clear();
        self.ptr.set(p);
    }

    /// The pointer this handle currently caches (whether or not it is
    /// published — see [`Self::reset_dummy_pointer`]).
    pub fn get(&self) -> *mut T {
        self.ptr.get()
    }

    pub fn is_null(&self) -> bool {
        self.ptr.get().is_null()
    }

    /// Exchanges published slot identities (not slot *contents*) and cached
    /// pointers between two handles from the same group. This is how a
    /// protection moves from one handle to another without a window in
    /// which the object is unprotected.
    ///
    /// # Panics
    /// Debug builds assert the two handles don't already share a slot
    /// (which would indicate they weren't drawn from sibling slots as
    /// required).
    pub fn swap(&self, other: &Self) {
        debug_assert!(!ptr::eq(self.slot.get(), other.slot.get()));
        let self_slot = self.slot.get();
        let other_slot = other.slot.get();
        self.slot.set(other_slot);
        other.slot.set(self_slot);

        let self_ptr = self.ptr.get();
        let other_ptr = other.ptr.get();
        self.ptr.set(other_ptr);
        other.ptr.set(self_ptr);
    }

    /// Takes ownership of the currently cached pointer for deferred
    /// deletion: clears the slot, then appends `(address, destructor)` to
    /// the owning record's retired list, flushing if `flush_size` is
    /// reached.
    ///
    /// # Safety
    /// * The pointer must already be unlinked from every shared location.
    /// * The pointer must have originated from `Box::into_raw::<T>`.
    /// * The same address must not be retired twice (double-retire is a
    ///   programmer error).
    pub unsafe fn retire(self, registry: &crate::registry::HazardRegistry, flush_size: usize)
    where
        T: 'static,
    {
        let p = self.ptr.get();
        self.clear();
        if !p.is_null() {
            unsafe { self.record.add_retired(registry, p, flush_size) };
        }
    }
}

impl<T> Drop for HazardPointer<'_, T> {
    fn drop(&mut self) {
        // a relaxed clear is enough here: by the time a handle is dropped,
        // the operation that needed the protection has already completed,
        // so there is nothing left to order against.
        self.slot.get().store(ptr::null_mut(), Ordering::Relaxed);
    }
}

#[cfg(all(test, not(feature = "check-loom")))]
mod tests {
    use super::*;
    use crate::group::HazardGroup;
    use crate::registry::HazardRegistry;
    use std::sync::atomic::AtomicPtr as StdAtomicPtr;

    #[test]
    fn load_publishes_and_validates() {
        let registry = HazardRegistry::leak();
        let group: HazardGroup<'_, 1> = HazardGroup::new(registry);
        let hp = HazardPointer::<i32>::new(&group);

        let mut value = 7;
        let src = StdAtomicPtr::new(&mut value as *mut i32);
        let loaded = hp.load(&src);
        assert_eq!(loaded, &mut value as *mut i32);
        assert!(!hp.is_null());
    }

    #[test]
    fn reset_dummy_does_not_publish() {
        let registry = HazardRegistry::leak();
        let group: HazardGroup<'_, 1> = HazardGroup::new(registry);
        let hp = HazardPointer::<i32>::new(&group);
        let mut value = 1;
        hp.reset_dummy_pointer(&mut value as *mut i32);
        assert_eq!(hp.get(), &mut value as *mut i32);
    }

    #[test]
    fn swap_exchanges_protection() {
        let registry = HazardRegistry::leak();
        let group: HazardGroup<'_, 2> = HazardGroup::new(registry);
        let a = HazardPointer::<i32>::new(&group);
        let b = HazardPointer::<i32>::new(&group);

        let mut va = 1;
        let mut vb = 2;
        let src_a = StdAtomicPtr::new(&mut va as *mut i32);
        let src_b = StdAtomicPtr::new(&mut vb as *mut i32);
        a.load(&src_a);
        b.load(&src_b);

        a.swap(&b);
        assert_eq!(a.get(), &mut vb as *mut i32);
        assert_eq!(b.get(), &mut va as *mut i32);
    }
}
