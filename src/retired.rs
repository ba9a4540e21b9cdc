//! Per-record retired-item bookkeeping.
//!
//! Each hazard record owns a list of type-erased `(address, destructor
//! thunk)` pairs for objects that have been unlinked but might still be
//! referenced by an in-flight hazard pointer on some other thread. The list
//! is flushed — checked against every live hazard pointer and drained of
//! anything no longer protected — once it grows past a threshold.

use core::fmt;

/// A retired item: an erased address plus the destructor thunk that knows
/// how to drop the concrete type it used to point to.
///
/// The thunk is captured at `retire` time, not at deletion time, because by
/// the time a scan proves the address unobserved the static type has long
/// since been erased to `*mut ()`.
pub(crate) type Retired = (*mut (), unsafe fn(*mut ()));

/// Frees a pointer by reconstructing the `Box<T>` that owns it.
///
/// # Safety
///
/// `data` must have originated from `Box::into_raw` of a `Box<T>`, and must
/// not have been freed already.
unsafe fn free<T>(data: *mut ()) {
    drop(unsafe { Box::from_raw(data.cast::<T>()) })
}

/// The retired list owned by a single hazard record.
///
/// Not `Send`/`Sync` on its own merits: every method requires the caller to
/// already hold `&mut` or otherwise prove single-threaded access (the
/// containing `HazardRecord` enforces this by only ever handing out mutable
/// access to the thread that currently owns the record).
#[derive(Default)]
pub(crate) struct RetiredList {
    inner: Vec<Retired>,
}

impl RetiredList {
    pub(crate) fn new() -> Self {
        Self { inner: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Appends a retired pointer.
    ///
    /// # Safety
    ///
    /// * `pointer` must already be unlinked from every shared location.
    /// * `pointer` must have originated from `Box::into_raw::<T>`.
    /// * The same address must not be retired twice without an intervening
    ///   reclamation (double-retire is a programmer error).
    pub(crate) unsafe fn push<T>(&mut self, pointer: *mut T) {
        self.inner.push((pointer.cast(), free::<T>));
    }

    /// Removes every item whose address is *not* present in `scanned`,
    /// invoking its destructor thunk. `scanned` must already be sorted.
    ///
    /// A panic unwinding out of a destructor is caught and logged so that
    /// one poisoned node cannot strand the reclamation of its siblings.
    pub(crate) fn retain_unobserved(&mut self, scanned: &[*mut ()]) {
        let mut freed = Vec::new();
        self.inner.retain(|(ptr, deleter)| {
            if scanned.binary_search(ptr).is_ok() {
                true
            } else {
                freed.push((*ptr, *deleter));
                false
            }
        });
        for (ptr, deleter) in freed {
            run_deleter(ptr, deleter);
        }
    }

    /// Unconditionally destroys every retired item, regardless of whether a
    /// scan could prove them unobserved. Used at registry teardown and when
    /// a scan observes no hazard pointers at all (an empty scratch set means
    /// every retired item is provably unobserved).
    pub(crate) fn drain_all(&mut self) {
        for (ptr, deleter) in self.inner.drain(..) {
            run_deleter(ptr, deleter);
        }
    }
}

fn run_deleter(ptr: *mut (), deleter: unsafe fn(*mut ())) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        deleter(ptr)
    }));
    if let Err(panic) = result {
        tracing::error!(?ptr, "destructor thunk panicked during reclamation; swallowed");
        drop(panic);
    }
}

impl fmt::Debug for RetiredList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetiredList")
            .field("len", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::RetiredList;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct Tester(Rc<RefCell<HashSet<usize>>>, usize);
    impl Drop for Tester {
        fn drop(&mut self) {
            self.0.borrow_mut().insert(self.1);
        }
    }

    #[test]
    fn retain_unobserved_frees_only_unscanned() {
        let freed = Rc::new(RefCell::new(HashSet::new()));
        let mut list = RetiredList::new();
        let mut kept_ptr = std::ptr::null_mut();
        for i in 0..8 {
            let boxed = Box::into_raw(Box::new(Tester(freed.clone(), i)));
            if i == 3 {
                kept_ptr = boxed.cast();
            }
            unsafe { list.push(boxed) };
        }
        assert_eq!(list.len(), 8);

        let scanned = vec![kept_ptr];
        list.retain_unobserved(&scanned);

        assert_eq!(list.len(), 1);
        let freed = freed.borrow();
        assert!(!freed.contains(&3));
        assert_eq!(freed.len(), 7);
        drop(freed);
        list.drain_all();
    }

    #[test]
    fn drain_all_frees_everything() {
        let freed = Rc::new(RefCell::new(HashSet::new()));
        let mut list = RetiredList::new();
        for i in 0..4 {
            unsafe { list.push(Box::into_raw(Box::new(Tester(freed.clone(), i)))) };
        }
        list.drain_all();
        assert!(list.is_empty());
        assert_eq!(freed.borrow().len(), 4);
    }
}
