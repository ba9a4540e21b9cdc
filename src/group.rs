//! Stack-scoped reservations of hazard-pointer slots.

use std::cell::Cell;

use crate::config::HAZARD_BUCKET_SIZE;
use crate::context::local_record;
use crate::registry::{HazardRecord, HazardRegistry};

/// A lexically-scoped reservation of `N` hazard-pointer slots within the
/// current thread's hazard record.
///
/// Groups nest: a new group's slots begin immediately after the topmost
/// group's slots on this thread, and groups must be released in LIFO order
/// (enforced with a debug assertion on drop). Exactly `N`
/// [`crate::HazardPointer`]s may be created from a given group at a time,
/// one slot each.
pub struct HazardGroup<'r, const N: usize> {
    registry: &'r HazardRegistry,
    record: &'r HazardRecord,
    start_bucket: usize,
    hp_created: Cell<usize>,
}

impl<'r, const N: usize> HazardGroup<'r, N> {
    const fn num_buckets() -> usize {
        (N + HAZARD_BUCKET_SIZE - 1) / HAZARD_BUCKET_SIZE
    }

    /// Opens a new group against `registry`, using (and lazily warming)
    /// this thread's record for that registry.
    pub fn new(registry: &'r HazardRegistry) -> Self
    where
        'r: 'static,
    {
        let record = local_record(registry);
        let start_bucket = record.begin_group(registry, Self::num_buckets());
        Self {
            registry,
            record,
            start_bucket,
            hp_created: Cell::new(0),
        }
    }

    /// Opens a new group against the crate's process-wide default registry.
    pub fn new_global() -> HazardGroup<'static, N> {
        HazardGroup::new(crate::hazards())
    }

    pub(crate) fn record(&self) -> &'r HazardRecord {
        self.record
    }

    pub(crate) fn registry(&self) -> &'r HazardRegistry {
        self.registry
    }

    /// Reserves the next unused slot in this group. Panics (via
    /// `debug_assert!`) if more than `N` slots have already been handed
    /// out — the same "at most N handles exist concurrently per group"
    /// invariant the C++ source enforces with an `assert`.
    pub(crate) fn next_slot_offset(&self) -> usize {
        let offset = self.hp_created.get();
        debug_assert!(
            offset < N,
            "hazard group of width {N} asked for more than {N} slots"
        );
        self.hp_created.set(offset + 1);
        offset
    }

    pub(crate) fn start_bucket(&self) -> usize {
        self.start_bucket
    }
}

impl<const N: usize> Drop for HazardGroup<'_, N> {
    fn drop(&mut self) {
        self.record.end_group(self.start_bucket, Self::num_buckets());
    }
}

#[cfg(all(test, not(feature = "check-loom")))]
mod tests {
    use super::*;
    use crate::context::release_local_record;
    use crate::registry::HazardRegistry;

    #[test]
    fn nested_groups_occupy_disjoint_spans() {
        let registry = HazardRegistry::leak();
        let outer: HazardGroup<'_, 1> = HazardGroup::new(registry);
        assert_eq!(outer.start_bucket(), 0);
        {
            let inner: HazardGroup<'_, 1> = HazardGroup::new(registry);
            assert_eq!(inner.start_bucket(), 1);
        }
        drop(outer);
        release_local_record(registry);
    }

    #[test]
    #[should_panic]
    fn exceeding_width_panics_in_debug() {
        let registry = HazardRegistry::leak();
        let group: HazardGroup<'_, 1> = HazardGroup::new(registry);
        let _ = group.next_slot_offset();
        let _ = group.next_slot_offset();
    }
}
