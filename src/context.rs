//! Per-thread hazard-record leasing.
//!
//! A thread's hazard record for a given registry is acquired lazily on
//! first use and released automatically on thread exit, using
//! `thread_local!`'s destructor guarantee instead of requiring every caller
//! to remember a manual teardown call.

use std::cell::RefCell;

use crate::registry::{HazardRecord, HazardRegistry};

/// Releases its record back to the registry that issued it when dropped.
struct RecordLease {
    registry: &'static HazardRegistry,
    record: &'static HazardRecord,
}

impl Drop for RecordLease {
    fn drop(&mut self) {
        self.registry.deallocate_record(self.record);
    }
}

thread_local! {
    // A thread typically only ever touches one registry (the crate's
    // process-wide default), so this stays a one-element vector in the
    // common case; it only grows if a thread uses more than one
    // `HazardRegistry` (e.g. a test exercising `HazardRegistry::leak`
    // alongside the default).
    static LEASES: RefCell<Vec<RecordLease>> = const { RefCell::new(Vec::new()) };
}

/// Returns this thread's hazard record for `registry`, acquiring one on
/// first use. The record is released automatically when the thread exits.
pub(crate) fn local_record(registry: &'static HazardRegistry) -> &'static HazardRecord {
    LEASES.with(|leases| {
        let mut leases = leases.borrow_mut();
        if let Some(lease) = leases
            .iter()
            .find(|lease| std::ptr::eq(lease.registry, registry))
        {
            return lease.record;
        }
        let record = registry.allocate_record();
        leases.push(RecordLease { registry, record });
        record
    })
}

/// Releases this thread's record for `registry` early, without waiting for
/// thread exit.
///
/// Useful for long-lived worker threads (e.g. in a thread pool) that want
/// to return their hazard record between units of work rather than holding
/// it — and its reserved buckets — for the worker's entire lifetime.
///
/// # Panics
/// Panics (via the registry's debug assertion) if called while a
/// [`crate::HazardGroup`] sourced from this thread's record for `registry`
/// is still alive.
pub fn release_local_record(registry: &'static HazardRegistry) {
    LEASES.with(|leases| {
        let mut leases = leases.borrow_mut();
        if let Some(pos) = leases
            .iter()
            .position(|lease| std::ptr::eq(lease.registry, registry))
        {
            leases.remove(pos);
        }
    });
}

/// An explicit, scoped hazard context.
///
/// Most callers never need this: the first hazard-group acquisition on a
/// thread lazily warms its record, and thread exit releases it. This type
/// exists for callers who want the release to happen at a specific,
/// deterministic point rather than at thread exit — e.g. between tasks on a
/// pooled worker thread.
pub struct HazardContext {
    registry: &'static HazardRegistry,
}

impl HazardContext {
    /// Acquires (or reuses) this thread's record against `registry`.
    pub fn new(registry: &'static HazardRegistry) -> Self {
        let _ = local_record(registry);
        Self { registry }
    }

    /// Acquires (or reuses) this thread's record against the crate's
    /// process-wide default registry.
    pub fn new_global() -> Self {
        Self::new(crate::hazards())
    }
}

impl Drop for HazardContext {
    fn drop(&mut self) {
        release_local_record(self.registry);
    }
}
