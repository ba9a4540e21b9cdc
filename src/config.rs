/// Number of atomic pointer slots in a single hazard bucket.
///
/// Mirrors the C++ source's `HAZARD_BUCKET_SIZE` macro. Kept as a `const`
/// rather than a build-time tunable: unlike `HAZARD_FLUSH_SIZE`, changing it
/// changes the shape of `HazardBucket` itself, so it is a compile-time
/// decision in this crate too.
pub const HAZARD_BUCKET_SIZE: usize = 2;

/// Default retired-list length that triggers an opportunistic scan.
pub const DEFAULT_HAZARD_FLUSH_SIZE: usize = 16;

/// Construction-time tunables for a [`crate::Queue`] or [`crate::BlockingQueue`].
///
/// The hazard-pointer registry itself is process-wide and has no
/// per-queue configuration; this only controls how eagerly *this queue's*
/// retired nodes are flushed.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Retired-list length, per hazard record, that triggers `flush_retired`.
    ///
    /// Lowering this (e.g. to 1 for `HAZARD_FLUSH_SIZE=1` stress runs) trades
    /// scan frequency for a tighter bound on resident retired items.
    pub flush_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            flush_size: DEFAULT_HAZARD_FLUSH_SIZE,
        }
    }
}

impl QueueConfig {
    /// Shorthand for the `HAZARD_FLUSH_SIZE=1` stress configuration, useful
    /// for tests that want to bound how many resident retired items a
    /// record can hold at once.
    pub fn aggressive_flush() -> Self {
        Self { flush_size: 1 }
    }
}
