//! A lock-free, hazard-pointer-reclaimed, multi-producer/multi-consumer
//! FIFO queue.
//!
//! # Layout
//!
//! - [`registry`] owns the process-wide hazard-record and hazard-bucket
//!   free lists, and the scan/flush logic that decides when a retired
//!   object is actually safe to drop.
//! - [`context`] leases a thread's hazard record out of a registry, and
//!   releases it on thread exit (or earlier, via [`HazardContext`]).
//! - [`group`] reserves a scoped span of hazard-pointer slots within a
//!   thread's record.
//! - [`handle`] is the hazard pointer itself: the safe-load/validate
//!   protocol, plus `reset`/`swap`/`retire`.
//! - [`queue`] is the Michael–Scott lock-free FIFO built on top of the
//!   above.
//! - [`semaphore`] and [`blocking`] add an optional blocking wrapper for
//!   callers who want `dequeue_wait` instead of polling `dequeue_try`.
//!
//! Most callers only need the re-exports at the crate root: [`Queue`] for
//! non-blocking use, [`BlockingQueue`] for blocking use, and
//! [`HazardRegistry::leak`] when a test or a long-lived component wants its
//! own isolated reclamation domain instead of the crate's shared default.

mod blocking;
mod config;
mod context;
mod error;
mod group;
mod handle;
mod queue;
mod registry;
mod retired;
mod semaphore;

use std::sync::OnceLock;

pub use blocking::BlockingQueue;
pub use config::QueueConfig;
pub use context::{release_local_record, HazardContext};
pub use error::HazardError;
pub use group::HazardGroup;
pub use handle::HazardPointer;
pub use queue::Queue;
pub use registry::HazardRegistry;
pub use semaphore::CountingSemaphore;

static DEFAULT_REGISTRY: OnceLock<HazardRegistry> = OnceLock::new();

/// The crate's process-wide default hazard registry.
///
/// [`Queue::new`] and [`BlockingQueue::new`] use this implicitly. Most
/// programs only ever need one registry; reach for
/// [`HazardRegistry::leak`] (and the `*_with_registry` constructors) only
/// when something — typically a test — needs an isolated reclamation
/// domain instead.
pub fn hazards() -> &'static HazardRegistry {
    DEFAULT_REGISTRY.get_or_init(HazardRegistry::new)
}
