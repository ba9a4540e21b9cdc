use thiserror::Error;

/// Errors surfaced by this crate's fallible construction paths.
///
/// Nothing in the hazard-pointer machinery or the lock-free queue itself
/// reports an error on its hot path: allocation failure aborts the process
/// (there is no recoverable allocation-failure path in safe Rust), and scan
/// or destructor-thunk failures are swallowed and logged. This type exists
/// for construction-time failures and is kept public so a future
/// OS-primitive-backed wrapper (e.g. one built on a real semaphore syscall)
/// has somewhere to report into without a breaking API change.
#[derive(Debug, Error)]
pub enum HazardError {
    /// A hazard group was released with a bucket-in-use count that did not
    /// match what it reserved on construction. Only produced by debug-mode
    /// scope checks; indicates a bug in the calling code, not a transient
    /// condition.
    #[error("hazard group scoping violated: expected {expected} buckets in use, found {found}")]
    ScopeViolation { expected: usize, found: usize },
}
