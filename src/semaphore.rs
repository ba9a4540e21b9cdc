//! A counting semaphore built on `Mutex`/`Condvar`.
//!
//! Grounded on the original C++ source's `sem_t`-backed wait/post pair
//! (`rcv_wait_lockfree_queue.hpp`), but constructed without any possibility
//! of initialization failure: `Mutex::new`/`Condvar::new` can't fail the way
//! `sem_init` can, so there is no error to surface and no `Result` in this
//! type's public API.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A counting semaphore: `post` increments the count and wakes one waiter;
/// `wait` blocks until the count is positive, then decrements it.
pub struct CountingSemaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl CountingSemaphore {
    /// Creates a semaphore with `initial` permits available.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Releases one permit, waking a single blocked waiter if any.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        self.available.notify_one();
    }

    /// Releases `n` permits, waking up to `n` blocked waiters.
    pub fn post_n(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += n;
        self.available.notify_all();
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(|e| e.into_inner());
        }
        *count -= 1;
    }

    /// Blocks until a permit is available or `timeout` elapses, consuming a
    /// permit only on success. Returns `true` iff a permit was acquired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if d > Duration::ZERO => d,
                _ => return false,
            };
            let (guard, result) = self
                .available
                .wait_timeout(count, remaining)
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
    }

    /// Attempts to consume a permit without blocking.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}
