use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Counting semaphore used to wake a ring's consumer without busy-waiting.
/// Mirrors the original framework's `Semaphore` (a thin mutex+condvar
/// wrapper) rather than anything OS-specific, since the ring lives in a
/// single process.
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }

    /// Blocks until a permit is available, consuming it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Blocks up to `timeout` for a permit; returns `false` on timeout
    /// without consuming one.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            let result = self.condvar.wait_for(&mut count, timeout);
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}
