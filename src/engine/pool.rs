// src/engine/pool.rs
//
// Bounded concurrency gate for pipeline executions.
//
// Every pipeline run holds one permit from decode to encode. The permit is an
// RAII guard, so a failed or panicking run gives its slot back while
// unwinding. A leaked slot would permanently shrink throughput.
//
// **IMPORTANT**:
// - The global pool is initialized once; later `init_global` calls have NO effect
// - No fairness beyond what the condvar provides; overload shows up as latency

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock};

/// Used when the platform can't report its parallelism.
const MIN_WORKERS: usize = 1;

/// Fixed-capacity counting semaphore.
#[derive(Debug)]
pub struct Pool {
    capacity: usize,
    available: Mutex<usize>,
    cvar: Condvar,
}

/// Right to run one pipeline. Returned to the pool on drop.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct PoolPermit {
    pool: Arc<Pool>,
}

impl Pool {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_WORKERS);
        Self {
            capacity,
            available: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots at this instant.
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Block until a slot is free.
    pub fn acquire(self: &Arc<Self>) -> PoolPermit {
        let mut available = self.available.lock();
        if *available == 0 {
            tracing::trace!(target: "thumbwright::pool", capacity = self.capacity, "waiting for a slot");
        }
        while *available == 0 {
            self.cvar.wait(&mut available);
        }
        *available -= 1;
        PoolPermit {
            pool: Arc::clone(self),
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<PoolPermit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(PoolPermit {
            pool: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available = (*available + 1).min(self.capacity);
        // Uniform weights: waking one waiter is enough.
        self.cvar.notify_one();
    }
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

static GLOBAL_POOL: OnceLock<Arc<Pool>> = OnceLock::new();

/// Worker count when nothing is configured: the process's available parallelism.
pub fn default_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
}

/// Initialize the process-wide pool. Only the first call decides the capacity.
pub fn init_global(capacity: usize) -> Arc<Pool> {
    let pool = GLOBAL_POOL.get_or_init(|| {
        let pool = Pool::new(capacity);
        tracing::debug!(target: "thumbwright::pool", capacity = pool.capacity(), "global pool initialized");
        Arc::new(pool)
    });
    if pool.capacity() != capacity.max(MIN_WORKERS) {
        tracing::debug!(
            target: "thumbwright::pool",
            requested = capacity,
            capacity = pool.capacity(),
            "global pool already initialized; ignoring new capacity"
        );
    }
    Arc::clone(pool)
}

/// Process-wide pool, created with `default_capacity()` on first use.
pub fn global() -> Arc<Pool> {
    match GLOBAL_POOL.get() {
        Some(pool) => Arc::clone(pool),
        None => init_global(default_capacity()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let pool = Arc::new(Pool::new(0));
        assert_eq!(pool.capacity(), 1);
        let _permit = pool.acquire();
        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn test_try_acquire_and_release() {
        let pool = Arc::new(Pool::new(2));
        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = Arc::new(Pool::new(1));
        let permit = pool.acquire();
        let acquired = Arc::new(AtomicUsize::new(0));

        let handle = {
            let pool = Arc::clone(&pool);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _p = pool.acquire();
                acquired.store(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        drop(permit);
        handle.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let pool = Arc::new(Pool::new(3));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _permit = pool.acquire();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let pool = Arc::new(Pool::new(1));
        let result = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let _permit = pool.acquire();
                panic!("worker died");
            })
            .join()
        };
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_global_is_init_once() {
        let first = global();
        let again = init_global(first.capacity() + 5);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.capacity(), first.capacity());
    }
}
