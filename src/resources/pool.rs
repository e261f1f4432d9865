//! Worker pool for host-side sample parallelism.
//!
//! A thin wrapper over [`rayon::ThreadPool`] remembering the device the pool
//! serves and whether its threads were requested to be tied to that device.
//! The affinity request is bookkeeping only; threads are scheduled by the OS.

use crate::error::Result;
use rayon::prelude::*;

/// Worker pool used by host operators.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    num_threads: usize,
    device_id: i32,
    set_affinity: bool,
}

impl core::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads)
            .field("device_id", &self.device_id)
            .field("set_affinity", &self.set_affinity)
            .finish()
    }
}

impl ThreadPool {
    /// Spawns `num_threads` workers (at least one) for `device_id`.
    ///
    /// `set_affinity` is recorded and reported by [`set_affinity`](Self::set_affinity),
    /// and logged as each worker starts. Workers are not pinned to cores.
    ///
    /// # Errors
    ///
    /// [`EagerError::ThreadPool`](crate::EagerError::ThreadPool) if the
    /// threads cannot be spawned.
    pub fn new(num_threads: usize, device_id: i32, set_affinity: bool) -> Result<Self> {
        let num_threads = num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |idx| format!("eager-worker-{device_id}-{idx}"))
            .start_handler(move |idx| {
                if set_affinity {
                    tracing::trace!(idx, device_id, "worker started with device affinity");
                }
            })
            .build()?;
        tracing::debug!(num_threads, device_id, set_affinity, "created worker pool");
        Ok(Self {
            pool,
            num_threads,
            device_id,
            set_affinity,
        })
    }

    #[must_use]
    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    #[must_use]
    pub const fn device_id(&self) -> i32 {
        self.device_id
    }

    #[must_use]
    pub const fn set_affinity(&self) -> bool {
        self.set_affinity
    }

    /// Runs `f` inside the pool, so nested rayon work uses its workers.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Calls `f(i)` for every `i` in `0..num_samples` on the workers and
    /// returns the first error, if any.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn for_each_sample<F>(&self, num_samples: usize, f: F) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync + Send,
    {
        self.pool
            .install(|| (0..num_samples).into_par_iter().try_for_each(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EagerError;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn visits_every_sample() {
        let pool = ThreadPool::new(3, 0, false).unwrap();
        assert_eq!(pool.num_threads(), 3);
        let hits = AtomicUsize::new(0);
        pool.for_each_sample(10, |_| {
            hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn reports_sample_errors() {
        let pool = ThreadPool::new(2, 0, true).unwrap();
        assert!(pool.set_affinity());
        let err = pool
            .for_each_sample(4, |i| {
                if i == 2 {
                    Err(EagerError::operator("bad sample"))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, EagerError::Operator(_)));
    }

    #[test]
    fn zero_threads_means_one() {
        let pool = ThreadPool::new(0, 0, false).unwrap();
        assert_eq!(pool.num_threads(), 1);
        assert_eq!(pool.install(rayon::current_num_threads), 1);
    }
}
