//! Shared worker pool for blocking work.
//!
//! Modules offload CPU-bound or blocking operations through
//! [`WorkerPool::run_blocking`] and await the result cooperatively.
//! The pool is process-wide, sized by the pipeline's `max_threads`: a
//! semaphore bounds how many blocking tasks run at once on top of the
//! runtime's blocking thread pool.

use crate::ModuleError;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded entry point into the blocking thread pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool allowing `max_threads` concurrent blocking
    /// tasks.
    #[must_use]
    pub fn new(max_threads: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_threads.max(1))),
        }
    }

    /// Runs `f` on the blocking pool, waiting for a permit first.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::ExecutionFailed`] when the blocking task
    /// panics or the pool is shut down.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, ModuleError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ModuleError::ExecutionFailed("worker pool closed".into()))?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ModuleError::ExecutionFailed(format!("blocking task failed: {e}")))
    }

    /// Number of currently available permits.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_blocking_work() {
        let pool = WorkerPool::new(2);
        let result = pool.run_blocking(|| 40 + 2).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn propagates_panics_as_errors() {
        let pool = WorkerPool::new(1);
        let result: Result<(), _> = pool.run_blocking(|| panic!("kaboom")).await;
        assert!(matches!(result, Err(ModuleError::ExecutionFailed(_))));
        // The permit was released despite the panic.
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            tasks.push(tokio::spawn(async move {
                pool.run_blocking(move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_threads_clamps_to_one() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.run_blocking(|| 1).await.unwrap(), 1);
    }
}
