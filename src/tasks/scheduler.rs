//! Worker pool bounding concurrent uploads.
//!
//! Every upload task holds one [`WorkerSlot`] while it reads the source and
//! talks to Salesforce. Tasks beyond the limit wait in `acquire`, which can be
//! interrupted by the task's cancellation token.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// WorkerPool
// ─────────────────────────────────────────────────────────────────────────────

/// Semaphore-backed limit on concurrent uploads.
#[derive(Clone)]
pub struct WorkerPool {
    sem: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool with `max_workers` slots (at least one).
    pub fn new(max_workers: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled` - `cancel` fired before a slot was free
    /// - `AppError::Internal` - the pool was closed
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<WorkerSlot, AppError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            permit = self.sem.clone().acquire_owned() => permit
                .map_err(|e| AppError::Internal(format!("Worker pool closed: {e}")))?,
        };

        Ok(WorkerSlot { _permit: permit })
    }
}

/// One held worker slot; released on drop.
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn zero_workers_is_raised_to_one() {
        let pool = WorkerPool::new(0);
        let cancel = CancellationToken::new();

        let slot = timeout(Duration::from_millis(200), pool.acquire(&cancel))
            .await
            .expect("one slot should exist");
        assert!(slot.is_ok());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_slot() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();

        let held = pool.acquire(&cancel).await.unwrap();

        let waiter_pool = pool.clone();
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move { waiter_pool.acquire(&waiter_cancel).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished(), "acquire should block while the pool is full");

        drop(held);
        let result = timeout(Duration::from_millis(200), handle)
            .await
            .expect("acquire should finish once the slot is free")
            .expect("task should not panic");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancellation_interrupts_waiting() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let _held = pool.acquire(&cancel).await.unwrap();

        let waiter_pool = pool.clone();
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move { waiter_pool.acquire(&waiter_cancel).await.map(|_| ()) });

        cancel.cancel();
        let result = timeout(Duration::from_millis(200), handle)
            .await
            .expect("cancel should wake the waiter")
            .expect("task should not panic");
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(pool.sem.available_permits(), 0, "held slot stays held");
    }
}
