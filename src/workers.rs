//! Bounded worker pools for pipeline stages.
//!
//! Each heavyweight stage (generation, build) runs inside a [`StagePool`]
//! with a fixed number of slots. Admission is non-blocking: when every slot
//! is taken the caller gets an immediate `Busy` error carrying a retry hint
//! instead of queueing, keeping the control API responsive under load.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ApiError, busy};

/// A bounded pool of execution slots for one pipeline stage.
#[derive(Debug, Clone)]
pub struct StagePool {
    stage: &'static str,
    semaphore: Arc<Semaphore>,
    retry_after_seconds: u64,
}

/// An acquired slot. Dropping it releases the slot back to the pool.
#[derive(Debug)]
pub struct StageSlot {
    _permit: OwnedSemaphorePermit,
}

impl StagePool {
    pub fn new(stage: &'static str, size: usize, retry_after_seconds: u64) -> Self {
        Self {
            stage,
            semaphore: Arc::new(Semaphore::new(size)),
            retry_after_seconds,
        }
    }

    /// Attempts to acquire a slot without waiting.
    ///
    /// Returns `BUSY` with a retry-after hint when the pool is saturated.
    pub fn try_acquire(&self) -> Result<StageSlot, ApiError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(StageSlot { _permit: permit }),
            Err(_) => Err(busy(self.stage, self.retry_after_seconds)),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_slot_released_on_drop() {
        let pool = StagePool::new("generation", 1, 5);
        assert_eq!(pool.available_slots(), 1);

        let slot = pool.try_acquire().expect("first acquire succeeds");
        assert_eq!(pool.available_slots(), 0);

        drop(slot);
        assert_eq!(pool.available_slots(), 1);
    }

    #[test]
    fn test_saturated_pool_returns_busy() {
        let pool = StagePool::new("build", 2, 10);
        let _a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();

        let err = pool.try_acquire().expect_err("third acquire is rejected");
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code.as_ref(), "BUSY");
        assert_eq!(err.retry_after, Some(10));
    }
}
