//! A per-client FIFO queue serializing async operations.
//!
//! Each client owns a primary queue and a separate pairing queue (used
//! internally by Pair-Verify), so that an operation queued on the
//! primary queue can trigger a verify round trip without deadlocking
//! against itself.

use std::future::Future;
use tokio::sync::Mutex;

/// Serializes operations so that `enqueue(b)` never starts running `b`
/// until any previously enqueued operation has settled (resolved or
/// rejected). Backed by a fair, FIFO-ordered mutex acting as the
/// queue's tail: holding the guard *is* being at the front of the
/// queue.
#[derive(Debug, Default)]
pub struct OperationQueue {
    tail: Mutex<()>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self { tail: Mutex::new(()) }
    }

    /// Wait for the current tail, then run `op` and return its result.
    /// `op` is not constructed until it is actually this call's turn,
    /// so it may borrow state that only becomes valid once prior
    /// operations have released it.
    pub async fn enqueue<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _tail = self.tail.lock().await;
        op().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn preserves_order_even_when_first_op_is_slower() {
        let log = Arc::new(AsyncMutex::new(Vec::new()));
        let queue = OperationQueue::new();

        let log_a = log.clone();
        let a = queue.enqueue(|| async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            log_a.lock().await.push("a");
        });
        let log_b = log.clone();
        let b = queue.enqueue(|| async move {
            log_b.lock().await.push("b");
        });

        tokio::join!(a, b);
        assert_eq!(*log.lock().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn a_rejecting_does_not_block_b() {
        let queue = OperationQueue::new();

        let a: Result<(), &str> = queue.enqueue(|| async { Err("boom") }).await;
        assert!(a.is_err());

        let b: Result<(), &str> = queue.enqueue(|| async { Ok(()) }).await;
        assert!(b.is_ok());
    }
}
