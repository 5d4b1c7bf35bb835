//! Bounded fan-out / fan-in worker pool.
//!
//! # Responsibilities
//! - Run one task per item with at most `limit` running at once
//! - Return only after every task finished
//!
//! # Design Decisions
//! - A semaphore permit is acquired inside each task before its work starts
//!   and dropped when the task ends, whatever the outcome
//! - A panicking task is logged and does not cancel its siblings

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A reusable concurrency ceiling for batch operations.
#[derive(Debug, Clone)]
pub struct BoundedPool {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BoundedPool {
    /// Create a pool allowing `limit` concurrent tasks (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Currently unused permits.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `task` for every item and wait for all of them.
    ///
    /// Returns the number of tasks that panicked.
    pub async fn run_all<I, F, Fut>(&self, items: I, task: F) -> usize
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut set = JoinSet::new();
        for item in items {
            let permits = Arc::clone(&self.permits);
            let work = task(item);
            set.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                work.await;
            });
        }

        let mut panicked = 0;
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Pooled task failed");
                panicked += 1;
            }
        }
        panicked
    }
}
