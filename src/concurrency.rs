//! Bounded concurrency for batch I/O
//!
//! Batch operations (mirror downloads, compare hashing) run every item as a
//! future gated by a semaphore, so at most `limit` items are past the gate
//! at any time regardless of batch size.

use std::future::Future;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 5;

const MAX_CONCURRENCY: usize = 64;

/// Clamp a requested concurrency to `[1, 64]`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Run `task` for every item with at most `limit` in flight.
///
/// Results come back in input order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    if items.is_empty() {
        return Vec::new();
    }

    let semaphore = Semaphore::new(clamp_concurrency(limit));
    let gated = items.into_iter().map(|item| {
        let semaphore = &semaphore;
        let work = task(item);
        async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = semaphore.acquire().await.ok();
            work.await
        }
    });

    join_all(gated).await
}
