use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

/// Run `f` over every item with at most `limit` futures in flight and wait
/// for all of them.
///
/// Results come back in completion order, so callers must aggregate them
/// commutatively. Futures run on the caller's task: dropping the returned
/// future cancels every outstanding call.
pub async fn bounded_parallel_map<I, F, Fut, T>(items: I, limit: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let f = &f;

    let mut pending: FuturesUnordered<_> = items
        .into_iter()
        .map(|item| async move {
            // The semaphore is local and never closed
            let _permit = semaphore.acquire().await.ok();
            f(item).await
        })
        .collect();

    let mut results = Vec::with_capacity(pending.len());
    while let Some(result) = pending.next().await {
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = bounded_parallel_map(0..10, 3, |i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        let mut sorted = results;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> = bounded_parallel_map(Vec::<u32>::new(), 3, |i| async move { i }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_still_progresses() {
        let results = bounded_parallel_map([1, 2], 0, |i| async move { i }).await;
        assert_eq!(results.len(), 2);
    }
}
