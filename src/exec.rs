//! Bounded concurrent execution of independent stage tasks.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::error::PipelineError;

/// Fan-out helper: runs a batch of futures with at most `max_workers`
/// in flight, waits for all of them, and returns results in submission
/// order regardless of completion order. The first failure aborts the
/// remaining tasks.
#[derive(Clone)]
pub struct ExecutionPool {
    semaphore: Arc<Semaphore>,
}

impl ExecutionPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    pub async fn run_indexed<T, Fut>(&self, futures: Vec<Fut>) -> Result<Vec<T>, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
        T: Send,
    {
        let total = futures.len();
        let mut in_flight = FuturesUnordered::new();
        for (index, fut) in futures.into_iter().enumerate() {
            let semaphore = self.semaphore.clone();
            in_flight.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::StageFailed("worker pool closed".into()))?;
                let value = fut.await?;
                Ok::<(usize, T), PipelineError>((index, value))
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        while let Some(result) = in_flight.next().await {
            // Fail fast: dropping the stream cancels everything in flight.
            let (index, value) = result?;
            slots[index] = Some(value);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| PipelineError::StageFailed(format!("task {i} never completed")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let pool = ExecutionPool::new(4);
        let futures: Vec<_> = (0..8u64)
            .map(|i| async move {
                // Later tasks finish earlier.
                tokio::time::sleep(Duration::from_millis(80 - i * 10)).await;
                Ok(i)
            })
            .collect();
        let results = pool.run_indexed(futures).await.unwrap();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_bounded() {
        let pool = ExecutionPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..6)
            .map(|_| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();
        pool.run_indexed(futures).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_first_error_aborts() {
        let pool = ExecutionPool::new(2);
        let futures: Vec<_> = (0..4)
            .map(|i| async move {
                if i == 1 {
                    Err(PipelineError::StageFailed("task 1 failed".into()))
                } else {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(i)
                }
            })
            .collect();
        assert!(pool.run_indexed(futures).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = ExecutionPool::new(2);
        let results: Vec<u8> = pool
            .run_indexed(Vec::<futures::future::Ready<Result<u8, PipelineError>>>::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
