// Batch Scheduler
// Paced, semaphore-bounded execution of per-item collaborator work

use crate::config::SchedulerConfig;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Output for one input item, at the same index the item had
#[derive(Debug, Clone)]
pub struct BatchResult<R> {
    pub index: usize,
    pub output: R,
    /// Why the fallback replaced the work output, if it did
    pub substituted: Option<String>,
}

impl<R> BatchResult<R> {
    pub fn is_substituted(&self) -> bool {
        self.substituted.is_some()
    }
}

/// Runs items in fixed-size batches with a pause between batches
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    max_concurrency: usize,
    inter_batch_delay: Duration,
}

impl BatchScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }

    /// Run `work` over every item; failures and panics are replaced by `fallback`
    ///
    /// Never drops an item: the result has one entry per input, in input order.
    pub async fn run<T, R, E, W, Fut, F>(&self, items: Vec<T>, work: W, fallback: F) -> Vec<BatchResult<R>>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Display + Send + 'static,
        W: Fn(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        F: Fn(&T, &str) -> R,
    {
        let items: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        let total = items.len();
        let batch_count = total.div_ceil(self.batch_size);
        let mut results = Vec::with_capacity(total);

        for (batch_no, batch) in items.chunks(self.batch_size).enumerate() {
            if batch_no > 0 && !self.inter_batch_delay.is_zero() {
                debug!("Pausing {:?} before batch {}", self.inter_batch_delay, batch_no + 1);
                tokio::time::sleep(self.inter_batch_delay).await;
            }
            info!("Running batch {}/{} ({} items)", batch_no + 1, batch_count, batch.len());

            let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
            let mut handles = Vec::with_capacity(batch.len());

            for (offset, item) in batch.iter().enumerate() {
                let index = batch_no * self.batch_size + offset;
                let permits = semaphore.clone();
                let task = work(item.clone());
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    task.await
                });
                handles.push((index, item.clone(), handle));
            }

            for (index, item, handle) in handles {
                let result = match handle.await {
                    Ok(Ok(output)) => BatchResult {
                        index,
                        output,
                        substituted: None,
                    },
                    Ok(Err(e)) => {
                        let reason = e.to_string();
                        warn!(index, "Task failed, substituting fallback: {}", reason);
                        BatchResult {
                            index,
                            output: fallback(&item, &reason),
                            substituted: Some(reason),
                        }
                    }
                    Err(e) => {
                        let reason = format!("task aborted: {}", e);
                        error!(index, "{}", reason);
                        BatchResult {
                            index,
                            output: fallback(&item, &reason),
                            substituted: Some(reason),
                        }
                    }
                };
                results.push(result);
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn scheduler(batch_size: usize, max_concurrency: usize, delay_ms: u64) -> BatchScheduler {
        BatchScheduler::new(&SchedulerConfig {
            batch_size,
            max_concurrency,
            inter_batch_delay_ms: delay_ms,
        })
    }

    #[tokio::test]
    async fn test_failure_is_substituted_in_place() {
        let results = scheduler(3, 3, 0)
            .run(
                vec![1_u32, 2, 3],
                |n: Arc<u32>| async move {
                    if *n == 2 {
                        Err("collaborator down".to_string())
                    } else {
                        Ok(format!("genuine-{}", n))
                    }
                },
                |n: &u32, _reason: &str| format!("fallback-{}", n),
            )
            .await;

        let outputs: Vec<&str> = results.iter().map(|r| r.output.as_str()).collect();
        assert_eq!(outputs, vec!["genuine-1", "fallback-2", "genuine-3"]);
        assert_eq!(results.iter().filter(|r| r.is_substituted()).count(), 1);
        assert_eq!(results[1].substituted.as_deref(), Some("collaborator down"));
    }

    #[tokio::test]
    async fn test_panic_is_substituted() {
        let results = scheduler(2, 2, 0)
            .run(
                vec![10_u32, 20],
                |n: Arc<u32>| async move {
                    if *n == 20 {
                        panic!("boom");
                    }
                    Ok::<u32, String>(*n)
                },
                |_n: &u32, _reason: &str| 0,
            )
            .await;

        assert_eq!(results[0].output, 10);
        assert_eq!(results[1].output, 0);
        assert!(results[1].is_substituted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_input_not_completion() {
        let results = scheduler(4, 4, 0)
            .run(
                vec![40_u64, 10, 30, 20],
                |ms: Arc<u64>| async move {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    Ok::<u64, String>(*ms)
                },
                |_ms: &u64, _reason: &str| 0,
            )
            .await;

        let outputs: Vec<u64> = results.iter().map(|r| r.output).collect();
        assert_eq!(outputs, vec![40, 10, 30, 20]);
        let indexes: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_batches() {
        let start = Instant::now();
        let results = scheduler(3, 3, 2_000)
            .run(
                (0..7_u32).collect(),
                |n: Arc<u32>| async move { Ok::<u32, String>(*n) },
                |_n: &u32, _reason: &str| 0,
            )
            .await;

        assert_eq!(results.len(), 7);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4_000));
        assert!(elapsed < Duration::from_millis(6_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = {
            let running = running.clone();
            let peak = peak.clone();
            scheduler(6, 2, 0)
                .run(
                    (0..6_u32).collect(),
                    move |n: Arc<u32>| {
                        let running = running.clone();
                        let peak = peak.clone();
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok::<u32, String>(*n)
                        }
                    },
                    |_n: &u32, _reason: &str| 0,
                )
                .await
        };

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results = scheduler(3, 3, 1_000)
            .run(
                Vec::<u32>::new(),
                |n: Arc<u32>| async move { Ok::<u32, String>(*n) },
                |_n: &u32, _reason: &str| 0,
            )
            .await;
        assert!(results.is_empty());
    }
}
