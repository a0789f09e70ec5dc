//! Batch scheduler
//!
//! Runs independent async operations group by group: every item in a group
//! runs concurrently, each raced against its own timeout; the next group
//! starts only after the whole group settles, with a pause between groups.
//! Bounding concurrency to `batch_size` plus the pause is the admission
//! control for collaborators with coarse per-second / per-minute quotas.
//!
//! The scheduler never fails as a whole. Every item gets an outcome, in input
//! order.

use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Items per group; 0 is treated as 1
    pub batch_size: usize,
    /// Pause between groups (not after the last one)
    pub inter_batch_delay: Duration,
    /// Per-item timeout; `Duration::ZERO` disables it
    pub per_item_timeout: Duration,
}

impl BatchOptions {
    pub fn new(batch_size: usize, inter_batch_delay: Duration, per_item_timeout: Duration) -> Self {
        Self {
            batch_size,
            inter_batch_delay,
            per_item_timeout,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay: Duration::from_secs(1),
            per_item_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&candor_common::config::FunnelSettings> for BatchOptions {
    fn from(settings: &candor_common::config::FunnelSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            inter_batch_delay: Duration::from_millis(settings.inter_batch_delay_ms),
            per_item_timeout: Duration::from_secs(settings.per_item_timeout_secs),
        }
    }
}

/// Why an item did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum ItemError<E> {
    /// The operation returned an error
    Failed(E),
    /// The per-item timeout elapsed first
    TimedOut(Duration),
    /// Never started: an earlier group tripped the halt predicate
    Skipped,
}

impl<E: fmt::Display> fmt::Display for ItemError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::Failed(e) => write!(f, "{}", e),
            ItemError::TimedOut(after) => write!(f, "timed out after {:?}", after),
            ItemError::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemOutcome<I, T, E> {
    /// Position in the input
    pub index: usize,
    pub item: I,
    pub result: Result<T, ItemError<E>>,
}

impl<I, T, E> ItemOutcome<I, T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport<I, T, E> {
    /// One outcome per input item, in input order
    pub outcomes: Vec<ItemOutcome<I, T, E>>,
    /// True if the halt predicate stopped later groups from starting
    pub halted: bool,
    pub groups_run: usize,
    pub elapsed: Duration,
}

impl<I, T, E> BatchReport<I, T, E> {
    /// Items that did not succeed (skipped items included)
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome<I, T, E>> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Successful values in input order
    pub fn into_values(self) -> Vec<T> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .collect()
    }
}

/// Run `op` over every item in paced, bounded-concurrency groups
pub async fn run_batches<I, T, E, F, Fut>(
    items: Vec<I>,
    op: F,
    options: &BatchOptions,
) -> BatchReport<I, T, E>
where
    I: Clone,
    E: fmt::Display,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    run_batches_until(items, op, options, |_| false).await
}

/// Like [`run_batches`], but once any item in a settled group matches
/// `halt_on`, the remaining groups are not started and their items are
/// reported as [`ItemError::Skipped`]
pub async fn run_batches_until<I, T, E, F, Fut, H>(
    items: Vec<I>,
    op: F,
    options: &BatchOptions,
    halt_on: H,
) -> BatchReport<I, T, E>
where
    I: Clone,
    E: fmt::Display,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: Fn(&ItemError<E>) -> bool,
{
    let start = Instant::now();
    let batch_size = options.batch_size.max(1);
    let total = items.len();
    let timeout = options.per_item_timeout;

    let mut outcomes = Vec::with_capacity(total);
    let mut pending = items.into_iter().enumerate();
    let mut halted = false;
    let mut groups_run = 0;

    loop {
        let group: Vec<(usize, I)> = pending.by_ref().take(batch_size).collect();
        if group.is_empty() {
            break;
        }

        if halted {
            outcomes.extend(group.into_iter().map(|(index, item)| ItemOutcome {
                index,
                item,
                result: Err(ItemError::Skipped),
            }));
            continue;
        }

        if groups_run > 0 && !options.inter_batch_delay.is_zero() {
            debug!(delay = ?options.inter_batch_delay, "Pausing between groups");
            tokio::time::sleep(options.inter_batch_delay).await;
        }

        debug!(
            group = groups_run + 1,
            size = group.len(),
            done = outcomes.len(),
            total,
            "Starting group"
        );

        let futures = group.into_iter().map(|(index, item)| {
            let fut = op(item.clone());
            async move {
                let result = if timeout.is_zero() {
                    fut.await.map_err(ItemError::Failed)
                } else {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result.map_err(ItemError::Failed),
                        Err(_) => Err(ItemError::TimedOut(timeout)),
                    }
                };
                ItemOutcome {
                    index,
                    item,
                    result,
                }
            }
        });

        let settled = join_all(futures).await;
        groups_run += 1;

        for outcome in &settled {
            if let Err(e) = &outcome.result {
                warn!(index = outcome.index, error = %e, "Batch item failed");
            }
        }

        if settled
            .iter()
            .any(|o| matches!(&o.result, Err(e) if halt_on(e)))
        {
            warn!(
                group = groups_run,
                remaining = total - outcomes.len() - settled.len(),
                "Halting: remaining groups will not start"
            );
            halted = true;
        }

        outcomes.extend(settled);
    }

    BatchReport {
        outcomes,
        halted,
        groups_run,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options(batch_size: usize, delay_ms: u64, timeout_ms: u64) -> BatchOptions {
        BatchOptions::new(
            batch_size,
            Duration::from_millis(delay_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_batch_size() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (in_flight_ref, peak_ref) = (&in_flight, &peak);

        let report = run_batches(
            (0..10).collect::<Vec<u32>>(),
            move |n| async move {
                let now = in_flight_ref.fetch_add(1, Ordering::SeqCst) + 1;
                peak_ref.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight_ref.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(n * 2)
            },
            &options(3, 0, 1000),
        )
        .await;

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.groups_run, 4);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pacing_between_groups_only() {
        // 5 items, groups of 2 → 3 groups → 2 pauses
        let report = run_batches(
            vec![1, 2, 3, 4, 5],
            |n| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(n)
            },
            &options(2, 100, 1000),
        )
        .await;

        assert!(report.elapsed >= Duration::from_millis(200));
        assert!(report.elapsed < Duration::from_millis(200 + 1500));
        assert_eq!(report.into_values(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_slow_item_times_out_alone() {
        let report = run_batches(
            vec![10u64, 500, 10],
            |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, String>(ms)
            },
            &options(3, 0, 100),
        )
        .await;

        assert!(report.outcomes[0].is_ok());
        assert!(matches!(report.outcomes[1].result, Err(ItemError::TimedOut(_))));
        assert!(report.outcomes[2].is_ok());
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_fail_batch() {
        let report = run_batches(
            vec!["a", "b", "c"],
            |s| async move {
                if s == "b" {
                    Err(format!("bad {}", s))
                } else {
                    Ok(s.to_uppercase())
                }
            },
            &options(2, 0, 1000),
        )
        .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.success_count(), 2);
        let failed: Vec<_> = report.failures().map(|o| o.item).collect();
        assert_eq!(failed, vec!["b"]);
        assert_eq!(
            report.outcomes[1].result.as_ref().unwrap_err().to_string(),
            "bad b"
        );
    }

    #[tokio::test]
    async fn test_halt_skips_remaining_groups() {
        let started = AtomicUsize::new(0);
        let started_ref = &started;

        let report = run_batches_until(
            (0..10).collect::<Vec<usize>>(),
            move |n| async move {
                started_ref.fetch_add(1, Ordering::SeqCst);
                if n == 2 {
                    Err("fatal".to_string())
                } else {
                    Ok(n)
                }
            },
            &options(2, 0, 1000),
            |e| matches!(e, ItemError::Failed(msg) if msg == "fatal"),
        )
        .await;

        assert!(report.halted);
        assert_eq!(report.groups_run, 2);
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(report.outcomes.len(), 10);
        assert!(report.outcomes[4..]
            .iter()
            .all(|o| matches!(o.result, Err(ItemError::Skipped))));
    }

    #[tokio::test]
    async fn test_zero_batch_size_runs_one_at_a_time() {
        let report = run_batches(
            vec![1, 2, 3],
            |n| async move { Ok::<_, String>(n) },
            &options(0, 0, 0),
        )
        .await;

        assert_eq!(report.groups_run, 3);
        assert_eq!(report.into_values(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let report = run_batches(
            Vec::<u8>::new(),
            |n| async move { Ok::<_, String>(n) },
            &BatchOptions::default(),
        )
        .await;

        assert!(report.outcomes.is_empty());
        assert_eq!(report.groups_run, 0);
    }
}
