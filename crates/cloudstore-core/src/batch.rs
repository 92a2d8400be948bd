//! Bounded concurrent execution of parts and objects

use crate::error::{BatchFailure, Error, Result};
use cloudstore_store::StoreObject;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcomes of a bounded run, in completion order
pub(crate) struct BoundedRun<T> {
    pub outcomes: Vec<Result<T>>,
    /// Some work was never issued because of cancellation or a failure
    pub stopped_early: bool,
    pub cancelled: bool,
}

/// Run `task` over `items` on spawned tasks with at most `limit` in flight.
///
/// New work stops being issued once `cancel` fires, or, with `fail_fast`,
/// once any task has failed. Work already issued always runs to completion.
pub(crate) async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    cancel: &CancellationToken,
    fail_fast: bool,
    mut task: F,
) -> BoundedRun<T>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let mut outcomes = Vec::with_capacity(items.len());
    let mut stopped_early = false;
    let mut failed = false;

    for item in items {
        while let Some(joined) = set.try_join_next() {
            let outcome = flatten(joined);
            failed |= outcome.is_err();
            outcomes.push(outcome);
        }
        if cancel.is_cancelled() || (fail_fast && failed) {
            stopped_early = true;
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            stopped_early = true;
            break;
        };

        let work = task(item);
        set.spawn(async move {
            let _permit = permit;
            work.await
        });
    }

    while let Some(joined) = set.join_next().await {
        outcomes.push(flatten(joined));
    }

    BoundedRun {
        outcomes,
        stopped_early,
        cancelled: cancel.is_cancelled(),
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| Err(Error::Join(e)))
}

impl<T> BoundedRun<T> {
    /// All results in completion order, or the first error. Cancellation
    /// without any failure yields [`Error::Cancelled`].
    pub fn into_all(self) -> Result<Vec<T>> {
        let mut values = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            values.push(outcome?);
        }
        if self.stopped_early || self.cancelled {
            return Err(Error::Cancelled);
        }
        Ok(values)
    }
}

impl BoundedRun<(String, Result<StoreObject>)> {
    /// Fold per-object outcomes of a recursive operation
    pub fn into_batch(self) -> Result<Vec<StoreObject>> {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for outcome in self.outcomes {
            match outcome {
                Ok((_, Ok(object))) => completed.push(object),
                Ok((uri, Err(e))) => failed.push((uri, e)),
                Err(e) => failed.push((String::new(), e)),
            }
        }
        // Items that stopped on the cancellation themselves are not failures
        if self.cancelled {
            failed.retain(|(_, e)| !matches!(e, Error::Cancelled));
        }
        if !failed.is_empty() {
            return Err(Error::BatchFailed(BatchFailure { completed, failed }));
        }
        if self.cancelled {
            return Err(Error::Cancelled);
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_respects_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let run = run_bounded((0..20).collect(), 3, &cancel, false, |i: u32| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        })
        .await;

        let mut values = run.into_all().unwrap();
        values.sort();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_fail_fast_reports_error() {
        let cancel = CancellationToken::new();
        let run = run_bounded((0..50).collect(), 1, &cancel, true, |i: u32| async move {
            if i == 0 {
                Err(Error::usage("part failed"))
            } else {
                Ok(i)
            }
        })
        .await;

        assert!(run.stopped_early);
        let err = run.into_all().unwrap_err();
        assert_eq!(err.to_string(), "part failed");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = run_bounded(vec![1, 2, 3], 2, &cancel, false, |i: u32| async move { Ok(i) }).await;
        assert!(run.outcomes.is_empty());
        assert!(matches!(run.into_all(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_items_cancelled_mid_way_fold_into_cancellation() {
        let run = BoundedRun {
            outcomes: vec![Ok(("s3://b/a".to_string(), Err(Error::Cancelled)))],
            stopped_early: true,
            cancelled: true,
        };
        assert!(matches!(run.into_batch(), Err(Error::Cancelled)));

        let run = BoundedRun {
            outcomes: vec![
                Ok(("s3://b/a".to_string(), Err(Error::Cancelled))),
                Ok(("s3://b/b".to_string(), Err(Error::usage("gone")))),
            ],
            stopped_early: true,
            cancelled: true,
        };
        let Err(Error::BatchFailed(failure)) = run.into_batch() else {
            panic!("expected a batch failure");
        };
        assert_eq!(failure.failed.len(), 1);
        assert_eq!(failure.failed[0].0, "s3://b/b");
    }
}
