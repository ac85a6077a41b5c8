//! Shared retry discipline (§9 "Retry discipline"). Both the Version
//! Manager's `update_versioning` fan-out and the Bulk Upgrader's
//! `enable_for_versioning` staging funnel their vector-index batch calls
//! through this single helper rather than each rolling their own loop.

use std::future::Future;
use std::time::Duration;

use bitemporal_core::BackendError;
use tokio::time::sleep;
use tracing::warn;

/// Retries a vector-index batch operation against a shrinking working set.
///
/// `op` is called with the full `ids` on the first attempt and with whatever
/// subset failed on every subsequent attempt. Backoff between attempts is
/// linear (`sleep(attempt)` seconds), matching the reference implementation's
/// `time.sleep(attempt)`. Returns whatever ids are still outstanding after
/// `max_attempts` — an empty vec means every id eventually succeeded; a
/// non-empty one means the caller should raise `IndexError`.
///
/// A hard backend failure (`Err`) from `op` is never retried here — it
/// propagates immediately, since it signals a wholesale backend problem
/// rather than per-id rejection.
pub async fn retry_failed_ids<F, Fut>(ids: Vec<String>, max_attempts: u32, mut op: F) -> Result<Vec<String>, BackendError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<String>, BackendError>>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut outstanding = ids;
    for attempt in 1..=max_attempts {
        let failed = op(outstanding.clone()).await?;
        if failed.is_empty() {
            return Ok(Vec::new());
        }
        outstanding = failed;
        if attempt == max_attempts {
            break;
        }
        warn!(attempt, still_failing = outstanding.len(), "vector index batch reported failed ids, retrying");
        sleep(Duration::from_secs(attempt as u64)).await;
    }
    Ok(outstanding)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn succeeds_immediately_when_first_attempt_reports_no_failures() {
        let calls = RefCell::new(0);
        let outstanding = retry_failed_ids(vec!["a".into(), "b".into()], 5, |_ids| {
            *calls.borrow_mut() += 1;
            async { Ok(Vec::new()) }
        })
        .await
        .unwrap();

        assert!(outstanding.is_empty());
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn narrows_the_working_set_on_each_attempt() {
        let attempt = RefCell::new(0);
        let outstanding = retry_failed_ids(vec!["a".into(), "b".into(), "c".into()], 5, |ids| {
            let mut n = attempt.borrow_mut();
            *n += 1;
            let still_failing: Vec<String> = ids.into_iter().skip(1).collect();
            async move { Ok(still_failing) }
        })
        .await
        .unwrap();

        // Each attempt peels one id off the front; after 3 attempts none remain.
        assert!(outstanding.is_empty());
        assert_eq!(*attempt.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let outstanding = retry_failed_ids(vec!["a".into()], 3, |ids| async move { Ok(ids) }).await.unwrap();
        assert_eq!(outstanding, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn a_hard_backend_error_is_not_retried() {
        let calls = RefCell::new(0);
        let result = retry_failed_ids(vec!["a".into()], 5, |_ids| {
            *calls.borrow_mut() += 1;
            async { Err(BackendError::new(1, "connection reset")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 1);
    }
}
