//! Staleness guard: bound how stale data a reader may observe.
//!
//! The guard never initiates work itself. It only watches whether the
//! background refresher (triggered separately) has made progress, and gives
//! up after a bounded wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::StoreError;
use crate::state::StoreState;
use crate::utils::now_ms;

/// What to do when stale data is observed and no fresher data arrives in
/// time.
///
/// The historical behavior of this kind of store has flip-flopped between
/// the two, so the policy is an explicit configuration field rather than an
/// implicit default buried in the read path. The crate default is
/// [`WarnAndContinue`](StaleTimeoutPolicy::WarnAndContinue): degraded but
/// available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleTimeoutPolicy {
    /// Fail the read with [`StoreError::StaleTimeout`].
    Error,
    /// Log a warning and let the read return the still-stale data.
    #[default]
    WarnAndContinue,
}

/// Poll increment for the wait loop. Re-checks happen at least this often.
const POLL_STEP: Duration = Duration::from_millis(10);

/// Block (asynchronously, bounded by `stale_timeout`) until the state is no
/// longer older than `stale_after`.
///
/// Returns immediately when the data is fresh enough. Otherwise polls the
/// state in small sleeps until `updated_at` advances past the originally
/// observed value, or the timeout elapses and `policy` decides the outcome.
pub(crate) async fn wait_if_stale(
    rx: &watch::Receiver<Arc<StoreState>>,
    stale_after: Duration,
    stale_timeout: Duration,
    policy: StaleTimeoutPolicy,
) -> Result<(), StoreError> {
    let (name, observed) = {
        let state = rx.borrow();
        (Arc::clone(&state.name), state.updated_at)
    };

    if now_ms() - observed < stale_after.as_millis() as i64 {
        return Ok(());
    }

    let wait_started = tokio::time::Instant::now();
    let deadline = wait_started + stale_timeout;
    loop {
        let remaining = deadline - tokio::time::Instant::now();
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(remaining.min(POLL_STEP)).await;

        if rx.borrow().updated_at > observed {
            return Ok(());
        }
    }

    // report the time actually spent waiting, not the configured timeout
    let waited_ms = wait_started.elapsed().as_millis() as u64;
    match policy {
        StaleTimeoutPolicy::Error => Err(StoreError::StaleTimeout {
            store: name.to_string(),
            waited_ms,
        }),
        StaleTimeoutPolicy::WarnAndContinue => {
            tracing::warn!(
                store = %name,
                waited_ms,
                "no refresh within the stale timeout, serving stale data"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConfigMap;

    fn channel(state: StoreState) -> (watch::Sender<Arc<StoreState>>, watch::Receiver<Arc<StoreState>>) {
        watch::channel(Arc::new(state))
    }

    #[tokio::test]
    async fn test_fresh_data_returns_immediately() {
        let (_tx, rx) = channel(StoreState::seeded("g".into(), ConfigMap::new()));

        let start = tokio::time::Instant::now();
        wait_if_stale(
            &rx,
            Duration::from_secs(5),
            Duration::from_secs(1),
            StaleTimeoutPolicy::Error,
        )
        .await
        .unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_returns_once_timestamp_advances() {
        let (tx, rx) = channel(StoreState::empty("g".into()));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let next = tx.borrow().committed(ConfigMap::new(), now_ms());
            tx.send_replace(Arc::new(next));
        });

        wait_if_stale(
            &rx,
            Duration::from_millis(100),
            Duration::from_secs(2),
            StaleTimeoutPolicy::Error,
        )
        .await
        .unwrap();
        assert!(rx.borrow().updated_at > 0);
    }

    #[tokio::test]
    async fn test_timeout_with_error_policy() {
        let (_tx, rx) = channel(StoreState::empty("g".into()));

        let result = wait_if_stale(
            &rx,
            Duration::from_millis(50),
            Duration::from_millis(100),
            StaleTimeoutPolicy::Error,
        )
        .await;

        match result {
            Err(StoreError::StaleTimeout { store, waited_ms }) => {
                assert_eq!(store, "g");
                // the error carries the elapsed wait, at least the timeout
                assert!(waited_ms >= 100, "waited_ms = {}", waited_ms);
                assert!(waited_ms < 600, "waited_ms = {}", waited_ms);
            }
            other => panic!("expected StaleTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_with_warn_policy_continues() {
        let (_tx, rx) = channel(StoreState::empty("g".into()));

        wait_if_stale(
            &rx,
            Duration::from_millis(50),
            Duration::from_millis(100),
            StaleTimeoutPolicy::WarnAndContinue,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wait_is_bounded() {
        let (_tx, rx) = channel(StoreState::empty("g".into()));

        let start = tokio::time::Instant::now();
        let _ = wait_if_stale(
            &rx,
            Duration::from_millis(10),
            Duration::from_millis(200),
            StaleTimeoutPolicy::Error,
        )
        .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(600));
    }
}
