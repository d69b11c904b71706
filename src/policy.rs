use std::time::Duration;

use crate::state::StoreState;

/// Predicate deciding whether a refresh should be attempted now.
///
/// Two rules compose by logical AND: a store will not re-fetch healthy data
/// faster than `fetch_interval`, and will not hammer a failing upstream
/// source faster than `error_backoff`.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Minimum time between successful refresh attempts.
    pub fetch_interval: Duration,
    /// Minimum time after a fetch error before retrying.
    pub error_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy {
            fetch_interval: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(1000),
        }
    }
}

impl FetchPolicy {
    /// True once `fetch_interval` has passed since the last successful fetch.
    ///
    /// Always true for a never-populated store (`updated_at == 0`).
    pub fn interval_elapsed(&self, state: &StoreState, now: i64) -> bool {
        now - state.updated_at >= self.fetch_interval.as_millis() as i64
    }

    /// True if no error is recorded, or `error_backoff` has passed since the
    /// most recent one.
    pub fn backoff_elapsed(&self, state: &StoreState, now: i64) -> bool {
        match state.last_error_at {
            None => true,
            Some(at) => now - at >= self.error_backoff.as_millis() as i64,
        }
    }

    /// The effective policy: both rules must agree.
    pub fn should_fetch(&self, state: &StoreState, now: i64) -> bool {
        self.interval_elapsed(state, now) && self.backoff_elapsed(state, now)
    }
}
