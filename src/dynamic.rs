//! Dynamic store: a [`Store`] backed by periodic asynchronous refresh.
//!
//! Every read does "maybe refresh" (a non-blocking signal to the background
//! refresher), then "maybe wait for freshness" (the bounded staleness
//! guard), then returns the current data.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::guard::{self, StaleTimeoutPolicy};
use crate::policy::FetchPolicy;
use crate::refresh::{self, ErrorHandler, FetchError, Fetcher, RefreshHandle};
use crate::state::{ConfigMap, StoreState};
use crate::store::Store;
use crate::utils::generated_name;

/// Construction options for [`DynamicStore`].
///
/// An explicit struct with named fields and defaults, validated at
/// construction time. `..Default::default()` fills whatever a caller does
/// not care about.
///
/// | field                | effect                                      | default            |
/// |----------------------|---------------------------------------------|--------------------|
/// | `name`               | diagnostic label                            | generated          |
/// | `fetch_interval`     | min. time between successful refreshes      | 1000 ms            |
/// | `error_backoff`      | min. time after an error before retrying    | 1000 ms            |
/// | `stale_after`        | age at which data is considered stale       | 5000 ms            |
/// | `stale_timeout`      | max wait for a refresh once staleness seen  | 1000 ms            |
/// | `stale_timeout_policy` | error vs. warn-and-continue               | `WarnAndContinue`  |
/// | `error_handler`      | `(store, error)` callback on fetch failure  | `tracing::error!`  |
#[derive(Clone)]
pub struct DynamicStoreConfig {
    /// Diagnostic label. Generated when `None`.
    pub name: Option<String>,
    /// Minimum time between successful refresh attempts.
    pub fetch_interval: Duration,
    /// Minimum time after a fetch error before retrying.
    pub error_backoff: Duration,
    /// Age at which data is considered stale and worth waiting for.
    pub stale_after: Duration,
    /// Maximum wait for a stale-triggered refresh to complete.
    pub stale_timeout: Duration,
    /// What a read does when the stale wait times out.
    pub stale_timeout_policy: StaleTimeoutPolicy,
    /// Callback for fetch failures. Defaults to logging at error level.
    pub error_handler: Option<ErrorHandler>,
}

impl Default for DynamicStoreConfig {
    fn default() -> Self {
        DynamicStoreConfig {
            name: None,
            fetch_interval: Duration::from_millis(1000),
            error_backoff: Duration::from_millis(1000),
            stale_after: Duration::from_millis(5000),
            stale_timeout: Duration::from_millis(1000),
            stale_timeout_policy: StaleTimeoutPolicy::default(),
            error_handler: None,
        }
    }
}

/// A store whose data is fetched asynchronously on a schedule.
///
/// Cloning is cheap and shares the same backing state and refresher task.
///
/// # Example
///
/// ```ignore
/// use dyncfg::{DynamicStore, DynamicStoreConfig, Store};
///
/// let store = DynamicStore::new(DynamicStoreConfig::default(), |_prev| async {
///     let mut map = dyncfg::ConfigMap::new();
///     map.insert("greeting".into(), "hello".into());
///     Ok(map)
/// }, None);
///
/// let value = store.get("greeting").await?;
/// ```
#[derive(Clone)]
pub struct DynamicStore {
    name: Arc<str>,
    stale_after: Duration,
    stale_timeout: Duration,
    stale_timeout_policy: StaleTimeoutPolicy,
    state: watch::Receiver<Arc<StoreState>>,
    refresher: RefreshHandle,
}

impl DynamicStore {
    /// Create a dynamic store and spawn its refresher task.
    ///
    /// # Arguments
    /// * `config` - Timing, policy and diagnostics options
    /// * `fetch` - `fetch(previous_data) -> new_data`; must be safe to call
    ///   repeatedly from a background task
    /// * `initial` - `None` queues an immediate async fetch before any value
    ///   is available; `Some` is used immediately and refreshed in the
    ///   background
    pub fn new<F, Fut>(config: DynamicStoreConfig, fetch: F, initial: Option<ConfigMap>) -> Self
    where
        F: Fn(Option<Arc<ConfigMap>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ConfigMap, FetchError>> + Send + 'static,
    {
        let name: Arc<str> = config
            .name
            .unwrap_or_else(|| generated_name("dynamic-store"))
            .into();
        let fetcher: Fetcher = Arc::new(move |prev| Box::pin(fetch(prev)));
        let error_handler = config
            .error_handler
            .unwrap_or_else(refresh::default_error_handler);
        let policy = FetchPolicy {
            fetch_interval: config.fetch_interval,
            error_backoff: config.error_backoff,
        };

        let (state, refresher) =
            refresh::spawn(Arc::clone(&name), initial, policy, fetcher, error_handler);

        DynamicStore {
            name,
            stale_after: config.stale_after,
            stale_timeout: config.stale_timeout,
            stale_timeout_policy: config.stale_timeout_policy,
            state,
            refresher,
        }
    }

    /// Enqueue a refresh signal without waiting. A no-op when the fetch
    /// policy decides nothing is due.
    pub fn submit_refresh(&self) {
        self.refresher.submit();
    }

    /// The current state snapshot, without triggering a refresh or waiting.
    pub fn state(&self) -> Arc<StoreState> {
        self.state.borrow().clone()
    }

    /// The full read path: signal, bounded wait, then read.
    async fn current(&self) -> Result<Arc<ConfigMap>, StoreError> {
        self.submit_refresh();
        guard::wait_if_stale(
            &self.state,
            self.stale_after,
            self.stale_timeout,
            self.stale_timeout_policy,
        )
        .await?;

        let state = self.state.borrow().clone();
        state.data.clone().ok_or_else(|| StoreError::Uninitialized {
            store: self.name.to_string(),
        })
    }
}

#[async_trait]
impl Store for DynamicStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.current().await?.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.current().await?.contains_key(key))
    }

    async fn snapshot(&self) -> Result<Arc<ConfigMap>, StoreError> {
        self.current().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> DynamicStoreConfig {
        DynamicStoreConfig {
            fetch_interval: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
            stale_after: Duration::from_millis(200),
            stale_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn map_of(key: &str, value: Value) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(key.into(), value);
        map
    }

    #[tokio::test]
    async fn test_eventual_initialization() {
        let store = DynamicStore::new(
            fast_config(),
            |_prev| async { Ok(map_of("foo", 10.into())) },
            None,
        );

        // the read waits (bounded) for the construction-time fetch
        let value = store.get("foo").await.unwrap();
        assert_eq!(value, Some(10.into()));
    }

    #[tokio::test]
    async fn test_initial_value_served_immediately() {
        let store = DynamicStore::new(
            DynamicStoreConfig {
                fetch_interval: Duration::from_secs(60),
                ..Default::default()
            },
            |_prev| async { Ok(map_of("foo", "10".into())) },
            Some(map_of("foo", "20".into())),
        );

        assert_eq!(store.get("foo").await.unwrap(), Some("20".into()));
    }

    #[tokio::test]
    async fn test_refresh_replaces_data_after_interval() {
        let store = DynamicStore::new(
            fast_config(),
            |_prev| async { Ok(map_of("foo", "10".into())) },
            Some(map_of("foo", "20".into())),
        );

        assert_eq!(store.get("foo").await.unwrap(), Some("20".into()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.submit_refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("foo").await.unwrap(), Some("10".into()));
    }

    #[tokio::test]
    async fn test_uninitialized_read_fails_by_name() {
        let store = DynamicStore::new(
            DynamicStoreConfig {
                name: Some("flaky".into()),
                stale_timeout: Duration::from_millis(50),
                stale_timeout_policy: StaleTimeoutPolicy::WarnAndContinue,
                ..fast_config()
            },
            |_prev| async { Err::<ConfigMap, _>("nope".into()) },
            None,
        );

        match store.get("foo").await {
            Err(StoreError::Uninitialized { store }) => assert_eq!(store, "flaky"),
            other => panic!("expected Uninitialized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_timeout_error_policy_surfaces() {
        let store = DynamicStore::new(
            DynamicStoreConfig {
                stale_after: Duration::from_millis(50),
                stale_timeout: Duration::from_millis(100),
                stale_timeout_policy: StaleTimeoutPolicy::Error,
                fetch_interval: Duration::from_millis(20),
                error_backoff: Duration::from_millis(20),
                ..Default::default()
            },
            |_prev| async { Err::<ConfigMap, _>("upstream down".into()) },
            Some(map_of("foo", "20".into())),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        match store.get("foo").await {
            Err(StoreError::StaleTimeout { .. }) => {}
            other => panic!("expected StaleTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_warn_policy_returns_last_known_value() {
        let store = DynamicStore::new(
            DynamicStoreConfig {
                stale_after: Duration::from_millis(50),
                stale_timeout: Duration::from_millis(100),
                stale_timeout_policy: StaleTimeoutPolicy::WarnAndContinue,
                fetch_interval: Duration::from_millis(20),
                error_backoff: Duration::from_millis(20),
                ..Default::default()
            },
            |_prev| async { Err::<ConfigMap, _>("upstream down".into()) },
            Some(map_of("foo", "20".into())),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("foo").await.unwrap(), Some("20".into()));
    }

    #[tokio::test]
    async fn test_fetch_receives_previous_data() {
        let seen_prev = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_clone = seen_prev.clone();

        let store = DynamicStore::new(
            fast_config(),
            move |prev| {
                let seen = seen_clone.clone();
                async move {
                    seen.store(prev.map(|p| p.len()).unwrap_or(0), Ordering::SeqCst);
                    Ok(map_of("foo", 1.into()))
                }
            },
            Some(map_of("foo", 0.into())),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.submit_refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the refresher handed the previous one-entry snapshot to fetch
        assert_eq!(seen_prev.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_independent_stores_do_not_interfere() {
        let a = DynamicStore::new(
            fast_config(),
            |_prev| async { Ok(map_of("k", "a".into())) },
            None,
        );
        let b = DynamicStore::new(
            fast_config(),
            |_prev| async { Ok(map_of("k", "b".into())) },
            None,
        );

        assert_eq!(a.get("k").await.unwrap(), Some("a".into()));
        assert_eq!(b.get("k").await.unwrap(), Some("b".into()));
    }
}
