//! Background refresher: the single-writer execution path that performs
//! fetches and commits new [`StoreState`] values.
//!
//! One dedicated tokio task per store consumes a signal mailbox. The task is
//! the only holder of the `watch` sender, so state updates are totally
//! ordered without readers ever taking a lock: readers clone the current
//! `Arc<StoreState>` out of the `watch` receiver.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use crate::policy::FetchPolicy;
use crate::state::{ConfigMap, StoreState};
use crate::utils::now_ms;

/// Failure type produced by the injected fetch function.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// The externally supplied fetch function: `fetch(previous_data) -> new_data`.
///
/// Called repeatedly from the refresher task, never from a reader's thread.
pub type Fetcher =
    Arc<dyn Fn(Option<Arc<ConfigMap>>) -> BoxFuture<'static, Result<ConfigMap, FetchError>> + Send + Sync>;

/// Callback invoked with `(store_name, error)` on every fetch failure.
pub type ErrorHandler = Arc<dyn Fn(&str, &FetchError) + Send + Sync>;

/// The default error handler logs through `tracing` at error level.
pub(crate) fn default_error_handler() -> ErrorHandler {
    Arc::new(|store, error| {
        tracing::error!(store = %store, error = %error, "config fetch failed");
    })
}

/// Handle to a store's refresher task. Cloning shares the same mailbox.
///
/// When the last handle is dropped the mailbox closes and the task exits.
#[derive(Clone)]
pub(crate) struct RefreshHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshHandle {
    /// Enqueue a refresh signal. Non-blocking; whether a fetch actually runs
    /// is up to the [`FetchPolicy`] evaluated inside the task. A signal sent
    /// after the task has exited is silently dropped.
    pub fn submit(&self) {
        let _ = self.tx.send(());
    }
}

/// Spawn the refresher task for a store.
///
/// Returns the state receiver for readers plus the mailbox handle. When
/// `initial` is `None` a first refresh signal is queued immediately so the
/// store starts fetching before any read arrives.
pub(crate) fn spawn(
    name: Arc<str>,
    initial: Option<ConfigMap>,
    policy: FetchPolicy,
    fetcher: Fetcher,
    error_handler: ErrorHandler,
) -> (watch::Receiver<Arc<StoreState>>, RefreshHandle) {
    let state = match initial {
        Some(data) => StoreState::seeded(Arc::clone(&name), data),
        None => StoreState::empty(Arc::clone(&name)),
    };
    let never_fetched = state.data.is_none();

    let (state_tx, state_rx) = watch::channel(Arc::new(state));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = RefreshHandle { tx };

    if never_fetched {
        handle.submit();
    }

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let current: Arc<StoreState> = state_tx.borrow().clone();
            if !policy.should_fetch(&current, now_ms()) {
                continue;
            }

            match fetcher(current.data.clone()).await {
                Ok(data) => {
                    let committed = current.committed(data, now_ms());
                    tracing::debug!(
                        store = %name,
                        updated_at = committed.updated_at,
                        entries = committed.data.as_ref().map(|d| d.len()).unwrap_or(0),
                        "refresh committed"
                    );
                    state_tx.send_replace(Arc::new(committed));
                }
                Err(error) => {
                    error_handler(&name, &error);
                    state_tx.send_replace(Arc::new(current.errored(now_ms())));
                }
            }
        }
    });

    (state_rx, handle)
}
