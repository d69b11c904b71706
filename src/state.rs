use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::utils::now_ms;

/// The raw configuration snapshot: key to raw value.
///
/// A snapshot is always shared as `Arc<ConfigMap>` and never mutated in
/// place; a refresh builds a brand-new map and replaces the reference.
/// Cache coherence in [`CachingStore`](crate::CachingStore) relies on that
/// reference identity, so handing out a mutated map under the same `Arc`
/// would break invalidation.
pub type ConfigMap = HashMap<String, Value>;

/// Immutable snapshot of a store's data plus refresh bookkeeping.
///
/// Every version is a freshly-allocated replacement value written by exactly
/// one writer (the background refresher task); readers hold an `Arc` clone
/// and never observe a partially-updated state.
#[derive(Debug, Clone)]
pub struct StoreState {
    /// Diagnostic label of the owning store.
    pub name: Arc<str>,

    /// The currently-known-good snapshot. `None` only before the first
    /// successful fetch completes.
    pub data: Option<Arc<ConfigMap>>,

    /// Milliseconds timestamp of the last successful fetch, `0` when never
    /// yet populated. Monotonically non-decreasing for the life of a store.
    pub updated_at: i64,

    /// Timestamp of the most recent fetch failure. `None` means no error has
    /// occurred since the last successful fetch.
    pub last_error_at: Option<i64>,
}

impl StoreState {
    /// State of a store that has never fetched.
    pub fn empty(name: Arc<str>) -> Self {
        StoreState {
            name,
            data: None,
            updated_at: 0,
            last_error_at: None,
        }
    }

    /// State seeded with an initial snapshot, stamped with the current time.
    pub fn seeded(name: Arc<str>, data: ConfigMap) -> Self {
        StoreState {
            name,
            data: Some(Arc::new(data)),
            updated_at: now_ms(),
            last_error_at: None,
        }
    }

    /// Successor state after a successful fetch. Clears any recorded error.
    pub fn committed(&self, data: ConfigMap, at: i64) -> Self {
        StoreState {
            name: Arc::clone(&self.name),
            data: Some(Arc::new(data)),
            updated_at: at.max(self.updated_at),
            last_error_at: None,
        }
    }

    /// Successor state after a failed fetch. The previous data is left
    /// untouched.
    pub fn errored(&self, at: i64) -> Self {
        StoreState {
            name: Arc::clone(&self.name),
            data: self.data.clone(),
            updated_at: self.updated_at,
            last_error_at: Some(at),
        }
    }
}
