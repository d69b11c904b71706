//! Caching store: per-key memoization over any other store.
//!
//! The memo table caches *parsed and validated* values, keyed by the raw
//! lookup key. Coherence is tied to data identity, not equality: whenever
//! the wrapped store's snapshot reference changes, the whole cache is
//! discarded before any further entry is added. Partial invalidation never
//! happens.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::key::KeyDef;
use crate::state::ConfigMap;
use crate::store::Store;

/// Type-erased memoized value. Downcast back on a hit, the same way an
/// in-memory store keeps typed entries without serialization overhead.
type CachedValue = Arc<dyn Any + Send + Sync>;

/// The memo table plus the snapshot reference it was built against.
struct CacheState {
    /// The wrapped store's data reference as last observed. Compared by
    /// identity only.
    backing: Arc<ConfigMap>,
    /// Lookup-key to parsed value, built incrementally, never eagerly.
    cache: HashMap<String, CachedValue>,
}

impl CacheState {
    fn fresh(backing: Arc<ConfigMap>) -> Self {
        CacheState {
            backing,
            cache: HashMap::new(),
        }
    }
}

/// A wrapper providing per-key memoization over another store.
///
/// For a purely static wrapped store the snapshot identity never changes,
/// so the cache fills once and is never invalidated. Wrapping a
/// [`DynamicStore`](crate::DynamicStore) gives memoized lookups that are
/// discarded wholesale on every successful refresh.
///
/// # Example
///
/// ```ignore
/// use dyncfg::{CachingStore, KeyDef, StaticStore};
///
/// let store = CachingStore::new(Arc::new(StaticStore::new(map)));
/// let port = KeyDef::<i64>::int("server.port").with_default(8080);
/// let value = store.lookup(&port).await?;
/// ```
pub struct CachingStore {
    inner: Arc<dyn Store>,
    state: RwLock<Option<CacheState>>,
}

impl CachingStore {
    /// Wrap a store with a memoization table. The cache starts empty and is
    /// populated lazily, one key at a time.
    pub fn new(inner: Arc<dyn Store>) -> Self {
        CachingStore {
            inner,
            state: RwLock::new(None),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    /// Number of memoized entries currently held.
    pub async fn cache_len(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map(|cs| cs.cache.len())
            .unwrap_or(0)
    }

    /// Memoized lookup of a typed, validated key.
    ///
    /// Obtains the wrapped store's current snapshot (which, for a dynamic
    /// store, runs its refresh-and-wait read path), invalidates the whole
    /// cache if the snapshot identity changed, then serves the definition
    /// from the cache or resolves and memoizes it.
    pub async fn lookup<T>(&self, def: &KeyDef<T>) -> Result<T, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let snapshot = self.inner.snapshot().await?;

        // Invalidate first: the cache must never serve an entry derived from
        // a different snapshot than the current one.
        let coherent = {
            let state = self.state.read().await;
            matches!(state.as_ref(), Some(cs) if Arc::ptr_eq(&cs.backing, &snapshot))
        };
        if !coherent {
            let mut state = self.state.write().await;
            // re-check under the write lock; another writer may have reset
            // the cache to this same snapshot already
            match state.as_ref() {
                Some(cs) if Arc::ptr_eq(&cs.backing, &snapshot) => {}
                _ => *state = Some(CacheState::fresh(Arc::clone(&snapshot))),
            }
        }

        if let Some(hit) = self.cached(def.key(), &snapshot).await? {
            return Ok(hit);
        }

        // Miss: full parse and validation against the snapshot, then
        // publish. Two concurrent misses may both resolve; the second write
        // overwrites with an equivalent value derived from the same map.
        let value = def.resolve(&snapshot)?;
        let mut state = self.state.write().await;
        match state.as_mut() {
            Some(cs) if Arc::ptr_eq(&cs.backing, &snapshot) => {
                cs.cache
                    .insert(def.key().to_string(), Arc::new(value.clone()));
            }
            // A refresh landed between resolve and publish. Skip memoizing a
            // value from a superseded snapshot; the next lookup rebuilds.
            _ => {}
        }
        Ok(value)
    }

    async fn cached<T>(&self, key: &str, snapshot: &Arc<ConfigMap>) -> Result<Option<T>, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let state = self.state.read().await;
        let Some(cs) = state.as_ref() else {
            return Ok(None);
        };
        if !Arc::ptr_eq(&cs.backing, snapshot) {
            return Ok(None);
        }
        match cs.cache.get(key) {
            None => Ok(None),
            Some(entry) => {
                let typed = entry
                    .clone()
                    .downcast::<T>()
                    .map_err(|_| StoreError::CacheType {
                        key: key.to_string(),
                    })?;
                Ok(Some((*typed).clone()))
            }
        }
    }
}

#[async_trait]
impl Store for CachingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Raw reads are not memoized; only parsed lookups are.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.contains(key).await
    }

    async fn snapshot(&self) -> Result<Arc<ConfigMap>, StoreError> {
        self.inner.snapshot().await
    }
}
