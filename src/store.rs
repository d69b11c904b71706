use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::state::ConfigMap;
use crate::utils::generated_name;

/// The narrow store abstraction shared by static maps,
/// [`DynamicStore`](crate::DynamicStore) and
/// [`CachingStore`](crate::CachingStore).
///
/// The key-definition layer depends only on this interface, so all three
/// variants are interchangeable to it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Diagnostic label, used in log lines and error messages.
    fn name(&self) -> &str;

    /// Return the raw value for the key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Whether the key is present.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// The whole current data snapshot.
    ///
    /// Implementations return a shared reference to the live snapshot, not a
    /// copy: callers compare successive snapshots by identity to detect that
    /// a refresh replaced the data.
    async fn snapshot(&self) -> Result<Arc<ConfigMap>, StoreError>;
}

/// A store over a fixed, immutable map. No refresh ever happens, so its
/// snapshot identity is stable for its whole lifetime.
#[derive(Clone)]
pub struct StaticStore {
    name: Arc<str>,
    data: Arc<ConfigMap>,
}

impl StaticStore {
    /// Create a static store with a generated diagnostic name.
    pub fn new(data: ConfigMap) -> Self {
        Self::named(generated_name("static-store"), data)
    }

    /// Create a static store with an explicit diagnostic name.
    pub fn named(name: impl Into<String>, data: ConfigMap) -> Self {
        StaticStore {
            name: name.into().into(),
            data: Arc::new(data),
        }
    }
}

impl From<ConfigMap> for StaticStore {
    fn from(data: ConfigMap) -> Self {
        StaticStore::new(data)
    }
}

#[async_trait]
impl Store for StaticStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    async fn snapshot(&self) -> Result<Arc<ConfigMap>, StoreError> {
        Ok(Arc::clone(&self.data))
    }
}
