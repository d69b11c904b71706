//! dyncfg - an adaptive configuration store
//!
//! A read-mostly key/value container whose underlying data can be:
//! - fetched asynchronously from an external source on a schedule, with
//!   error backoff and bounded staleness for readers
//! - wrapped with a per-key memoizing cache that stays coherent with the
//!   underlying data by reference identity
//!
//! plus the supporting pieces a configuration system needs: typed key
//! definitions, property/JSON file loading with cascading parents, and
//! `${var}` template substitution.
//!
//! # Example
//!
//! ```ignore
//! use dyncfg::{CachingStore, ConfigMap, DynamicStore, DynamicStoreConfig, KeyDef};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Refreshes at most once a second, readers wait at most one second
//!     // for stale data to catch up.
//!     let store = DynamicStore::new(
//!         DynamicStoreConfig::default(),
//!         |_previous| async {
//!             let mut map = ConfigMap::new();
//!             map.insert("pool.size".into(), "10".into());
//!             Ok(map)
//!         },
//!         None,
//!     );
//!
//!     // Memoize parsed lookups; the cache is discarded wholesale whenever
//!     // a refresh replaces the snapshot.
//!     let cached = CachingStore::new(Arc::new(store));
//!     let pool_size = KeyDef::<i64>::int("pool.size").with_default(4);
//!     println!("pool size: {}", cached.lookup(&pool_size).await?);
//!     Ok(())
//! }
//! ```

mod caching;
mod dynamic;
mod error;
mod guard;
mod key;
mod loader;
mod policy;
mod refresh;
mod state;
mod store;
mod template;
mod utils;

// Re-export public API
pub use caching::CachingStore;
pub use dynamic::{DynamicStore, DynamicStoreConfig};
pub use error::{ConfigError, StoreError, TemplateError};
pub use guard::StaleTimeoutPolicy;
pub use key::{lookup, KeyDef};
pub use loader::{load_cascading, load_config, resolve_config, write_config};
pub use policy::FetchPolicy;
pub use refresh::{ErrorHandler, FetchError};
pub use state::{ConfigMap, StoreState};
pub use store::{StaticStore, Store};
pub use template::{escape, realize};
