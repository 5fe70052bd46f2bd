//! Persistent storage for manifests and downloaded resources.

mod sqlite_store;
mod store;

pub use sqlite_store::{SqliteCache, DEFAULT_RETAINED_GENERATIONS};
pub use store::{CacheError, CacheStats, CachedEntry, PersistentCache};
