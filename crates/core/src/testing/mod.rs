//! Testing utilities and mock implementations.
//!
//! This module provides a scripted [`MockTransport`] and fixtures so the
//! orchestrator can be exercised without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use appcache_core::testing::{fixtures, MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.set_manifest(fixtures::MANIFEST_URL, fixtures::manifest(&["a.html"]));
//! transport.set_resource(&fixtures::resolve("a.html"), "<html/>");
//!
//! let orchestrator = UpdateOrchestrator::new(config, transport, fixtures::memory_cache());
//! ```

mod mock_transport;

pub use mock_transport::{MockTransport, RecordedFetch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use url::Url;

    use crate::cache::SqliteCache;
    use crate::orchestrator::{Status, UpdateOrchestrator};

    /// Manifest URL used throughout the fixtures.
    pub const MANIFEST_URL: &str = "http://app.test/dir/m.appcache";

    /// Build manifest text with `entries` in the explicit section.
    pub fn manifest(entries: &[&str]) -> String {
        let mut text = String::from("CACHE MANIFEST\n");
        for entry in entries {
            text.push_str(entry);
            text.push('\n');
        }
        text
    }

    /// Resolve a manifest token against [`MANIFEST_URL`].
    pub fn resolve(token: &str) -> String {
        Url::parse(MANIFEST_URL)
            .and_then(|base| base.join(token))
            .map(|url| url.to_string())
            .unwrap_or_else(|e| panic!("bad fixture token {:?}: {}", token, e))
    }

    /// A fresh in-memory cache.
    pub fn memory_cache() -> Arc<SqliteCache> {
        Arc::new(SqliteCache::in_memory().unwrap_or_else(|e| panic!("in-memory cache: {}", e)))
    }

    /// Wait until the orchestrator reaches `status`. Panics after five seconds.
    pub async fn wait_for_status(orchestrator: &UpdateOrchestrator, status: Status) {
        for _ in 0..1000 {
            if orchestrator.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected status {:?}, still {:?}",
            status,
            orchestrator.status()
        );
    }
}
