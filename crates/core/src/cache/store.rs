//! Persistent cache trait and types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::manifest::ManifestDocument;
use crate::transport::Validators;

/// Error type for cache operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A stored response body with its validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub body: Vec<u8>,
    pub validators: Validators,
    /// Lowercase hex SHA-256 of `body`.
    pub digest: String,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(body: Vec<u8>, validators: Validators) -> Self {
        let digest = format!("{:x}", Sha256::digest(&body));
        Self {
            body,
            validators,
            digest,
            stored_at: Utc::now(),
        }
    }
}

/// Counters describing the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of manifest generations stored.
    pub manifest_generations: u64,
    /// Number of stored entries, the manifest's own included.
    pub entries: u64,
    /// Total size of stored bodies.
    pub total_bytes: u64,
    /// Master entries still waiting for a download.
    pub pending_entries: u64,
}

/// Storage for manifests, their master entries and downloaded bodies.
///
/// Holds one manifest at a time; storing a manifest starts a new generation.
pub trait PersistentCache: Send + Sync {
    /// Store `document` as the newest manifest generation.
    fn store_manifest(&self, document: &ManifestDocument) -> Result<(), CacheError>;

    /// The newest stored manifest, if any.
    fn stored_manifest(&self) -> Result<Option<ManifestDocument>, CacheError>;

    /// Invalidate the cached manifest entry for `url` so the next fetch is
    /// unconditional.
    ///
    /// Without `fully` only the validators are dropped and the body is kept;
    /// with `fully` the whole entry is removed.
    fn invalidate_manifest(&self, url: &Url, fully: bool) -> Result<(), CacheError>;

    /// Mark every master entry of the newest manifest as pending. Entries of
    /// older generations are forgotten. Returns the number of marked entries.
    fn mark_pending_master_entries(&self) -> Result<usize, CacheError>;

    /// Pending master entries in manifest order.
    fn pending_master_entries(&self) -> Result<Vec<Url>, CacheError>;

    /// The stored entry for `url`.
    fn get(&self, url: &Url) -> Result<Option<CachedEntry>, CacheError>;

    /// Store an entry, replacing any previous one, and clear its pending mark.
    fn put(&self, url: &Url, entry: &CachedEntry) -> Result<(), CacheError>;

    /// Current counters.
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
