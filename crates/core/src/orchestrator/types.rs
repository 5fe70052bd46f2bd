//! Types for the update orchestrator.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::manifest::ManifestError;
use crate::request::SessionTag;

/// Errors returned synchronously by orchestrator operations.
///
/// Fetch failures are never returned; they surface as [`CacheEvent::Error`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The operation is not allowed in the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The manifest URL is unusable.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Persistent cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Status of an application cache session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// `init` has not been called.
    Uncached,
    /// Nothing in progress.
    Idle,
    /// Fetching the manifest.
    Checking,
    /// Fetching master entries.
    Downloading,
    /// Every master entry is stored; waiting for `swap_cache`.
    UpdateReady,
    /// The last manifest fetch failed.
    Obsolete,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Uncached => "uncached",
            Status::Idle => "idle",
            Status::Checking => "checking",
            Status::Downloading => "downloading",
            Status::UpdateReady => "update_ready",
            Status::Obsolete => "obsolete",
        }
    }

    /// Whether an update cycle is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Checking | Status::Downloading)
    }
}

/// Notifications emitted while a cycle runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Checking,
    /// A fetch failed. `manifest` tells whether it was the manifest itself.
    Error {
        manifest: bool,
        url: String,
        message: String,
    },
    NoUpdate,
    Downloading {
        total: usize,
    },
    Progress {
        url: String,
        loaded: usize,
        total: usize,
    },
    UpdateReady,
    Obsolete,
    /// A watchdog period passed without download progress.
    Stalled {
        loaded: usize,
        total: usize,
    },
}

impl CacheEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Checking => "checking",
            CacheEvent::Error { .. } => "error",
            CacheEvent::NoUpdate => "no_update",
            CacheEvent::Downloading { .. } => "downloading",
            CacheEvent::Progress { .. } => "progress",
            CacheEvent::UpdateReady => "update_ready",
            CacheEvent::Obsolete => "obsolete",
            CacheEvent::Stalled { .. } => "stalled",
        }
    }
}

/// Callback invoked for every event, in emission order.
pub type EventCallback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    pub session: SessionTag,
    /// Id of the most recent cycle, 0 before the first one.
    pub cycle: u64,
    /// Resources stored in the current cycle.
    pub loaded: usize,
    /// Resources planned in the current cycle.
    pub total: usize,
    /// Number of swaps performed.
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(Status::UpdateReady.as_str(), "update_ready");
        assert_eq!(
            serde_json::to_string(&Status::UpdateReady).unwrap(),
            "\"update_ready\""
        );
        assert!(Status::Checking.is_busy());
        assert!(!Status::Obsolete.is_busy());
    }

    #[test]
    fn test_event_serialization() {
        let event = CacheEvent::Progress {
            url: "http://x/a".to_string(),
            loaded: 1,
            total: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["loaded"], 1);
        assert_eq!(event.name(), "progress");
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::InvalidState("not ready".to_string());
        assert_eq!(err.to_string(), "invalid state: not ready");

        let err = OrchestratorError::from(ManifestError::NotAManifest);
        assert_eq!(err.to_string(), "manifest error: not a cache manifest");
    }
}
