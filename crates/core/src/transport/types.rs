//! Types for fetching manifests and resources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::{ManifestRequest, ResourceRequest};

/// Errors that can occur while fetching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Not modified but nothing cached for {0}")]
    NotModifiedWithoutCache(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// HTTP cache validators of a stored response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    /// `ETag` header value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `Last-Modified` header value, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Result of a manifest fetch.
///
/// A "not modified" response carries the body of the cached manifest so the
/// caller always gets a complete document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResponse {
    pub body: Vec<u8>,
    pub not_modified: bool,
    pub validators: Validators,
}

/// Result of a resource fetch. `body` is `None` for "not modified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub body: Option<Vec<u8>>,
    pub not_modified: bool,
    pub validators: Validators,
}

impl ResourceResponse {
    /// A fresh `200 OK` response.
    pub fn fresh(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
            not_modified: false,
            validators: Validators::default(),
        }
    }

    /// A `304 Not Modified` response.
    pub fn not_modified() -> Self {
        Self {
            body: None,
            not_modified: true,
            validators: Validators::default(),
        }
    }

    pub fn with_validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }
}

/// Fetches manifests and resources over the network.
///
/// Implementations do not retry. Cancellation happens by dropping the
/// returned future.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch the manifest, conditionally when the request carries a cached
    /// entry.
    async fn fetch_manifest(
        &self,
        request: &ManifestRequest,
    ) -> Result<ManifestResponse, TransportError>;

    /// Fetch a single resource, conditionally when the request carries a
    /// cached entry.
    async fn fetch_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Status {
            url: "http://x/a".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 for http://x/a");
        assert_eq!(TransportError::Timeout.to_string(), "Request timeout");
    }

    #[test]
    fn test_validators_empty() {
        assert!(Validators::default().is_empty());
        let v = Validators {
            etag: Some("\"abc\"".to_string()),
            last_modified: None,
        };
        assert!(!v.is_empty());
    }
}
