//! Descriptors for the two kinds of fetch an update cycle issues.
//!
//! A descriptor says what to fetch and how to interpret the answer; moving
//! bytes is left to a [`Transport`](crate::transport::Transport). Every
//! descriptor carries the [`FetchTag`] of the cycle that issued it.

use std::fmt;

use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::cache::CachedEntry;
use crate::manifest::{ManifestDocument, ManifestError, ManifestOptions};
use crate::transport::{ManifestResponse, ResourceResponse, TransportError, Validators};

/// Identity of one orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionTag(Uuid);

impl SessionTag {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one update cycle within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FetchTag {
    pub session: SessionTag,
    pub cycle: u64,
}

impl fmt::Display for FetchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.cycle)
    }
}

/// A fetched and parsed manifest.
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub document: ManifestDocument,
    pub not_modified: bool,
    /// Raw body and validators to remember for the next conditional fetch.
    pub entry: CachedEntry,
}

/// Fetch the manifest.
#[derive(Debug, Clone)]
pub struct ManifestRequest {
    pub url: Url,
    /// Previously cached manifest response, used for a conditional fetch.
    pub cached: Option<CachedEntry>,
    pub tag: FetchTag,
}

impl ManifestRequest {
    pub fn new(url: Url, cached: Option<CachedEntry>, tag: FetchTag) -> Self {
        Self { url, cached, tag }
    }

    /// Validators to send, empty for an unconditional fetch.
    pub fn validators(&self) -> Validators {
        self.cached
            .as_ref()
            .map(|entry| entry.validators.clone())
            .unwrap_or_default()
    }

    /// Parse a response into a document anchored at this request's URL.
    pub fn parse_response(
        &self,
        response: &ManifestResponse,
        options: ManifestOptions,
    ) -> Result<FetchedManifest, ManifestError> {
        let document = ManifestDocument::parse(Some(self.url.as_str()), options, &response.body)?;
        Ok(FetchedManifest {
            document,
            not_modified: response.not_modified,
            entry: CachedEntry::new(response.body.clone(), response.validators.clone()),
        })
    }
}

/// Fetch one master entry and store it.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub url: Url,
    /// Number of resources in the issuing cycle's plan.
    pub total: usize,
    /// Previously cached response, used for a conditional fetch.
    pub cached: Option<CachedEntry>,
    pub tag: FetchTag,
}

impl ResourceRequest {
    pub fn new(url: Url, total: usize, cached: Option<CachedEntry>, tag: FetchTag) -> Self {
        Self {
            url,
            total,
            cached,
            tag,
        }
    }

    pub fn validators(&self) -> Validators {
        self.cached
            .as_ref()
            .map(|entry| entry.validators.clone())
            .unwrap_or_default()
    }

    /// Turn a response into the entry to store.
    ///
    /// A "not modified" answer reuses the cached body, keeping the cached
    /// validators unless the response brought new ones.
    pub fn into_entry(self, response: ResourceResponse) -> Result<CachedEntry, TransportError> {
        if response.not_modified {
            let cached = self
                .cached
                .ok_or_else(|| TransportError::NotModifiedWithoutCache(self.url.to_string()))?;
            let validators = if response.validators.is_empty() {
                cached.validators
            } else {
                response.validators
            };
            return Ok(CachedEntry::new(cached.body, validators));
        }

        let body = response.body.ok_or_else(|| {
            TransportError::Request(format!("empty response body for {}", self.url))
        })?;
        Ok(CachedEntry::new(body, response.validators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag() -> FetchTag {
        FetchTag {
            session: SessionTag::new(),
            cycle: 1,
        }
    }

    fn cached(body: &[u8], etag: &str) -> CachedEntry {
        CachedEntry::new(
            body.to_vec(),
            Validators {
                etag: Some(etag.to_string()),
                last_modified: None,
            },
        )
    }

    #[test]
    fn test_manifest_request_validators() {
        let url = Url::parse("http://x/m.appcache").unwrap();
        let request = ManifestRequest::new(url.clone(), None, tag());
        assert!(request.validators().is_empty());

        let request = ManifestRequest::new(url, Some(cached(b"CACHE MANIFEST\n", "\"m\"")), tag());
        assert_eq!(request.validators().etag.as_deref(), Some("\"m\""));
    }

    #[test]
    fn test_manifest_parse_response() {
        let request = ManifestRequest::new(
            Url::parse("http://x/dir/m.appcache").unwrap(),
            None,
            tag(),
        );
        let response = ManifestResponse {
            body: b"CACHE MANIFEST\na.html\n".to_vec(),
            not_modified: false,
            validators: Validators {
                etag: Some("\"1\"".to_string()),
                last_modified: None,
            },
        };

        let fetched = request
            .parse_response(&response, ManifestOptions::default())
            .unwrap();
        assert!(!fetched.not_modified);
        assert_eq!(
            fetched.document.master_entries()[0].as_str(),
            "http://x/dir/a.html"
        );
        assert_eq!(fetched.entry.body, response.body);
        assert_eq!(fetched.entry.validators, response.validators);
    }

    #[test]
    fn test_manifest_parse_response_rejects_garbage() {
        let request =
            ManifestRequest::new(Url::parse("http://x/m.appcache").unwrap(), None, tag());
        let response = ManifestResponse {
            body: b"<html></html>".to_vec(),
            not_modified: false,
            validators: Validators::default(),
        };
        assert_eq!(
            request
                .parse_response(&response, ManifestOptions::default())
                .unwrap_err(),
            ManifestError::NotAManifest
        );
    }

    #[test]
    fn test_resource_fresh_body() {
        let request =
            ResourceRequest::new(Url::parse("http://x/a.html").unwrap(), 1, None, tag());
        let entry = request.into_entry(ResourceResponse::fresh("hi")).unwrap();
        assert_eq!(entry.body, b"hi");
    }

    #[test]
    fn test_resource_not_modified_reuses_cache() {
        let request = ResourceRequest::new(
            Url::parse("http://x/a.html").unwrap(),
            1,
            Some(cached(b"old", "\"a\"")),
            tag(),
        );
        let entry = request.into_entry(ResourceResponse::not_modified()).unwrap();
        assert_eq!(entry.body, b"old");
        assert_eq!(entry.validators.etag.as_deref(), Some("\"a\""));
    }

    #[test]
    fn test_resource_not_modified_without_cache() {
        let request =
            ResourceRequest::new(Url::parse("http://x/a.html").unwrap(), 1, None, tag());
        let err = request
            .into_entry(ResourceResponse::not_modified())
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::NotModifiedWithoutCache("http://x/a.html".to_string())
        );
    }

    #[test]
    fn test_fetch_tag_display() {
        let t = tag();
        assert!(t.to_string().ends_with("#1"));
    }
}
