//! Mock transport for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use crate::request::{FetchTag, ManifestRequest, ResourceRequest};
use crate::transport::{
    ManifestResponse, ResourceResponse, Transport, TransportError, Validators,
};

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// URL that was requested.
    pub url: String,
    /// Validators the request carried (empty = unconditional).
    pub validators: Validators,
    /// Cycle that issued the request.
    pub tag: FetchTag,
    /// When the request was made.
    pub timestamp: DateTime<Utc>,
}

/// Scripted answer for a manifest URL.
#[derive(Debug, Clone)]
enum ManifestReply {
    Fresh(ManifestResponse),
    /// Answer like a `304`: the cached body, or an error when nothing is cached.
    NotModified,
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    manifests: HashMap<String, ManifestReply>,
    resources: HashMap<String, Result<ResourceResponse, TransportError>>,
    held: HashSet<String>,
    manifest_requests: Vec<RecordedFetch>,
    resource_requests: Vec<RecordedFetch>,
    next_error: Option<TransportError>,
}

/// Mock implementation of the Transport trait.
///
/// Provides controllable behavior for testing:
/// - Script manifest and resource answers per URL
/// - Hold resource fetches until released
/// - Simulate failures
/// - Record every request for assertions
///
/// Unscripted URLs answer with `HTTP 404`.
///
/// # Example
///
/// ```rust,ignore
/// let transport = MockTransport::new();
/// transport.set_manifest("http://x/m.appcache", "CACHE MANIFEST\na.html\n");
/// transport.set_resource("http://x/a.html", "<html/>");
/// transport.hold_resource("http://x/a.html");
///
/// // ... drive an orchestrator ...
///
/// transport.release_resource("http://x/a.html");
/// assert_eq!(transport.resource_requests().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    released: Arc<Notify>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer manifest fetches of `url` with `body` and no validators.
    pub fn set_manifest(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.set_manifest_response(
            url,
            ManifestResponse {
                body: body.into(),
                not_modified: false,
                validators: Validators::default(),
            },
        );
    }

    /// Answer manifest fetches of `url` with a full response.
    pub fn set_manifest_response(&self, url: &str, response: ManifestResponse) {
        self.lock()
            .manifests
            .insert(url.to_string(), ManifestReply::Fresh(response));
    }

    /// Answer manifest fetches of `url` with "not modified".
    pub fn set_manifest_not_modified(&self, url: &str) {
        self.lock()
            .manifests
            .insert(url.to_string(), ManifestReply::NotModified);
    }

    /// Make manifest fetches of `url` fail.
    pub fn fail_manifest(&self, url: &str, error: TransportError) {
        self.lock()
            .manifests
            .insert(url.to_string(), ManifestReply::Fail(error));
    }

    /// Answer resource fetches of `url` with `body`.
    pub fn set_resource(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.set_resource_response(url, ResourceResponse::fresh(body));
    }

    /// Answer resource fetches of `url` with a full response.
    pub fn set_resource_response(&self, url: &str, response: ResourceResponse) {
        self.lock().resources.insert(url.to_string(), Ok(response));
    }

    /// Make resource fetches of `url` fail.
    pub fn fail_resource(&self, url: &str, error: TransportError) {
        self.lock().resources.insert(url.to_string(), Err(error));
    }

    /// Keep fetches of `url` pending until [`release_resource`](Self::release_resource).
    pub fn hold_resource(&self, url: &str) {
        self.lock().held.insert(url.to_string());
    }

    /// Let held fetches of `url` complete.
    pub fn release_resource(&self, url: &str) {
        self.lock().held.remove(url);
        self.released.notify_waiters();
    }

    /// Let every held fetch complete.
    pub fn release_all(&self) {
        self.lock().held.clear();
        self.released.notify_waiters();
    }

    /// Make the next fetch of any kind fail with this error.
    pub fn set_next_error(&self, error: TransportError) {
        self.lock().next_error = Some(error);
    }

    /// Get all recorded manifest fetches.
    pub fn manifest_requests(&self) -> Vec<RecordedFetch> {
        self.lock().manifest_requests.clone()
    }

    /// Get all recorded resource fetches.
    pub fn resource_requests(&self) -> Vec<RecordedFetch> {
        self.lock().resource_requests.clone()
    }

    /// Clear recorded requests.
    pub fn clear_recorded(&self) {
        let mut state = self.lock();
        state.manifest_requests.clear();
        state.resource_requests.clear();
    }

    /// Wait until at least `count` resource fetches have been recorded.
    ///
    /// Panics after five seconds.
    pub async fn wait_for_resource_requests(&self, count: usize) {
        for _ in 0..1000 {
            if self.lock().resource_requests.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {} resource requests, saw {}",
            count,
            self.lock().resource_requests.len()
        );
    }

    fn record(url: &str, validators: Validators, tag: FetchTag) -> RecordedFetch {
        RecordedFetch {
            url: url.to_string(),
            validators,
            tag,
            timestamp: Utc::now(),
        }
    }

    async fn wait_while_held(&self, url: &str) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.lock().held.contains(url) {
                return;
            }
            notified.await;
        }
    }
}

fn not_found(url: &str) -> TransportError {
    TransportError::Status {
        url: url.to_string(),
        status: 404,
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_manifest(
        &self,
        request: &ManifestRequest,
    ) -> Result<ManifestResponse, TransportError> {
        let url = request.url.as_str();
        let reply = {
            let mut state = self.lock();
            state
                .manifest_requests
                .push(Self::record(url, request.validators(), request.tag));
            if let Some(error) = state.next_error.take() {
                return Err(error);
            }
            state.manifests.get(url).cloned()
        };

        match reply {
            Some(ManifestReply::Fresh(response)) => Ok(response),
            Some(ManifestReply::NotModified) => {
                let cached = request
                    .cached
                    .as_ref()
                    .ok_or_else(|| TransportError::NotModifiedWithoutCache(url.to_string()))?;
                Ok(ManifestResponse {
                    body: cached.body.clone(),
                    not_modified: true,
                    validators: cached.validators.clone(),
                })
            }
            Some(ManifestReply::Fail(error)) => Err(error),
            None => Err(not_found(url)),
        }
    }

    async fn fetch_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, TransportError> {
        let url = request.url.as_str();
        {
            let mut state = self.lock();
            state
                .resource_requests
                .push(Self::record(url, request.validators(), request.tag));
            if let Some(error) = state.next_error.take() {
                return Err(error);
            }
        }

        self.wait_while_held(url).await;

        let reply = self.lock().resources.get(url).cloned();
        reply.unwrap_or_else(|| Err(not_found(url)))
    }
}
