//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real orchestrator, a scripted transport and an on-disk cache,
//! enabling API testing without any network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use appcache_core::{
    load_config_from_str, testing::MockTransport, OrchestratorConfig, SqliteCache,
    UpdateOrchestrator,
};
use appcache_server::{events::event_listener, state::AppState};

/// Re-export fixtures for test convenience
pub use appcache_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_status() {
///     let fixture = TestFixture::new();
///     fixture.transport.set_manifest(fixtures::MANIFEST_URL, fixtures::manifest(&[]));
///     fixture.init();
///
///     let response = fixture.get("/api/v1/status").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock transport - script manifest and resource answers
    pub transport: Arc<MockTransport>,
    /// The orchestrator behind the router
    pub orchestrator: Arc<UpdateOrchestrator>,
    /// Temporary directory for the cache database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default orchestrator settings.
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    /// Create a test fixture with custom orchestrator settings.
    pub fn with_config(orchestrator_config: OrchestratorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("cache.db");

        let mut config = load_config_from_str(&format!(
            "[manifest]\nurl = \"{}\"\n[cache]\npath = {:?}\n",
            fixtures::MANIFEST_URL,
            db_path
        ))
        .expect("Failed to build config");
        config.orchestrator = orchestrator_config.clone();

        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(SqliteCache::new(&db_path).expect("Failed to create cache"));
        let orchestrator = Arc::new(UpdateOrchestrator::new(
            orchestrator_config.clone(),
            transport.clone(),
            cache,
        ));
        orchestrator.set_event_listener(event_listener(
            &orchestrator,
            orchestrator_config.auto_swap,
        ));

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = appcache_server::api::create_router(state);

        Self {
            router,
            transport,
            orchestrator,
            temp_dir,
        }
    }

    /// Start the session against [`fixtures::MANIFEST_URL`].
    pub fn init(&self) {
        self.orchestrator
            .init(fixtures::MANIFEST_URL)
            .expect("Failed to init orchestrator");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
