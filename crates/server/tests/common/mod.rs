//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a scriptable upstream client, so the HTTP surface can be
//! exercised without reaching the catalog.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use douban_meta_core::{testing::MockUpstreamClient, Config, MetadataResolver};
use douban_meta_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use douban_meta_core::testing::fixtures;

/// Test fixture for E2E testing with a mock upstream.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_subject_lookup() {
///     let fixture = TestFixture::new();
///     fixture.upstream.add_subject(fixtures::subject("1291561", "千与千寻")).await;
///
///     let response = fixture.get("/api/v1/subjects/1291561").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock upstream client - configure hits, subjects and images
    pub upstream: Arc<MockUpstreamClient>,
    /// Shared state, for triggering shutdown
    pub state: Arc<AppState>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Parsed JSON body, `Value::Null` when the body is not JSON.
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with the default config.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let upstream = Arc::new(MockUpstreamClient::new());
        let resolver = Arc::new(MetadataResolver::new(upstream.clone()));
        let state = Arc::new(AppState::new(config, resolver));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            upstream,
            state,
        }
    }

    /// Make a GET request.
    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            content_type,
            bytes,
            body,
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestResponse {
    /// Assert the response has the expected status code.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {}. Body: {}",
            expected, self.status, self.body
        );
        self
    }

    /// Body as text, for non-JSON responses.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}
