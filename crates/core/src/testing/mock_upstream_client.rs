//! Mock upstream client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::upstream::{
    HttpResponse, MediaKind, SearchTarget, Subject, UpstreamClient, UpstreamError,
};

/// A recorded name search for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub name: String,
    pub kind: MediaKind,
}

/// A recorded subject fetch for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFetch {
    pub id: String,
    pub kind: MediaKind,
}

/// Mock implementation of the UpstreamClient trait.
///
/// Provides controllable behavior for testing:
/// - Return configured search hits, subjects and images
/// - Track searches and fetches for assertions
/// - Simulate failures
///
/// Unknown subjects fail with a 404 `UpstreamUnavailable`, unknown names
/// return no hits, unknown image URLs answer 404.
///
/// # Example
///
/// ```rust,ignore
/// use douban_meta_core::testing::{MockUpstreamClient, fixtures};
///
/// let client = MockUpstreamClient::new();
/// client.add_subject(fixtures::subject("1291561", "千与千寻")).await;
/// client.set_search_results("千与千寻", vec![SearchTarget::from_id("1291561")]).await;
///
/// // ... drive a resolver ...
/// assert_eq!(client.recorded_fetches().await.len(), 1);
/// ```
pub struct MockUpstreamClient {
    /// Search hits by name.
    search_results: Arc<RwLock<HashMap<String, Vec<SearchTarget>>>>,
    /// Subjects by id.
    subjects: Arc<RwLock<HashMap<String, Subject>>>,
    /// Image responses by URL.
    images: Arc<RwLock<HashMap<String, HttpResponse>>>,
    /// Recorded searches.
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    /// Recorded subject fetches.
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<UpstreamError>>>,
}

impl std::fmt::Debug for MockUpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockUpstreamClient")
            .field("search_results", &"<search_results>")
            .field("subjects", &"<subjects>")
            .field("images", &"<images>")
            .finish()
    }
}

impl Default for MockUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpstreamClient {
    pub fn new() -> Self {
        Self {
            search_results: Arc::new(RwLock::new(HashMap::new())),
            subjects: Arc::new(RwLock::new(HashMap::new())),
            images: Arc::new(RwLock::new(HashMap::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the hits returned when searching `name`, whatever the kind.
    pub async fn set_search_results(&self, name: &str, hits: Vec<SearchTarget>) {
        self.search_results
            .write()
            .await
            .insert(name.to_string(), hits);
    }

    /// Make a subject fetchable by its id.
    pub async fn add_subject(&self, subject: Subject) {
        self.subjects
            .write()
            .await
            .insert(subject.id.clone(), subject);
    }

    /// Serve `response` for an image URL.
    pub async fn set_image(&self, url: &str, response: HttpResponse) {
        self.images.write().await.insert(url.to_string(), response);
    }

    /// Make the next operation fail with `error`.
    pub async fn set_next_error(&self, error: UpstreamError) {
        *self.next_error.write().await = Some(error);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    async fn take_error(&self) -> Option<UpstreamError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstreamClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn resolve_identifier_by_name(
        &self,
        name: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchTarget>, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        self.searches.write().await.push(RecordedSearch {
            name: name.to_string(),
            kind,
        });
        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        Ok(self
            .search_results
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_subject(
        &self,
        id: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Subject, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        let id = crate::upstream::require_identifier(id)?;
        self.fetches.write().await.push(RecordedFetch {
            id: id.to_string(),
            kind,
        });
        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        self.subjects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| UpstreamError::UpstreamUnavailable {
                status: 404,
                url: format!("mock://{}/{}", kind, id),
            })
    }

    async fn fetch_image(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }
        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        Ok(self
            .images
            .read()
            .await
            .get(url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::new(404, Vec::new())))
    }
}
