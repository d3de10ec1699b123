//! Mock HTTP transport for testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::upstream::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Scripted HTTP transport.
///
/// Responses are registered against a URL prefix; a request gets the
/// response of the longest matching prefix, so a signed URL with a
/// changing `_ts` still matches `https://frodo.douban.com/api/v2/movie/1`.
/// Unmatched requests get an empty 404.
///
/// # Example
///
/// ```rust,ignore
/// use douban_meta_core::testing::{MockTransport, fixtures};
///
/// let transport = MockTransport::new();
/// transport.respond_json(
///     "https://frodo.douban.com/api/v2/movie/1291561",
///     &fixtures::mobile_subject_json("1291561", "千与千寻", false),
/// );
///
/// // ... drive a client ...
/// assert_eq!(transport.request_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<(String, HttpResponse)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    next_error: Arc<Mutex<Option<TransportError>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            next_error: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Serve `response` for every URL starting with `prefix`.
    pub fn respond(&self, prefix: &str, response: HttpResponse) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(p, _)| p != prefix);
        routes.push((prefix.to_string(), response));
    }

    /// Serve a JSON body with status 200.
    pub fn respond_json(&self, prefix: &str, body: &serde_json::Value) {
        self.respond(prefix, HttpResponse::new(200, body.to_string()));
    }

    /// Serve a status with an empty body.
    pub fn respond_status(&self, prefix: &str, status: u16) {
        self.respond(prefix, HttpResponse::new(status, Vec::new()));
    }

    /// Fail the next request with `error`.
    pub fn fail_next(&self, error: TransportError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Delay every response, to exercise cancellation mid-flight.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn requests_matching(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }

        let routes = self.routes.lock().unwrap();
        let response = routes
            .iter()
            .filter(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| HttpResponse::new(404, Vec::new()));

        Ok(response)
    }
}
