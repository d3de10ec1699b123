//! Shared request path for every strategy: pace, check cancellation, send,
//! map status.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::rate_limiter::RateLimiter;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::UpstreamError;
use crate::metrics::{UPSTREAM_REQUESTS, UPSTREAM_REQUEST_DURATION};

/// Owns the transport and the rate limiter of one client instance.
pub struct Gateway {
    strategy: &'static str,
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
}

impl Gateway {
    pub fn new(strategy: &'static str, transport: Arc<dyn HttpTransport>, limiter: RateLimiter) -> Self {
        Self {
            strategy,
            transport,
            limiter,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send a paced request and return the response whatever its status.
    pub async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        self.limiter.acquire(cancel).await?;
        self.dispatch(request, cancel).await
    }

    /// Send a request that has already passed the limiter.
    pub(crate) async fn dispatch(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }

        let url = request.url.clone();
        debug!(strategy = self.strategy, url = %url, "Upstream request");

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                UPSTREAM_REQUESTS.with_label_values(&[self.strategy, "cancelled"]).inc();
                return Err(UpstreamError::Cancelled);
            }
            result = self.transport.get(request) => result,
        };
        UPSTREAM_REQUEST_DURATION
            .with_label_values(&[self.strategy])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                let outcome = if response.is_success() { "success" } else { "http_error" };
                UPSTREAM_REQUESTS.with_label_values(&[self.strategy, outcome]).inc();
                Ok(response)
            }
            Err(e) => {
                error!(strategy = self.strategy, url = %url, error = %e, "Upstream transport failure");
                UPSTREAM_REQUESTS
                    .with_label_values(&[self.strategy, "transport_error"])
                    .inc();
                Err(UpstreamError::Transport(e))
            }
        }
    }

    /// Send a paced request, turning any non-2xx status into
    /// [`UpstreamError::UpstreamUnavailable`].
    pub async fn get(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        let url = request.url.clone();
        let response = self.send(request, cancel).await?;
        self.ensure_success(&url, response)
    }

    /// Map a non-2xx response to [`UpstreamError::UpstreamUnavailable`],
    /// logging the attempted URL.
    pub fn ensure_success(
        &self,
        url: &str,
        response: HttpResponse,
    ) -> Result<HttpResponse, UpstreamError> {
        if !response.is_success() {
            error!(
                strategy = self.strategy,
                url = %url,
                status = response.status,
                "Upstream returned non-success status"
            );
            return Err(UpstreamError::UpstreamUnavailable {
                status: response.status,
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}
