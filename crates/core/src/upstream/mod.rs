//! Rate-limited, signed and cached access to the Douban catalog.
//!
//! Three interchangeable strategies implement [`UpstreamClient`]:
//!
//! - [`HtmlScrapeClient`]: legacy search page plus the v2 JSON API
//! - [`PublicRestClient`]: public REST API used by the mini-app client
//! - [`SignedMobileClient`]: HMAC-signed mobile app API
//!
//! One strategy is selected per deployment with [`create_upstream_client`].
//! There is no fallback between strategies.

mod cache;
mod frodo;
mod gateway;
mod mobile;
mod rate_limiter;
mod rest;
mod scrape;
mod signer;
mod transport;
mod types;

pub use cache::{ClientCaches, ResponseCache, DEFAULT_CACHE_CAPACITY};
pub use gateway::Gateway;
pub use mobile::SignedMobileClient;
pub use rate_limiter::{RatePermit, RateLimiter};
pub use rest::PublicRestClient;
pub use scrape::HtmlScrapeClient;
pub use signer::{unix_timestamp, url_encode_upper, Signer};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, UpstreamConfig, UpstreamStrategy};

/// Errors raised by the upstream access layer.
///
/// A search with no hits is not an error: it is `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Missing identifier or unusable configuration. Never reaches the network.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Upstream answered with a non-success status.
    #[error("Upstream unavailable: HTTP {status} from {url}")]
    UpstreamUnavailable { status: u16, url: String },

    /// Upstream answered but the payload could not be used.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request never got an HTTP answer (timeout, connection failure).
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::UpstreamUnavailable { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// A Douban backend.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Strategy name, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Search the catalog by title. An empty result means no match.
    async fn resolve_identifier_by_name(
        &self,
        name: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchTarget>, UpstreamError>;

    /// Fetch a full subject by catalog identifier.
    async fn fetch_subject(
        &self,
        id: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Subject, UpstreamError>;

    /// Fetch a URL through the same paced path and return the raw response,
    /// whatever its status.
    async fn fetch_image(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError>;
}

/// Reject blank identifiers before any network traffic.
pub(crate) fn require_identifier(id: &str) -> Result<&str, UpstreamError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(UpstreamError::NotConfigured(
            "subject identifier is empty".to_string(),
        ));
    }
    Ok(id)
}

/// Parse a JSON body into a wire DTO.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    response: &HttpResponse,
    what: &str,
) -> Result<T, UpstreamError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        UpstreamError::MalformedResponse(format!("Failed to parse {} response: {}", what, e))
    })
}

/// Build the production HTTP transport for `config`.
pub fn create_transport(config: &UpstreamConfig) -> Result<Arc<dyn HttpTransport>, UpstreamError> {
    let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs as u64))?;
    Ok(Arc::new(transport))
}

/// Create the configured upstream client.
pub fn create_upstream_client(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
    let upstream = &config.upstream;
    let limiter = RateLimiter::new(
        Duration::from_millis(upstream.min_request_interval_ms),
        Duration::from_millis(upstream.jitter_ms),
    );
    let caches = ClientCaches::new(config.cache.capacity);
    let gateway = Gateway::new(upstream.strategy.as_str(), transport, limiter);

    let client: Arc<dyn UpstreamClient> = match upstream.strategy {
        UpstreamStrategy::HtmlScrape => Arc::new(HtmlScrapeClient::new(
            upstream.scrape.clone(),
            gateway,
            caches,
        )?),
        UpstreamStrategy::PublicRest => Arc::new(PublicRestClient::new(
            upstream.rest.clone(),
            gateway,
            caches,
        )?),
        UpstreamStrategy::SignedMobile => Arc::new(SignedMobileClient::new(
            upstream.mobile.clone(),
            gateway,
            caches,
        )?),
    };

    Ok(client)
}
