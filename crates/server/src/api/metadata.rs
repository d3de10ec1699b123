//! Metadata API handlers: search, metadata, subjects and images.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use douban_meta_core::{
    MediaKind, MetadataResult, RemoteImage, RemoteSearchResult, TransportError, UpstreamError,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: MediaKind,
    /// Catalog id; takes precedence over `name`.
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KindParams {
    #[serde(default = "default_kind")]
    pub kind: MediaKind,
}

#[derive(Debug, Deserialize)]
pub struct ImagesParams {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: MediaKind,
}

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    pub url: String,
}

fn default_kind() -> MediaKind {
    MediaKind::Movie
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map an upstream failure to the status reported to API clients.
fn upstream_error(e: UpstreamError) -> ApiError {
    let status = match &e {
        UpstreamError::NotConfigured(_) => StatusCode::BAD_REQUEST,
        UpstreamError::UpstreamUnavailable { status: 404, .. } => StatusCode::NOT_FOUND,
        UpstreamError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        UpstreamError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        UpstreamError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        UpstreamError::Transport(_) => StatusCode::BAD_GATEWAY,
        UpstreamError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/search
///
/// Search hits for a name, or the single subject for an id.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Json<Vec<RemoteSearchResult>> {
    let cancel = state.request_token();
    let hits = state
        .resolver()
        .search(&params.name, params.id.as_deref(), params.kind, &cancel)
        .await;
    Json(hits)
}

/// GET /api/v1/metadata
///
/// Normalized item and people for a name or id. 404 when nothing matched or
/// the lookup failed.
pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Result<Json<MetadataResult>, ApiError> {
    let cancel = state.request_token();
    state
        .resolver()
        .get_metadata(&params.name, params.id.as_deref(), params.kind, &cancel)
        .await
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No {} metadata found", params.kind),
            )
        })
}

/// GET /api/v1/subjects/{id}
///
/// Metadata for a catalog id, with upstream failures reported as such.
pub async fn get_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<KindParams>,
) -> Result<Json<MetadataResult>, ApiError> {
    let cancel = state.request_token();
    match state
        .resolver()
        .fetch_metadata("", Some(id.as_str()), params.kind, &cancel)
        .await
    {
        Ok(Some(result)) => Ok(Json(result)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Subject {} is not a {}", id, params.kind),
        )),
        Err(e) => Err(upstream_error(e)),
    }
}

/// GET /api/v1/images
pub async fn get_images(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImagesParams>,
) -> Json<Vec<RemoteImage>> {
    let cancel = state.request_token();
    let images = state
        .resolver()
        .get_images(params.id.as_deref(), params.kind, &cancel)
        .await;
    Json(images)
}

/// Host suffix of the catalog's image CDN.
const IMAGE_HOST: &str = "doubanio.com";

/// Host part of an absolute http(s) URL, without userinfo or port.
fn url_host(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

fn is_catalog_image_url(url: &str) -> bool {
    url_host(url).is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        host == IMAGE_HOST || host.ends_with(&format!(".{}", IMAGE_HOST))
    })
}

/// GET /api/v1/image
///
/// Fetch an image through the paced upstream path and relay status,
/// content type and body.
///
/// Any absolute http(s) URL is fetched, not only catalog image hosts, so a
/// server reachable from untrusted networks relays arbitrary GETs. Requests
/// for other hosts are logged at `warn`.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImageParams>,
) -> Result<Response, ApiError> {
    if !(params.url.starts_with("http://") || params.url.starts_with("https://")) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "url must be an absolute http(s) URL",
        ));
    }

    if !is_catalog_image_url(&params.url) {
        warn!(url = %params.url, "Relaying image request for a non-catalog host");
    }

    let cancel = state.request_token();
    let upstream = state
        .resolver()
        .get_image_response(&params.url, &cancel)
        .await
        .map_err(upstream_error)?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        warn!(url = %params.url, status = upstream.status, "Image fetch returned non-success");
    }
    let content_type = upstream
        .header("content-type")
        .unwrap_or("application/octet-stream")
        .to_string();

    Ok((
        status,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(upstream.body),
    )
        .into_response())
}
