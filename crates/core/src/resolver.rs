//! Host-facing lookups: search, metadata and images for a media kind.
//!
//! The resolver sits between a media library and the configured
//! [`UpstreamClient`]. The plain operations never fail: upstream errors are
//! logged and reported as "nothing found". [`MetadataResolver::fetch_metadata`]
//! keeps the typed error for callers that need to tell the cases apart.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::mapper::{
    map_crew, map_to_item, map_to_search_target, MediaItem, PersonInfo, PersonKind, PROVIDER_ID,
};
use crate::metrics::LOOKUPS;
use crate::upstream::{
    HttpResponse, MediaKind, SearchTarget, Subject, UpstreamClient, UpstreamError,
};

/// Name reported as the source of images.
pub const IMAGE_PROVIDER_NAME: &str = "Douban";

/// A mapped item with its credited people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub item: MediaItem,
    /// Directors, then actors, then writers.
    pub people: Vec<PersonInfo>,
}

/// A search hit as presented to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSearchResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub provider_ids: BTreeMap<String, String>,
}

impl From<SearchTarget> for RemoteSearchResult {
    fn from(target: SearchTarget) -> Self {
        Self {
            name: target.title,
            production_year: target.year.and_then(|y| y.trim().parse().ok()),
            image_url: target.cover_url,
            provider_ids: BTreeMap::from([(PROVIDER_ID.to_string(), target.id)]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Primary,
}

/// A remote image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteImage {
    pub provider_name: String,
    pub url: String,
    pub image_type: ImageType,
}

/// Resolves titles and identifiers into metadata through one upstream
/// client.
pub struct MetadataResolver {
    client: Arc<dyn UpstreamClient>,
}

impl MetadataResolver {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    /// Name of the underlying strategy.
    pub fn strategy(&self) -> &'static str {
        self.client.name()
    }

    /// Metadata for `name`, or for `provider_id` when given. Errors are
    /// logged and yield `None`.
    pub async fn get_metadata(
        &self,
        name: &str,
        provider_id: Option<&str>,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Option<MetadataResult> {
        match self.fetch_metadata(name, provider_id, kind, cancel).await {
            Ok(result) => result,
            Err(UpstreamError::Cancelled) => {
                info!(name = %name, kind = %kind, "Metadata lookup cancelled");
                None
            }
            Err(e) => {
                error!(name = %name, kind = %kind, error = %e, "Metadata lookup failed");
                None
            }
        }
    }

    /// Like [`get_metadata`](Self::get_metadata), keeping the error.
    ///
    /// `Ok(None)` means no hit for the name, or a subject whose type tag
    /// contradicts `kind`.
    pub async fn fetch_metadata(
        &self,
        name: &str,
        provider_id: Option<&str>,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Option<MetadataResult>, UpstreamError> {
        let result = self.lookup(name, provider_id, kind, cancel).await;
        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "not_found",
            Err(UpstreamError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        LOOKUPS.with_label_values(&[kind.as_str(), outcome]).inc();
        result
    }

    async fn lookup(
        &self,
        name: &str,
        provider_id: Option<&str>,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Option<MetadataResult>, UpstreamError> {
        let id = match non_blank(provider_id) {
            Some(id) => id.to_string(),
            None => match self.search_targets(name, kind, cancel).await?.into_iter().next() {
                Some(hit) => hit.id,
                None => {
                    info!(name = %name, kind = %kind, "No catalog entry found");
                    return Ok(None);
                }
            },
        };

        let Some(subject) = self.subject_of_kind(&id, kind, cancel).await? else {
            return Ok(None);
        };

        let mut item = map_to_item(&subject)?;
        item.provider_ids.insert(PROVIDER_ID.to_string(), id.clone());

        let mut people = map_crew(&subject.directors, PersonKind::Director);
        people.extend(map_crew(&subject.actors, PersonKind::Actor));
        people.extend(map_crew(&subject.writers, PersonKind::Writer));

        info!(id = %id, name = %item.name, people = people.len(), "Resolved metadata");
        Ok(Some(MetadataResult { item, people }))
    }

    /// Search hits for `name`, or the single subject `provider_id` when
    /// given. Errors are logged and yield no hits.
    pub async fn search(
        &self,
        name: &str,
        provider_id: Option<&str>,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Vec<RemoteSearchResult> {
        let result = match non_blank(provider_id) {
            Some(id) => self.search_by_id(id, kind, cancel).await,
            None => self
                .search_targets(name, kind, cancel)
                .await
                .map(|hits| hits.into_iter().map(RemoteSearchResult::from).collect()),
        };

        result.unwrap_or_else(|e| {
            error!(name = %name, kind = %kind, error = %e, "Search failed");
            Vec::new()
        })
    }

    async fn search_by_id(
        &self,
        id: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteSearchResult>, UpstreamError> {
        let subject = self.subject_of_kind(id, kind, cancel).await?;
        Ok(subject
            .map(|subject| {
                let mut result = RemoteSearchResult::from(map_to_search_target(&subject));
                result.image_url = subject.pic_large.or(result.image_url);
                vec![result]
            })
            .unwrap_or_default())
    }

    async fn search_targets(
        &self,
        name: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchTarget>, UpstreamError> {
        if name.trim().is_empty() {
            warn!(kind = %kind, "Search name is empty");
            return Ok(Vec::new());
        }

        let query = name.replace('.', " ");
        info!(query = %query, kind = %kind, "Searching catalog");
        let hits = self
            .client
            .resolve_identifier_by_name(&query, kind, cancel)
            .await?;
        info!(query = %query, count = hits.len(), "Finished searching catalog");
        Ok(hits)
    }

    /// Primary image of `provider_id`. Errors are logged and yield no
    /// images.
    pub async fn get_images(
        &self,
        provider_id: Option<&str>,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Vec<RemoteImage> {
        let Some(id) = non_blank(provider_id) else {
            warn!(kind = %kind, "Image lookup without a catalog id");
            return Vec::new();
        };

        match self.subject_of_kind(id, kind, cancel).await {
            Ok(subject) => subject
                .and_then(|s| s.pic_large)
                .map(|url| RemoteImage {
                    provider_name: IMAGE_PROVIDER_NAME.to_string(),
                    url,
                    image_type: ImageType::Primary,
                })
                .into_iter()
                .collect(),
            Err(e) => {
                error!(id = %id, kind = %kind, error = %e, "Image lookup failed");
                Vec::new()
            }
        }
    }

    /// Fetch an image URL through the paced upstream path.
    pub async fn get_image_response(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        info!(url = %url, "Fetching image");
        self.client.fetch_image(url, cancel).await
    }

    /// Fetch a subject, dropping it when its type tag contradicts `kind`.
    async fn subject_of_kind(
        &self,
        id: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Option<Subject>, UpstreamError> {
        let subject = self.client.fetch_subject(id, kind, cancel).await?;
        match subject.is_tv {
            Some(is_tv) if !kind.matches_tag(is_tv) => {
                warn!(id = %id, kind = %kind, is_tv = is_tv, "Subject type does not match, ignoring");
                Ok(None)
            }
            _ => Ok(Some(subject)),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
