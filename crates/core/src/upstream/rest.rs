//! Public REST strategy: unsigned frodo API calls as made by the mini-app
//! client.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ClientCaches;
use super::frodo::{filter_hits, FlatSearchResult, FrodoSubject};
use super::gateway::Gateway;
use super::transport::{HttpRequest, HttpResponse};
use super::types::{MediaKind, SearchTarget, Subject};
use super::{parse_json, require_identifier, UpstreamClient, UpstreamError};
use crate::config::RestConfig;

const SEARCH_PATH: &str = "/api/v2/search/movie";

/// Public REST client.
pub struct PublicRestClient {
    config: RestConfig,
    gateway: Gateway,
    caches: ClientCaches,
}

impl PublicRestClient {
    pub fn new(
        config: RestConfig,
        gateway: Gateway,
        caches: ClientCaches,
    ) -> Result<Self, UpstreamError> {
        if config.api_key.trim().is_empty() {
            return Err(UpstreamError::NotConfigured(
                "rest api_key is empty".to_string(),
            ));
        }
        Ok(Self {
            config,
            gateway,
            caches,
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query: Vec<String> = params
            .iter()
            .chain(std::iter::once(&("apikey", self.config.api_key.as_str())))
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        format!(
            "{}{}?{}",
            self.config.base_url.trim_end_matches('/'),
            path,
            query.join("&")
        )
    }

    fn request(&self, url: &str) -> HttpRequest {
        HttpRequest::get(url)
            .header("User-Agent", self.config.user_agent.as_str())
            .header("Referer", self.config.referer.as_str())
    }
}

#[async_trait]
impl UpstreamClient for PublicRestClient {
    fn name(&self) -> &'static str {
        "public_rest"
    }

    async fn resolve_identifier_by_name(
        &self,
        name: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchTarget>, UpstreamError> {
        let key = ClientCaches::search_key(name, kind);
        if let Some(hits) = self.caches.search.try_get(&key).await {
            debug!(name = %name, "Search served from cache");
            return Ok(hits);
        }

        let count = self.config.search_count.to_string();
        info!(name = %name, kind = %kind, count = %count, "Searching public REST API");

        let url = self.url(SEARCH_PATH, &[("q", name), ("count", count.as_str())]);
        let response = self.gateway.get(self.request(&url), cancel).await?;
        let result: FlatSearchResult = parse_json(&response, "search")?;

        let total = result.total.unwrap_or_default();
        let hits = filter_hits(result.items.unwrap_or_default(), kind);
        if hits.is_empty() {
            warn!(name = %name, kind = %kind, total = total, "No matching search results");
        }

        self.caches.search.put(key, hits.clone()).await;
        Ok(hits)
    }

    async fn fetch_subject(
        &self,
        id: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Subject, UpstreamError> {
        let id = require_identifier(id)?;
        if let Some(subject) = self.caches.subject.try_get(id).await {
            debug!(id = %id, "Subject served from cache");
            return Ok(subject);
        }

        info!(id = %id, kind = %kind, "Fetching subject");
        let url = self.url(&format!("/api/v2/{}/{}", kind, id), &[]);
        let response = self.gateway.get(self.request(&url), cancel).await?;
        let subject = parse_json::<FrodoSubject>(&response, "subject")?.into_subject(id);

        self.caches.subject.put(id, subject.clone()).await;
        Ok(subject)
    }

    async fn fetch_image(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        self.gateway.send(self.request(url), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockTransport};
    use crate::upstream::RateLimiter;
    use std::sync::Arc;

    const SEARCH_PREFIX: &str = "https://frodo.douban.com/api/v2/search/movie";

    fn client(transport: &MockTransport) -> PublicRestClient {
        let gateway = Gateway::new(
            "public_rest",
            Arc::new(transport.clone()),
            RateLimiter::disabled(),
        );
        PublicRestClient::new(RestConfig::default(), gateway, ClientCaches::new(20)).unwrap()
    }

    #[tokio::test]
    async fn test_search_builds_query_and_filters_kind() {
        let transport = MockTransport::new();
        transport.respond_json(
            SEARCH_PREFIX,
            &fixtures::flat_search_json(&[
                ("1291561", "千与千寻", "movie"),
                ("26816519", "千与千寻 舞台剧", "tv"),
            ]),
        );
        let client = client(&transport);

        let hits = client
            .resolve_identifier_by_name("千与千寻", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1291561");

        let request = transport.last_request().unwrap();
        assert_eq!(
            request.url,
            "https://frodo.douban.com/api/v2/search/movie?q=%E5%8D%83%E4%B8%8E%E5%8D%83%E5%AF%BB&count=5&apikey=054022eaeae0b00e0fc068c0c0a2102a"
        );
        assert_eq!(request.header_value("user-agent"), Some("MicroMessenger/"));
        assert!(request.header_value("referer").unwrap().starts_with("https://servicewechat.com/"));
    }

    #[tokio::test]
    async fn test_search_zero_results_is_ok_empty() {
        let transport = MockTransport::new();
        transport.respond_json(SEARCH_PREFIX, &fixtures::flat_search_json(&[]));

        let hits = client(&transport)
            .resolve_identifier_by_name("abceasd234asd", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_cached_by_name_and_kind() {
        let transport = MockTransport::new();
        transport.respond_json(
            SEARCH_PREFIX,
            &fixtures::flat_search_json(&[("1291561", "千与千寻", "movie")]),
        );
        let client = client(&transport);
        let cancel = CancellationToken::new();

        client.resolve_identifier_by_name("千与千寻", MediaKind::Movie, &cancel).await.unwrap();
        client.resolve_identifier_by_name("千与千寻", MediaKind::Movie, &cancel).await.unwrap();
        assert_eq!(transport.request_count(), 1);

        client.resolve_identifier_by_name("千与千寻", MediaKind::Tv, &cancel).await.unwrap();
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_subject_uses_kind_path_unsigned() {
        let transport = MockTransport::new();
        transport.respond_json(
            "https://frodo.douban.com/api/v2/tv/3016187",
            &fixtures::mobile_subject_json("3016187", "权力的游戏 第一季", true),
        );

        let subject = client(&transport)
            .fetch_subject("3016187", MediaKind::Tv, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(subject.is_tv, Some(true));

        let url = transport.last_request().unwrap().url;
        assert_eq!(
            url,
            "https://frodo.douban.com/api/v2/tv/3016187?apikey=054022eaeae0b00e0fc068c0c0a2102a"
        );
        assert!(!url.contains("_sig"));
    }

    #[tokio::test]
    async fn test_fetch_subject_not_found() {
        let transport = MockTransport::new();
        transport.respond_status("https://frodo.douban.com/api/v2/movie/0", 404);

        let err = client(&transport)
            .fetch_subject("0", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
