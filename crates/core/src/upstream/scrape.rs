//! Legacy strategy: scrape the HTML search page for subject ids, then read
//! subjects from the v2 JSON API.
//!
//! The search page is what the site serves to desktop browsers, so requests
//! rotate through desktop user agents and replay the `bid` cookie the site
//! hands out in `X-DOUBAN-NEWBID`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ClientCaches;
use super::gateway::Gateway;
use super::transport::{HttpRequest, HttpResponse};
use super::types::{Crew, MediaKind, SearchTarget, Subject};
use super::{parse_json, require_identifier, UpstreamClient, UpstreamError};
use crate::config::ScrapeConfig;

const SID_PATTERN: &str = r"sid: (\d+)";
const NEW_BID_HEADER: &str = "x-douban-newbid";

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/40.0.2214.93 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; rv:6.0) Gecko/20100101 Firefox/19.0",
    "Mozilla/5.0 (Windows NT 6.2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/28.0.1464.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:22.0) Gecko/20130328 Firefox/22.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:31.0) Gecko/20130401 Firefox/31.0",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:23.0) Gecko/20131011 Firefox/23.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_7_3) AppleWebKit/534.55.3 (KHTML, like Gecko) Version/5.1.3 Safari/534.53.10",
    "Mozilla/5.0 (Macintosh; U; Intel Mac OS X 10_6_5; ar) AppleWebKit/533.19.4 (KHTML, like Gecko) Version/5.0.3 Safari/533.19.4",
    "Mozilla/5.0 (Windows NT 6.2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/28.0.1467.0 Safari/537.36",
];

/// HTML scrape client.
pub struct HtmlScrapeClient {
    config: ScrapeConfig,
    gateway: Gateway,
    caches: ClientCaches,
    sid_pattern: Regex,
    /// Session cookie; last writer wins.
    bid: RwLock<Option<String>>,
    next_user_agent: AtomicUsize,
}

impl HtmlScrapeClient {
    pub fn new(
        config: ScrapeConfig,
        gateway: Gateway,
        caches: ClientCaches,
    ) -> Result<Self, UpstreamError> {
        if config.api_key.trim().is_empty() {
            return Err(UpstreamError::NotConfigured(
                "scrape api_key is empty".to_string(),
            ));
        }
        let sid_pattern = Regex::new(SID_PATTERN)
            .map_err(|e| UpstreamError::NotConfigured(format!("invalid sid pattern: {}", e)))?;

        Ok(Self {
            config,
            gateway,
            caches,
            sid_pattern,
            bid: RwLock::new(None),
            next_user_agent: AtomicUsize::new(0),
        })
    }

    /// Current `bid` cookie, if upstream has issued one.
    pub async fn bid(&self) -> Option<String> {
        self.bid.read().await.clone()
    }

    fn search_url(&self, name: &str) -> String {
        format!(
            "{}/search?cat=1002&q={}",
            self.config.search_base_url.trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }

    fn subject_url(&self, id: &str) -> String {
        format!(
            "{}/v2/movie/subject/{}?apikey={}",
            self.config.api_base_url.trim_end_matches('/'),
            id,
            urlencoding::encode(&self.config.api_key)
        )
    }

    /// Extract every `sid: N` token, deduplicated and in string order.
    pub fn extract_sids(&self, html: &str) -> Vec<String> {
        let sids: BTreeSet<String> = self
            .sid_pattern
            .captures_iter(html)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        sids.into_iter().collect()
    }

    async fn build_request(&self, url: &str) -> HttpRequest {
        let index = self.next_user_agent.fetch_add(1, Ordering::Relaxed) % DESKTOP_USER_AGENTS.len();
        let mut request = HttpRequest::get(url).header("User-Agent", DESKTOP_USER_AGENTS[index]);
        if let Some(bid) = self.bid.read().await.as_deref() {
            request = request.header("Cookie", format!("bid={}", bid));
        }
        request
    }

    async fn remember_bid(&self, response: &HttpResponse) {
        if let Some(bid) = response.header(NEW_BID_HEADER) {
            if !bid.is_empty() {
                debug!(bid = %bid, "Upstream issued new bid cookie");
                *self.bid.write().await = Some(bid.to_string());
            }
        }
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<HttpResponse, UpstreamError> {
        let request = self.build_request(url).await;
        let response = self.gateway.send(request, cancel).await?;
        self.remember_bid(&response).await;
        self.gateway.ensure_success(url, response)
    }
}

#[async_trait]
impl UpstreamClient for HtmlScrapeClient {
    fn name(&self) -> &'static str {
        "html_scrape"
    }

    async fn resolve_identifier_by_name(
        &self,
        name: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchTarget>, UpstreamError> {
        let url = self.search_url(name);
        if let Some(hits) = self.caches.search.try_get(&url).await {
            debug!(name = %name, "Scrape search served from cache");
            return Ok(hits);
        }

        info!(name = %name, kind = %kind, "Scraping search page");
        let response = self.fetch(&url, cancel).await?;

        let hits: Vec<SearchTarget> = self
            .extract_sids(&response.text())
            .into_iter()
            .map(SearchTarget::from_id)
            .collect();

        if hits.is_empty() {
            warn!(name = %name, "No sid found on search page");
        }

        self.caches.search.put(url, hits.clone()).await;
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

        info!(id = %id, kind = %kind, "Fetching legacy subject");
        let response = self.fetch(&self.subject_url(id), cancel).await?;
        let subject = parse_json::<LegacySubject>(&response, "subject")?.into_subject(id);

        self.caches.subject.put(id, subject.clone()).await;
        Ok(subject)
    }

    async fn fetch_image(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        let request = self.build_request(url).await;
        self.gateway.send(request, cancel).await
    }
}

// ============================================================================
// Legacy v2 API response types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct LegacySubject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    pubdate: Option<String>,
    #[serde(default)]
    rating: Option<LegacyRating>,
    #[serde(default)]
    images: Option<LegacyImages>,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    countries: Option<Vec<String>>,
    #[serde(default)]
    trailer_urls: Option<Vec<String>>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    #[serde(default)]
    directors: Option<Vec<LegacyPerson>>,
    #[serde(default)]
    casts: Option<Vec<LegacyPerson>>,
    #[serde(default)]
    writers: Option<Vec<LegacyPerson>>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    seasons_count: Option<u32>,
    #[serde(default)]
    current_season: Option<u32>,
    #[serde(default)]
    episodes_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LegacyRating {
    #[serde(default)]
    average: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct LegacyImages {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    medium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyPerson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatars: Option<LegacyImages>,
}

impl From<LegacyPerson> for Crew {
    fn from(p: LegacyPerson) -> Self {
        Crew {
            id: p.id.unwrap_or_default(),
            name: p.name.unwrap_or_default(),
            avatar: p.avatars.and_then(|a| a.large.or(a.medium)),
            roles: Vec::new(),
        }
    }
}

impl LegacySubject {
    fn into_subject(self, requested_id: &str) -> Subject {
        let crew = |list: Option<Vec<LegacyPerson>>| -> Vec<Crew> {
            list.unwrap_or_default().into_iter().map(Crew::from).collect()
        };
        let (pic_large, pic_normal) = match self.images {
            Some(images) => (images.large, images.medium),
            None => (None, None),
        };

        Subject {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| requested_id.to_string()),
            title: self.title.unwrap_or_default(),
            original_title: self.original_title,
            intro: self.summary,
            year: self.year,
            pubdate: self.pubdate.into_iter().collect(),
            rating: self.rating.and_then(|r| r.average),
            pic_large,
            pic_normal,
            url: self.alt,
            countries: self.countries.unwrap_or_default(),
            trailer_url: self.trailer_urls.and_then(|urls| urls.into_iter().next()),
            genres: self.genres.unwrap_or_default(),
            is_tv: self.subtype.map(|s| s.eq_ignore_ascii_case("tv")),
            directors: crew(self.directors),
            actors: crew(self.casts),
            writers: crew(self.writers),
            seasons_count: self.seasons_count,
            current_season: self.current_season,
            episodes_count: self.episodes_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScrapeConfig;
    use crate::testing::{fixtures, MockTransport};
    use crate::upstream::RateLimiter;
    use std::sync::Arc;

    fn client(transport: &MockTransport) -> HtmlScrapeClient {
        let gateway = Gateway::new(
            "html_scrape",
            Arc::new(transport.clone()),
            RateLimiter::disabled(),
        );
        HtmlScrapeClient::new(ScrapeConfig::default(), gateway, ClientCaches::new(20)).unwrap()
    }

    #[test]
    fn test_extract_sids_sorted_lexicographically() {
        let transport = MockTransport::new();
        let html = "sid: 99, x sid: 100 y sid: 99 z sid: 1291561";
        assert_eq!(client(&transport).extract_sids(html), vec!["100", "1291561", "99"]);
    }

    #[test]
    fn test_extract_sids_none() {
        let transport = MockTransport::new();
        assert!(client(&transport).extract_sids("<html>nothing</html>").is_empty());
    }

    #[tokio::test]
    async fn test_search_scrapes_ids() {
        let transport = MockTransport::new();
        transport.respond(
            "http://www.douban.com/search",
            HttpResponse::new(200, fixtures::search_page_html(&["1291561", "1417598"])),
        );
        let client = client(&transport);

        let hits = client
            .resolve_identifier_by_name("千与千寻", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["1291561", "1417598"]);

        let request = transport.last_request().unwrap();
        assert!(request.url.starts_with("http://www.douban.com/search?cat=1002&q=%E5%8D%83"));
        assert!(request.header_value("user-agent").unwrap().starts_with("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_search_non_success_is_unavailable() {
        let transport = MockTransport::new();
        transport.respond_status("http://www.douban.com/search", 403);

        let err = client(&transport)
            .resolve_identifier_by_name("blocked", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_bid_cookie_is_captured_and_replayed() {
        let transport = MockTransport::new();
        transport.respond(
            "http://www.douban.com/search",
            HttpResponse::new(200, "sid: 1").with_header("X-DOUBAN-NEWBID", "abcDEF123"),
        );
        let client = client(&transport);
        let cancel = CancellationToken::new();

        client
            .resolve_identifier_by_name("first", MediaKind::Movie, &cancel)
            .await
            .unwrap();
        assert_eq!(client.bid().await.as_deref(), Some("abcDEF123"));
        assert!(transport.requests()[0].header_value("cookie").is_none());

        client
            .resolve_identifier_by_name("second", MediaKind::Movie, &cancel)
            .await
            .unwrap();
        assert_eq!(
            transport.last_request().unwrap().header_value("cookie"),
            Some("bid=abcDEF123")
        );
    }

    #[tokio::test]
    async fn test_user_agent_rotates() {
        let transport = MockTransport::new();
        transport.respond("http://www.douban.com/search", HttpResponse::new(200, ""));
        let client = client(&transport);
        let cancel = CancellationToken::new();

        client.resolve_identifier_by_name("a", MediaKind::Movie, &cancel).await.unwrap();
        client.resolve_identifier_by_name("b", MediaKind::Movie, &cancel).await.unwrap();

        let requests = transport.requests();
        assert_ne!(
            requests[0].header_value("user-agent"),
            requests[1].header_value("user-agent")
        );
    }

    #[tokio::test]
    async fn test_fetch_legacy_subject() {
        let transport = MockTransport::new();
        transport.respond_json(
            "http://api.douban.com/v2/movie/subject/1291561",
            &fixtures::legacy_subject_json("1291561", "千与千寻", "movie"),
        );
        let client = client(&transport);

        let subject = client
            .fetch_subject("1291561", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(subject.id, "1291561");
        assert_eq!(subject.title, "千与千寻");
        assert_eq!(subject.is_tv, Some(false));
        assert_eq!(subject.pubdate, vec!["2001-07-20(日本)".to_string()]);
        assert_eq!(subject.rating, Some(9.4));
        assert_eq!(subject.directors[0].name, "宫崎骏");
        assert_eq!(
            subject.directors[0].avatar.as_deref(),
            Some("https://img.example.com/miyazaki.jpg")
        );
        assert_eq!(subject.actors.len(), 1);

        let url = transport.last_request().unwrap().url;
        assert!(url.ends_with("?apikey=0df993c66c0c636e29ecbb5344252a4a"));
    }

    #[tokio::test]
    async fn test_fetch_subject_blank_id_skips_network() {
        let transport = MockTransport::new();
        let err = client(&transport)
            .fetch_subject(" ", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_subject() {
        let transport = MockTransport::new();
        transport.respond(
            "http://api.douban.com/v2/movie/subject/1",
            HttpResponse::new(200, "<html>not json</html>"),
        );
        let err = client(&transport)
            .fetch_subject("1", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedResponse(_)));
    }
}
