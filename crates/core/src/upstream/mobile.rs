//! Signed mobile strategy: frodo API calls authenticated with an HMAC
//! signature, as made by the Android app.
//!
//! Besides the shared [`RateLimiter`](super::RateLimiter), this client keeps
//! its own burst throttle: once `burst_size` requests have been issued, the
//! next one waits a random pause before going out. The burst gate is held
//! from the pause until the limiter grants, so concurrent callers queue
//! behind the pause instead of overtaking it.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ClientCaches;
use super::frodo::{filter_hits, FrodoSubject, NestedSearchResult};
use super::gateway::Gateway;
use super::signer::{unix_timestamp, Signer};
use super::transport::{HttpRequest, HttpResponse};
use super::types::{MediaKind, SearchTarget, Subject};
use super::{parse_json, require_identifier, UpstreamClient, UpstreamError};
use crate::config::MobileConfig;
use crate::metrics::{THROTTLE_WAITS, THROTTLE_WAIT_SECONDS};

const SEARCH_PATH: &str = "/api/v2/search/movie";

const APP_VERSIONS: &[&str] = &["6.42.2(194)", "6.41.0(188)", "7.2.0(216)"];
const ANDROID_API_LEVELS: &[u32] = &[22, 25, 28, 29];
const DEVICES: &[(&str, &str, &str)] = &[
    ("shamu", "OPPO", "OPPO R11 Plus"),
    ("cancro", "Xiaomi", "MI 4LTE"),
    ("HWEVA", "HUAWEI", "EVA-AL10"),
    ("PD1824", "vivo", "vivo X23"),
];

/// Build an Android client user agent from a random app version, API level
/// and device.
fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let version = APP_VERSIONS[rng.gen_range(0..APP_VERSIONS.len())];
    let api_level = ANDROID_API_LEVELS[rng.gen_range(0..ANDROID_API_LEVELS.len())];
    let (product, vendor, model) = DEVICES[rng.gen_range(0..DEVICES.len())];
    format!(
        "api-client/1 com.douban.frodo/{} Android/{} product/{} vendor/{} model/{}  rom/android  network/wifi  platform/mobile nd/1",
        version, api_level, product, vendor, model
    )
}

/// Requests admitted by the burst gate.
#[derive(Debug, Default)]
struct BurstState {
    issued: u64,
    pauses: u64,
}

/// Signed mobile API client.
pub struct SignedMobileClient {
    config: MobileConfig,
    gateway: Gateway,
    caches: ClientCaches,
    signer: Signer,
    burst: Mutex<BurstState>,
    session_user_agent: RwLock<String>,
}

impl SignedMobileClient {
    pub fn new(
        config: MobileConfig,
        gateway: Gateway,
        caches: ClientCaches,
    ) -> Result<Self, UpstreamError> {
        if config.secret.is_empty() {
            return Err(UpstreamError::NotConfigured(
                "mobile signing secret is empty".to_string(),
            ));
        }
        if config.api_key.trim().is_empty() {
            return Err(UpstreamError::NotConfigured(
                "mobile api_key is empty".to_string(),
            ));
        }

        let signer = Signer::new(config.secret.clone());
        Ok(Self {
            config,
            gateway,
            caches,
            signer,
            burst: Mutex::new(BurstState::default()),
            session_user_agent: RwLock::new(random_user_agent()),
        })
    }

    /// Number of requests this instance has let through to the wire.
    pub async fn requests_issued(&self) -> u64 {
        self.burst.lock().await.issued
    }

    /// Number of burst pauses taken so far.
    pub async fn burst_pauses(&self) -> u64 {
        self.burst.lock().await.pauses
    }

    /// URL for `path` with `params`, followed by `_ts`, `_sig` and `apikey`.
    fn signed_url(&self, path: &str, params: &[(&str, &str)], timestamp: i64) -> String {
        let signature = self.signer.sign("GET", path, timestamp);
        let ts = timestamp.to_string();

        let query: Vec<String> = params
            .iter()
            .copied()
            .chain([
                ("_ts", ts.as_str()),
                ("_sig", signature.as_str()),
                ("apikey", self.config.api_key.as_str()),
            ])
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();

        format!(
            "{}{}?{}",
            self.config.base_url.trim_end_matches('/'),
            path,
            query.join("&")
        )
    }

    async fn rotate_user_agent(&self) {
        let agent = random_user_agent();
        debug!(user_agent = %agent, "Starting new search session");
        *self.session_user_agent.write().await = agent;
    }

    /// Pass the burst throttle and the rate limiter, in that order, as one
    /// step. Pauses when a full burst has gone out.
    ///
    /// A cancelled caller is not counted.
    async fn admit(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
            guard = self.burst.lock() => guard,
        };

        let burst = self.config.burst_size.max(1) as u64;
        if state.issued > 0 && state.issued % burst == 0 {
            let min = self.config.burst_pause_min_ms;
            let max = self.config.burst_pause_max_ms.max(min);
            let pause = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
            debug!(
                issued = state.issued,
                pause_ms = pause.as_millis() as u64,
                "Burst throttle: pausing"
            );
            THROTTLE_WAITS.with_label_values(&["burst"]).inc();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }

            THROTTLE_WAIT_SECONDS
                .with_label_values(&["burst"])
                .observe(pause.as_secs_f64());
            state.pauses += 1;
        }

        self.gateway.limiter().acquire(cancel).await?;
        state.issued += 1;
        Ok(())
    }

    async fn request(&self, url: String) -> HttpRequest {
        let agent = self.session_user_agent.read().await.clone();
        HttpRequest::get(url).header("User-Agent", agent)
    }

    async fn issue(
        &self,
        path: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
        require_success: bool,
    ) -> Result<HttpResponse, UpstreamError> {
        self.admit(cancel).await?;

        let url = self.signed_url(path, params, unix_timestamp());
        let request = self.request(url.clone()).await;
        let response = self.gateway.dispatch(request, cancel).await?;
        if require_success {
            self.gateway.ensure_success(&url, response)
        } else {
            Ok(response)
        }
    }
}

#[async_trait]
impl UpstreamClient for SignedMobileClient {
    fn name(&self) -> &'static str {
        "signed_mobile"
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

        self.rotate_user_agent().await;

        let count = self.config.search_count.to_string();
        info!(name = %name, kind = %kind, count = %count, "Searching signed mobile API");

        let response = self
            .issue(SEARCH_PATH, &[("q", name), ("count", count.as_str())], cancel, true)
            .await?;
        let result: NestedSearchResult = parse_json(&response, "search")?;

        let hits = filter_hits(result.into_items(), kind);
        if hits.is_empty() {
            warn!(name = %name, kind = %kind, "No matching search results");
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

        info!(id = %id, kind = %kind, "Fetching signed subject");
        let path = format!("/api/v2/{}/{}", kind, id);
        let response = self.issue(&path, &[], cancel, true).await?;
        let subject = parse_json::<FrodoSubject>(&response, "subject")?.into_subject(id);

        self.caches.subject.put(id, subject.clone()).await;
        Ok(subject)
    }

    async fn fetch_image(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, UpstreamError> {
        self.admit(cancel).await?;
        let request = self.request(url.to_string()).await;
        self.gateway.dispatch(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockTransport};
    use crate::upstream::RateLimiter;
    use std::sync::Arc;

    const SUBJECT_PREFIX: &str = "https://frodo.douban.com/api/v2/movie/";
    const SEARCH_PREFIX: &str = "https://frodo.douban.com/api/v2/search/movie";

    fn client_with(transport: &MockTransport, config: MobileConfig) -> SignedMobileClient {
        let gateway = Gateway::new(
            "signed_mobile",
            Arc::new(transport.clone()),
            RateLimiter::disabled(),
        );
        SignedMobileClient::new(config, gateway, ClientCaches::new(20)).unwrap()
    }

    fn client(transport: &MockTransport) -> SignedMobileClient {
        client_with(transport, MobileConfig::default())
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let (_, query) = url.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then(|| urlencoding::decode(v).unwrap().into_owned())
        })
    }

    #[test]
    fn test_empty_secret_is_not_configured() {
        let config = MobileConfig {
            secret: String::new(),
            ..MobileConfig::default()
        };
        let gateway = Gateway::new(
            "signed_mobile",
            Arc::new(MockTransport::new()),
            RateLimiter::disabled(),
        );
        let result = SignedMobileClient::new(config, gateway, ClientCaches::new(1));
        assert!(matches!(result, Err(UpstreamError::NotConfigured(_))));
    }

    #[test]
    fn test_random_user_agent_shape() {
        let agent = random_user_agent();
        assert!(agent.starts_with("api-client/1 com.douban.frodo/"));
        assert!(agent.contains(" Android/"));
        assert!(agent.ends_with("platform/mobile nd/1"));
    }

    #[tokio::test]
    async fn test_subject_url_is_signed() {
        let transport = MockTransport::new();
        transport.respond_json(
            "https://frodo.douban.com/api/v2/movie/1291561",
            &fixtures::mobile_subject_json("1291561", "千与千寻", false),
        );

        let subject = client(&transport)
            .fetch_subject("1291561", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(subject.title, "千与千寻");

        let request = transport.last_request().unwrap();
        assert!(request
            .url
            .starts_with("https://frodo.douban.com/api/v2/movie/1291561?_ts="));
        assert_eq!(
            query_param(&request.url, "apikey").as_deref(),
            Some("0dad551ec0f84ed02907ff5c42e8ec70")
        );

        let ts: i64 = query_param(&request.url, "_ts").unwrap().parse().unwrap();
        let expected = Signer::new("bf7dddc7c9cfe6f7").sign("GET", "/api/v2/movie/1291561", ts);
        assert_eq!(query_param(&request.url, "_sig"), Some(expected));

        let agent = request.header_value("user-agent").unwrap();
        assert!(agent.starts_with("api-client/1 com.douban.frodo/"));
    }

    #[tokio::test]
    async fn test_search_signs_path_and_keeps_query_params() {
        let transport = MockTransport::new();
        transport.respond_json(
            SEARCH_PREFIX,
            &fixtures::nested_search_json(&[("1291561", "千与千寻", "movie")]),
        );

        let hits = client(&transport)
            .resolve_identifier_by_name("千与千寻", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1291561");

        let url = transport.last_request().unwrap().url;
        assert_eq!(query_param(&url, "q").as_deref(), Some("千与千寻"));
        assert_eq!(query_param(&url, "count").as_deref(), Some("5"));

        let ts: i64 = query_param(&url, "_ts").unwrap().parse().unwrap();
        let expected = Signer::new("bf7dddc7c9cfe6f7").sign("GET", SEARCH_PATH, ts);
        assert_eq!(query_param(&url, "_sig"), Some(expected));
    }

    #[tokio::test]
    async fn test_search_cached_by_name_and_kind() {
        let transport = MockTransport::new();
        transport.respond_json(
            SEARCH_PREFIX,
            &fixtures::nested_search_json(&[("3016187", "权力的游戏 第一季", "tv")]),
        );
        let client = client(&transport);
        let cancel = CancellationToken::new();

        let first = client
            .resolve_identifier_by_name("权力的游戏", MediaKind::Tv, &cancel)
            .await
            .unwrap();
        let second = client
            .resolve_identifier_by_name("权力的游戏", MediaKind::Tv, &cancel)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.requests_issued().await, 1);
    }

    #[tokio::test]
    async fn test_search_with_no_hits_is_empty() {
        let transport = MockTransport::new();
        transport.respond_json(SEARCH_PREFIX, &fixtures::nested_search_json(&[]));

        let hits = client(&transport)
            .resolve_identifier_by_name("abceasd234asd", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_blank_id_never_reaches_network() {
        let transport = MockTransport::new();
        let err = client(&transport)
            .fetch_subject("  ", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_subject_body() {
        let transport = MockTransport::new();
        transport.respond(
            "https://frodo.douban.com/api/v2/movie/1291561",
            HttpResponse::new(200, "<html>blocked</html>"),
        );

        let err = client(&transport)
            .fetch_subject("1291561", MediaKind::Movie, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_user_agent_is_stable_within_session() {
        let transport = MockTransport::new();
        transport.respond_json(
            SEARCH_PREFIX,
            &fixtures::nested_search_json(&[("1291561", "千与千寻", "movie")]),
        );
        transport.respond_json(
            SUBJECT_PREFIX,
            &fixtures::mobile_subject_json("1291561", "千与千寻", false),
        );
        let client = client(&transport);
        let cancel = CancellationToken::new();

        client
            .resolve_identifier_by_name("千与千寻", MediaKind::Movie, &cancel)
            .await
            .unwrap();
        client
            .fetch_subject("1291561", MediaKind::Movie, &cancel)
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].header_value("user-agent"),
            requests[1].header_value("user-agent")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_throttle_pauses_after_burst() {
        let transport = MockTransport::new();
        transport.respond_json(
            SUBJECT_PREFIX,
            &fixtures::mobile_subject_json("1", "subject", false),
        );
        let client = client(&transport);
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        for id in 1..=5 {
            client
                .fetch_subject(&id.to_string(), MediaKind::Movie, &cancel)
                .await
                .unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(3000));

        client.fetch_subject("6", MediaKind::Movie, &cancel).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(7100), "elapsed {:?}", elapsed);
        assert_eq!(client.requests_issued().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_pause_is_cancellable() {
        let transport = MockTransport::new();
        transport.respond_json(
            SUBJECT_PREFIX,
            &fixtures::mobile_subject_json("1", "subject", false),
        );
        let config = MobileConfig {
            burst_size: 1,
            ..MobileConfig::default()
        };
        let client = Arc::new(client_with(&transport, config));
        let cancel = CancellationToken::new();

        client.fetch_subject("1", MediaKind::Movie, &cancel).await.unwrap();

        let task = {
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            tokio::spawn(async move { client.fetch_subject("2", MediaKind::Movie, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(UpstreamError::Cancelled)));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.requests_issued().await, 1);
    }

    fn paced_client(
        transport: &MockTransport,
        config: MobileConfig,
        limiter: RateLimiter,
    ) -> Arc<SignedMobileClient> {
        let gateway = Gateway::new("signed_mobile", Arc::new(transport.clone()), limiter);
        Arc::new(SignedMobileClient::new(config, gateway, ClientCaches::new(20)).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_pause_holds_back_concurrent_callers() {
        let transport = MockTransport::new();
        transport.respond_json(
            SUBJECT_PREFIX,
            &fixtures::mobile_subject_json("1", "subject", false),
        );
        let config = MobileConfig {
            burst_size: 5,
            burst_pause_min_ms: 5000,
            burst_pause_max_ms: 5000,
            ..MobileConfig::default()
        };
        let client = paced_client(
            &transport,
            config,
            RateLimiter::new(Duration::from_millis(1000), Duration::ZERO),
        );
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (1..=12)
            .map(|id| {
                let client = Arc::clone(&client);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    client
                        .fetch_subject(&id.to_string(), MediaKind::Movie, &cancel)
                        .await
                        .unwrap();
                    tokio::time::Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        let gaps: Vec<Duration> = finished.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(
            gaps.iter().all(|gap| *gap >= Duration::from_millis(1000)),
            "gaps {:?}",
            gaps
        );
        let pauses = gaps
            .iter()
            .filter(|gap| **gap >= Duration::from_millis(5000))
            .count();
        assert_eq!(pauses, 2, "gaps {:?}", gaps);

        assert_eq!(transport.request_count(), 12);
        assert_eq!(client.requests_issued().await, 12);
        assert_eq!(client.burst_pauses().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_burst_count_is_exact_under_contention() {
        let transport = MockTransport::new();
        transport.respond_json(
            SUBJECT_PREFIX,
            &fixtures::mobile_subject_json("1", "subject", false),
        );
        let config = MobileConfig {
            burst_size: 5,
            burst_pause_min_ms: 0,
            burst_pause_max_ms: 0,
            ..MobileConfig::default()
        };
        let client = paced_client(&transport, config, RateLimiter::disabled());
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (1..=400)
            .map(|id| {
                let client = Arc::clone(&client);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    client
                        .fetch_subject(&id.to_string(), MediaKind::Movie, &cancel)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.requests_issued().await, 400);
        // A pause precedes requests 6, 11, ..., 396.
        assert_eq!(client.burst_pauses().await, 79);
    }

    #[tokio::test]
    async fn test_fetch_image_passes_status_through() {
        let transport = MockTransport::new();
        transport.respond_status("https://img9.doubanio.com/view/photo/p1.jpg", 403);

        let response = client(&transport)
            .fetch_image("https://img9.doubanio.com/view/photo/p1.jpg", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 403);
    }
}
