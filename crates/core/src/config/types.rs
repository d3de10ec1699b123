use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

// ============================================================================
// Upstream
// ============================================================================

/// Which backend generation to talk to. Chosen once per deployment.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStrategy {
    /// Legacy HTML search page plus the v2 JSON API.
    HtmlScrape,
    /// Public REST API used by the mini-app client.
    PublicRest,
    /// Signed mobile app API.
    #[default]
    SignedMobile,
}

impl UpstreamStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamStrategy::HtmlScrape => "html_scrape",
            UpstreamStrategy::PublicRest => "public_rest",
            UpstreamStrategy::SignedMobile => "signed_mobile",
        }
    }
}

/// Upstream access configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub strategy: UpstreamStrategy,
    /// Minimum gap between two requests, in milliseconds. 0 disables pacing.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Extra random delay added on top of the minimum gap when pacing kicks in.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Overall HTTP timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub mobile: MobileConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            strategy: UpstreamStrategy::default(),
            min_request_interval_ms: default_min_request_interval_ms(),
            jitter_ms: default_jitter_ms(),
            timeout_secs: default_timeout(),
            scrape: ScrapeConfig::default(),
            rest: RestConfig::default(),
            mobile: MobileConfig::default(),
        }
    }
}

fn default_min_request_interval_ms() -> u64 {
    2000
}

fn default_jitter_ms() -> u64 {
    2000
}

fn default_timeout() -> u32 {
    30
}

/// Legacy HTML scrape settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_search_base_url")]
    pub search_base_url: String,
    #[serde(default = "default_scrape_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scrape_api_key")]
    pub api_key: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            search_base_url: default_scrape_search_base_url(),
            api_base_url: default_scrape_api_base_url(),
            api_key: default_scrape_api_key(),
        }
    }
}

fn default_scrape_search_base_url() -> String {
    "http://www.douban.com".to_string()
}

fn default_scrape_api_base_url() -> String {
    "http://api.douban.com".to_string()
}

fn default_scrape_api_key() -> String {
    "0df993c66c0c636e29ecbb5344252a4a".to_string()
}

/// Public REST settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    #[serde(default = "default_frodo_base_url")]
    pub base_url: String,
    #[serde(default = "default_rest_api_key")]
    pub api_key: String,
    #[serde(default = "default_search_count")]
    pub search_count: u32,
    #[serde(default = "default_rest_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_rest_referer")]
    pub referer: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_frodo_base_url(),
            api_key: default_rest_api_key(),
            search_count: default_search_count(),
            user_agent: default_rest_user_agent(),
            referer: default_rest_referer(),
        }
    }
}

fn default_frodo_base_url() -> String {
    "https://frodo.douban.com".to_string()
}

fn default_rest_api_key() -> String {
    "054022eaeae0b00e0fc068c0c0a2102a".to_string()
}

fn default_search_count() -> u32 {
    5
}

fn default_rest_user_agent() -> String {
    "MicroMessenger/".to_string()
}

fn default_rest_referer() -> String {
    "https://servicewechat.com/wx2f9b06c1de1ccfca/91/page-frame.html".to_string()
}

/// Signed mobile API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MobileConfig {
    #[serde(default = "default_frodo_base_url")]
    pub base_url: String,
    #[serde(default = "default_mobile_api_key")]
    pub api_key: String,
    /// HMAC secret used to sign requests.
    #[serde(default = "default_mobile_secret")]
    pub secret: String,
    #[serde(default = "default_search_count")]
    pub search_count: u32,
    /// Requests issued before the soft throttle pauses.
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    #[serde(default = "default_burst_pause_min_ms")]
    pub burst_pause_min_ms: u64,
    #[serde(default = "default_burst_pause_max_ms")]
    pub burst_pause_max_ms: u64,
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self {
            base_url: default_frodo_base_url(),
            api_key: default_mobile_api_key(),
            secret: default_mobile_secret(),
            search_count: default_search_count(),
            burst_size: default_burst_size(),
            burst_pause_min_ms: default_burst_pause_min_ms(),
            burst_pause_max_ms: default_burst_pause_max_ms(),
        }
    }
}

fn default_mobile_api_key() -> String {
    "0dad551ec0f84ed02907ff5c42e8ec70".to_string()
}

fn default_mobile_secret() -> String {
    "bf7dddc7c9cfe6f7".to_string()
}

fn default_burst_size() -> u32 {
    5
}

fn default_burst_pause_min_ms() -> u64 {
    3000
}

fn default_burst_pause_max_ms() -> u64 {
    7000
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entries kept per cache (default: 20)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    crate::upstream::DEFAULT_CACHE_CAPACITY
}

// ============================================================================
// Sanitized views
// ============================================================================

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub upstream: SanitizedUpstreamConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUpstreamConfig {
    pub strategy: String,
    pub min_request_interval_ms: u64,
    pub jitter_ms: u64,
    pub timeout_secs: u32,
    pub base_url: String,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_configured: Option<bool>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let upstream = &config.upstream;
        let (base_url, api_key, secret) = match upstream.strategy {
            UpstreamStrategy::HtmlScrape => {
                (&upstream.scrape.api_base_url, &upstream.scrape.api_key, None)
            }
            UpstreamStrategy::PublicRest => (&upstream.rest.base_url, &upstream.rest.api_key, None),
            UpstreamStrategy::SignedMobile => (
                &upstream.mobile.base_url,
                &upstream.mobile.api_key,
                Some(&upstream.mobile.secret),
            ),
        };

        Self {
            server: config.server.clone(),
            upstream: SanitizedUpstreamConfig {
                strategy: upstream.strategy.as_str().to_string(),
                min_request_interval_ms: upstream.min_request_interval_ms,
                jitter_ms: upstream.jitter_ms,
                timeout_secs: upstream.timeout_secs,
                base_url: base_url.clone(),
                api_key_configured: !api_key.is_empty(),
                secret_configured: secret.map(|s| !s.is_empty()),
            },
            cache: config.cache.clone(),
        }
    }
}
