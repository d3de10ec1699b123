pub mod config;
pub mod mapper;
pub mod metrics;
pub mod resolver;
pub mod testing;
pub mod upstream;

pub use config::{
    load_config, load_config_from_str, validate_config, CacheConfig, Config, ConfigError,
    MobileConfig, RestConfig, SanitizedConfig, ScrapeConfig, ServerConfig, UpstreamConfig,
    UpstreamStrategy,
};
pub use mapper::{
    map_crew, map_to_item, map_to_search_target, subject_page_url, MappingError, MediaItem,
    PersonInfo, PersonKind, PROVIDER_ID,
};
pub use resolver::{ImageType, MetadataResolver, MetadataResult, RemoteImage, RemoteSearchResult};
pub use upstream::{
    create_transport, create_upstream_client, ClientCaches, Crew, HttpRequest, HttpResponse,
    HttpTransport, MediaKind, RateLimiter, ResponseCache, SearchTarget, Signer, Subject,
    TransportError, UpstreamClient, UpstreamError,
};
