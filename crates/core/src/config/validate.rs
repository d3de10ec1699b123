use super::{
    types::{Config, UpstreamStrategy},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Cache capacity is positive
/// - The selected strategy has its base URL and credentials
/// - Mobile burst settings are coherent
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.cache.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "cache.capacity must be at least 1".to_string(),
        ));
    }

    let upstream = &config.upstream;
    if upstream.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "upstream.timeout_secs cannot be 0".to_string(),
        ));
    }

    match upstream.strategy {
        UpstreamStrategy::HtmlScrape => {
            require("upstream.scrape.search_base_url", &upstream.scrape.search_base_url)?;
            require("upstream.scrape.api_base_url", &upstream.scrape.api_base_url)?;
            require("upstream.scrape.api_key", &upstream.scrape.api_key)?;
        }
        UpstreamStrategy::PublicRest => {
            require("upstream.rest.base_url", &upstream.rest.base_url)?;
            require("upstream.rest.api_key", &upstream.rest.api_key)?;
            if upstream.rest.search_count == 0 {
                return Err(ConfigError::ValidationError(
                    "upstream.rest.search_count must be at least 1".to_string(),
                ));
            }
        }
        UpstreamStrategy::SignedMobile => {
            let mobile = &upstream.mobile;
            require("upstream.mobile.base_url", &mobile.base_url)?;
            require("upstream.mobile.api_key", &mobile.api_key)?;
            require("upstream.mobile.secret", &mobile.secret)?;
            if mobile.search_count == 0 {
                return Err(ConfigError::ValidationError(
                    "upstream.mobile.search_count must be at least 1".to_string(),
                ));
            }
            if mobile.burst_size == 0 {
                return Err(ConfigError::ValidationError(
                    "upstream.mobile.burst_size must be at least 1".to_string(),
                ));
            }
            if mobile.burst_pause_min_ms > mobile.burst_pause_max_ms {
                return Err(ConfigError::ValidationError(format!(
                    "upstream.mobile.burst_pause_min_ms ({}) exceeds burst_pause_max_ms ({})",
                    mobile.burst_pause_min_ms, mobile.burst_pause_max_ms
                )));
            }
        }
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_cache_capacity_fails() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_secret_fails_only_for_mobile() {
        let mut config = Config::default();
        config.upstream.mobile.secret = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("upstream.mobile.secret"));

        config.upstream.strategy = UpstreamStrategy::PublicRest;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_burst_pause_range() {
        let mut config = Config::default();
        config.upstream.mobile.burst_pause_min_ms = 8000;
        config.upstream.mobile.burst_pause_max_ms = 7000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_scrape_requires_api_key() {
        let mut config = Config::default();
        config.upstream.strategy = UpstreamStrategy::HtmlScrape;
        config.upstream.scrape.api_key.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_interval_is_allowed() {
        let mut config = Config::default();
        config.upstream.min_request_interval_ms = 0;
        config.upstream.jitter_ms = 0;
        assert!(validate_config(&config).is_ok());
    }
}
