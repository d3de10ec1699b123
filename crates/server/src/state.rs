use std::sync::Arc;

use douban_meta_core::{Config, MetadataResolver, SanitizedConfig};
use tokio_util::sync::CancellationToken;

/// Shared application state
pub struct AppState {
    config: Config,
    resolver: Arc<MetadataResolver>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, resolver: Arc<MetadataResolver>) -> Self {
        Self {
            config,
            resolver,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn resolver(&self) -> &MetadataResolver {
        self.resolver.as_ref()
    }

    /// Token for one request; cancelled when the server shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancel every in-flight upstream call.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
