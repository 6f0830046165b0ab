//! Application state shared across handlers.

use std::sync::Arc;

use msm_session::SessionRegistry;

use crate::config::ServerConfig;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session registry every request is bound through.
    pub registry: Arc<SessionRegistry>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
