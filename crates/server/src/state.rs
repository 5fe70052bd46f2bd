use std::sync::Arc;

use appcache_core::{Config, SanitizedConfig, UpdateOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<UpdateOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<UpdateOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &UpdateOrchestrator {
        self.orchestrator.as_ref()
    }
}
