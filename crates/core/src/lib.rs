pub mod cache;
pub mod config;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod request;
pub mod testing;
pub mod transport;

pub use cache::{CacheError, CacheStats, CachedEntry, PersistentCache, SqliteCache};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use manifest::{
    CacheMode, ManifestDocument, ManifestError, ManifestOptions, ManifestUri, WildcardFlag,
};
pub use orchestrator::{
    CacheEvent, EventCallback, OrchestratorConfig, OrchestratorError, OrchestratorStatus, Status,
    UpdateOrchestrator,
};
pub use request::{FetchTag, ManifestRequest, ResourceRequest, SessionTag};
pub use transport::{HttpTransport, Transport, TransportError, Validators};
