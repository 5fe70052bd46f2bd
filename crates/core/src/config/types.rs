use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use url::Url;

use crate::cache::DEFAULT_RETAINED_GENERATIONS;
use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub manifest: ManifestSourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Which manifest to follow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestSourceConfig {
    /// Absolute http(s) URL of the cache manifest
    pub url: Url,
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
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Persistent cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Stored manifest generations kept before older ones are pruned.
    #[serde(default = "default_retained_generations")]
    pub retained_generations: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            retained_generations: default_retained_generations(),
        }
    }
}

fn default_retained_generations() -> usize {
    DEFAULT_RETAINED_GENERATIONS
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("appcache.db")
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on requests in flight at once (default: 4)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_user_agent() -> String {
    concat!("appcache/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Sanitized config for API responses (credentials in the manifest URL redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub manifest: SanitizedManifestConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub transport: TransportConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedManifestConfig {
    pub url: String,
    pub credentials_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let mut url = config.manifest.url.clone();
        let credentials_configured = !url.username().is_empty() || url.password().is_some();
        if credentials_configured {
            // Only fails for cannot-be-a-base URLs, which validation rejects.
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }

        Self {
            manifest: SanitizedManifestConfig {
                url: url.to_string(),
                credentials_configured,
            },
            server: config.server.clone(),
            cache: config.cache.clone(),
            transport: config.transport.clone(),
            orchestrator: config.orchestrator.clone(),
        }
    }
}
