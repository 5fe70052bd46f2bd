use super::{types::Config, ConfigError};
use crate::manifest::validate_manifest_url;

/// Validate configuration
/// Currently validates:
/// - Manifest URL is absolute http or https
/// - Server port is not 0
/// - Transport allows at least one request, with a non-zero timeout
/// - The cache keeps at least one manifest generation
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_manifest_url(&config.manifest.url)
        .map_err(|e| ConfigError::ValidationError(format!("manifest.url: {}", e)))?;

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.transport.max_concurrent_fetches == 0 {
        return Err(ConfigError::ValidationError(
            "transport.max_concurrent_fetches must be at least 1".to_string(),
        ));
    }

    if config.transport.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "transport.timeout_secs must be at least 1".to_string(),
        ));
    }

    if config.cache.retained_generations == 0 {
        return Err(ConfigError::ValidationError(
            "cache.retained_generations must be at least 1".to_string(),
        ));
    }

    Ok(())
}
