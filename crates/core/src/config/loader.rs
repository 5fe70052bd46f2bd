use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "APPCACHE_";

/// Load configuration from file with environment variable overrides.
///
/// Override keys name a section and a field separated by a double
/// underscore, so field names keep their own underscores:
/// `APPCACHE_ORCHESTRATOR__AUTO_SWAP=true`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[manifest]
url = "http://x/app/m.appcache"

[orchestrator]
stall_timeout_secs = 45
"#;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[manifest]
url = "http://x/m.appcache"

[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_missing_manifest() {
        let toml = r#"
[server]
port = 8080
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[manifest]
url = "https://example.com/app/m.appcache"

[server]
host = "127.0.0.1"
port = 3000

[orchestrator]
stall_timeout_secs = 60
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.orchestrator.stall_timeout_secs, 60);
        assert_eq!(
            config.manifest.url.as_str(),
            "https://example.com/app/m.appcache"
        );
    }

    #[test]
    fn test_env_overrides_fields_with_underscores() {
        Jail::expect_with(|jail| {
            jail.create_file("appcache.toml", MINIMAL)?;
            jail.set_env("APPCACHE_ORCHESTRATOR__AUTO_SWAP", "true");
            jail.set_env("APPCACHE_CACHE__RETAINED_GENERATIONS", "7");
            jail.set_env("APPCACHE_TRANSPORT__TIMEOUT_SECS", "5");
            jail.set_env("APPCACHE_SERVER__PORT", "9100");

            let config = load_config(Path::new("appcache.toml")).map_err(|e| e.to_string())?;
            assert!(config.orchestrator.auto_swap);
            assert_eq!(config.orchestrator.stall_timeout_secs, 45);
            assert_eq!(config.cache.retained_generations, 7);
            assert_eq!(config.transport.timeout_secs, 5);
            assert_eq!(config.server.port, 9100);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_manifest_url() {
        Jail::expect_with(|jail| {
            jail.create_file("appcache.toml", MINIMAL)?;
            jail.set_env("APPCACHE_MANIFEST__URL", "https://y/other/m.appcache");

            let config = load_config(Path::new("appcache.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.manifest.url.as_str(), "https://y/other/m.appcache");
            Ok(())
        });
    }

    #[test]
    fn test_env_override_with_bad_value_fails() {
        Jail::expect_with(|jail| {
            jail.create_file("appcache.toml", MINIMAL)?;
            jail.set_env("APPCACHE_ORCHESTRATOR__STALL_TIMEOUT_SECS", "soon");

            let result = load_config(Path::new("appcache.toml"));
            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }
}
