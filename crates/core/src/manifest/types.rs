//! Types shared by the manifest document and its codec.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or parsing a cache manifest.
///
/// Every variant is a format error: the input could not be understood as a
/// manifest at all. Irregular entries (foreign schemes, self references,
/// duplicate fallback namespaces) are not errors, they are silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The first line is not the `CACHE MANIFEST` magic line.
    #[error("not a cache manifest")]
    NotAManifest,

    /// A token could not be parsed as a URI reference.
    #[error("invalid URI {token:?}: {reason}")]
    InvalidUri { token: String, reason: String },

    /// The manifest URL itself is unusable (relative, or not http/https).
    #[error("invalid manifest URL {url:?}: {reason}")]
    InvalidManifestUrl { url: String, reason: String },
}

/// How the cache should be consulted for master entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve from cache, update in the background.
    #[default]
    Fast,
    /// Prefer the network when online (`SETTINGS: prefer-online`).
    PreferOnline,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Fast => "fast",
            CacheMode::PreferOnline => "prefer_online",
        }
    }
}

/// State of the online whitelist wildcard (`*` in the NETWORK section).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardFlag {
    /// Only whitelisted namespaces may bypass the cache.
    #[default]
    Blocking,
    /// Everything not cached may go to the network.
    Open,
}

impl WildcardFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            WildcardFlag::Blocking => "blocking",
            WildcardFlag::Open => "open",
        }
    }
}

/// Validation switches applied while building a document.
///
/// Both switches are relative to the manifest URL and have no effect on a
/// document built without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOptions {
    /// Only accept entries that use the manifest URL's own scheme.
    #[serde(default)]
    pub strict_schemes: bool,
    /// Require fallback namespaces and targets to share the manifest's origin.
    #[serde(default)]
    pub same_origin: bool,
}

impl ManifestOptions {
    pub fn new(strict_schemes: bool, same_origin: bool) -> Self {
        Self {
            strict_schemes,
            same_origin,
        }
    }
}

/// Which URI schemes a document accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemePolicy {
    /// `http` or `https`.
    HttpOrHttps,
    /// Exactly the manifest URL's scheme.
    Only(String),
    /// `http`, `https`, or a scheme-less relative reference. Used by documents
    /// that have no manifest URL to resolve against.
    HttpOrHttpsOrNone,
}

impl SchemePolicy {
    /// Check a scheme (`None` for relative references) against the policy.
    pub fn allows(&self, scheme: Option<&str>) -> bool {
        match (self, scheme) {
            (SchemePolicy::Only(allowed), Some(scheme)) => allowed.eq_ignore_ascii_case(scheme),
            (SchemePolicy::Only(_), None) => false,
            (SchemePolicy::HttpOrHttps | SchemePolicy::HttpOrHttpsOrNone, Some(scheme)) => {
                scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
            }
            (SchemePolicy::HttpOrHttps, None) => false,
            (SchemePolicy::HttpOrHttpsOrNone, None) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_policy_http_or_https() {
        let policy = SchemePolicy::HttpOrHttps;
        assert!(policy.allows(Some("http")));
        assert!(policy.allows(Some("HTTPS")));
        assert!(!policy.allows(Some("ftp")));
        assert!(!policy.allows(None));
    }

    #[test]
    fn test_scheme_policy_strict() {
        let policy = SchemePolicy::Only("https".to_string());
        assert!(policy.allows(Some("https")));
        assert!(!policy.allows(Some("http")));
        assert!(!policy.allows(None));
    }

    #[test]
    fn test_scheme_policy_allows_relative_without_manifest() {
        let policy = SchemePolicy::HttpOrHttpsOrNone;
        assert!(policy.allows(None));
        assert!(policy.allows(Some("http")));
        assert!(!policy.allows(Some("mailto")));
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: ManifestOptions = toml::from_str("").unwrap();
        assert_eq!(options, ManifestOptions::default());

        let options: ManifestOptions = toml::from_str("strict_schemes = true").unwrap();
        assert!(options.strict_schemes);
        assert!(!options.same_origin);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ManifestError::NotAManifest.to_string(), "not a cache manifest");
        let err = ManifestError::InvalidUri {
            token: "a<b".to_string(),
            reason: "illegal character '<'".to_string(),
        };
        assert_eq!(err.to_string(), "invalid URI \"a<b\": illegal character '<'");
    }
}
