//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::manifest::ManifestOptions;

/// Configuration for the update orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often a consumer should trigger `update` (seconds).
    /// 0 = only on demand.
    #[serde(default)]
    pub update_interval_secs: u64,

    /// Emit a stall event when a download cycle makes no progress for this
    /// long (seconds). 0 = disabled.
    #[serde(default)]
    pub stall_timeout_secs: u64,

    /// Swap to the new generation as soon as it is ready.
    #[serde(default)]
    pub auto_swap: bool,

    /// Only accept entries using the manifest URL's scheme.
    #[serde(default)]
    pub strict_schemes: bool,

    /// Require fallback entries to share the manifest's origin.
    #[serde(default)]
    pub same_origin: bool,
}

impl OrchestratorConfig {
    /// Options used when parsing fetched manifests.
    pub fn manifest_options(&self) -> ManifestOptions {
        ManifestOptions::new(self.strict_schemes, self.same_origin)
    }
}
