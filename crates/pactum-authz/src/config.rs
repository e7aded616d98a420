//! Authorization layer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use pactum_contracts::error::{AuthzError, AuthzResult};

/// Tunables for the authorization layer. Every field has a default, so an
/// empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Quiet window for decision streams: a re-evaluation runs only after
    /// the combined inputs have stopped changing for this long.
    pub debounce_window_ms: u64,
    /// Path prefixes exempt from outbound policy enforcement, e.g. static
    /// asset fetches that must succeed before the module itself is loaded.
    pub exempt_prefixes: Vec<String>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self { debounce_window_ms: 50, exempt_prefixes: vec!["/assets".to_string()] }
    }
}

impl AuthzConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn from_toml_str(raw: &str) -> AuthzResult<Self> {
        toml::from_str(raw).map_err(|e| AuthzError::Config {
            reason: format!("failed to parse authorization config: {}", e),
        })
    }
}
