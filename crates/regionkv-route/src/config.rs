use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::selector::ReplicaSelector;

/// Configuration for the region manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Period of the background store health check.
    pub health_check_interval_secs: u64,
    /// Start the store health checker and honour forwarding proxies.
    pub enable_forwarding: bool,
    /// Replica selector used by `resolve_store_for_key`.
    pub default_selector: ReplicaSelector,
    /// Retry budget for metadata authority calls.
    pub backoff: BackoffConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 10,
            enable_forwarding: false,
            default_selector: ReplicaSelector::Leader,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// Loads a config from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: RoutingConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: RoutingConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Returns the health check period.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}
