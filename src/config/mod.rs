use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

// Re-export section config types
pub use crate::backend::BackendConfig;
pub use crate::mqtt::MqttConfig;

pub const DEFAULT_CONFIG_PATH: &str = "meterdash.toml";

/// Complete dashboard configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Diagnostics HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl DashboardConfig {
    /// Apply `METERDASH_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("METERDASH_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(url) = lookup("METERDASH_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(bind) = lookup("METERDASH_BIND") {
            self.server.bind = bind;
        }
    }
}

/// Config file path: first CLI argument, then `METERDASH_CONFIG`, then the default
pub fn config_path(arg: Option<String>) -> PathBuf {
    arg.or_else(|| std::env::var("METERDASH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Load configuration from a TOML file.
///
/// A missing file yields the defaults. Environment overrides are applied
/// either way.
pub fn load_config(path: &Path) -> Result<DashboardConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        DashboardConfig::default()
    };

    config.apply_env_overrides();
    Ok(config)
}
