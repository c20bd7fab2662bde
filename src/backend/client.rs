use crate::condition::ConditionSet;
use crate::controller::ConfigUpdate;
use crate::device::Device;
use crate::metric::MetricConfig;
use crate::validation::{validate_condition_set, validate_metric_config};
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Feature name whose configs are condition sets rather than metrics
pub const CONDITION_FEATURE: &str = "logic";

/// Configuration backend settings
#[derive(Clone, Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Metric features fetched from `/api/<feature>-configs`
    #[serde(default = "default_metric_features")]
    pub metric_features: Vec<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_metric_features() -> Vec<String> {
    ["pue", "bill", "pdu", "power-analyzer"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metric_features: default_metric_features(),
            refresh_interval_seconds: default_refresh_interval(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// HTTP client for the device listing and configuration CRUD endpoints
#[derive(Clone)]
pub struct BackendClient {
    http_client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client with default settings against `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(&BackendConfig {
            base_url: base_url.into(),
            ..BackendConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Devices available for binding, with their last known payload
    pub async fn fetch_devices(&self) -> Result<Vec<Device>> {
        let url = format!("{}/api/devices/for-selection", self.base_url);
        self.get_json(&url).await.context("Failed to fetch devices")
    }

    pub async fn fetch_metric_configs(&self, feature: &str) -> Result<Vec<MetricConfig>> {
        let url = self.configs_url(feature);
        self.get_json(&url)
            .await
            .with_context(|| format!("Failed to fetch {} configs", feature))
    }

    pub async fn fetch_condition_sets(&self) -> Result<Vec<ConditionSet>> {
        let url = self.configs_url(CONDITION_FEATURE);
        self.get_json(&url)
            .await
            .context("Failed to fetch condition sets")
    }

    /// Fetch every list the controller needs.
    ///
    /// Fails as a whole if any request fails, so a partial listing never
    /// replaces the current configuration.
    pub async fn fetch_all(&self, features: &[String]) -> Result<ConfigUpdate> {
        let devices = self.fetch_devices().await?;

        let mut metric_configs = Vec::new();
        for feature in features {
            metric_configs.extend(self.fetch_metric_configs(feature).await?);
        }

        let condition_sets = self.fetch_condition_sets().await?;

        info!(
            devices = devices.len(),
            metric_configs = metric_configs.len(),
            condition_sets = condition_sets.len(),
            "Fetched configuration"
        );

        Ok(ConfigUpdate::default()
            .devices(devices)
            .metric_configs(metric_configs)
            .condition_sets(condition_sets))
    }

    pub async fn create_metric_config(
        &self,
        feature: &str,
        config: &MetricConfig,
    ) -> Result<MetricConfig> {
        validate_metric_config(config).context("Invalid metric config")?;
        let url = self.configs_url(feature);
        self.send_json(self.http_client.post(&url), config)
            .await
            .with_context(|| format!("Failed to create {} config", feature))
    }

    pub async fn update_metric_config(
        &self,
        feature: &str,
        config: &MetricConfig,
    ) -> Result<MetricConfig> {
        validate_metric_config(config).context("Invalid metric config")?;
        let url = self.config_url(feature, config.id());
        self.send_json(self.http_client.put(&url), config)
            .await
            .with_context(|| format!("Failed to update {} config '{}'", feature, config.id()))
    }

    pub async fn delete_metric_config(&self, feature: &str, id: &str) -> Result<()> {
        self.delete(&self.config_url(feature, id))
            .await
            .with_context(|| format!("Failed to delete {} config '{}'", feature, id))
    }

    pub async fn create_condition_set(&self, set: &ConditionSet) -> Result<ConditionSet> {
        validate_condition_set(set).context("Invalid condition set")?;
        let url = self.configs_url(CONDITION_FEATURE);
        self.send_json(self.http_client.post(&url), set)
            .await
            .context("Failed to create condition set")
    }

    pub async fn update_condition_set(&self, set: &ConditionSet) -> Result<ConditionSet> {
        validate_condition_set(set).context("Invalid condition set")?;
        let url = self.config_url(CONDITION_FEATURE, &set.id);
        self.send_json(self.http_client.put(&url), set)
            .await
            .with_context(|| format!("Failed to update condition set '{}'", set.id))
    }

    pub async fn delete_condition_set(&self, id: &str) -> Result<()> {
        self.delete(&self.config_url(CONDITION_FEATURE, id))
            .await
            .with_context(|| format!("Failed to delete condition set '{}'", id))
    }

    fn configs_url(&self, feature: &str) -> String {
        format!("{}/api/{}-configs", self.base_url, feature)
    }

    fn config_url(&self, feature: &str, id: &str) -> String {
        format!("{}/api/{}-configs/{}", self.base_url, feature, id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_response_status(response)
            .await?
            .json::<T>()
            .await
            .context("Failed to parse response body")
    }

    async fn send_json<B, T>(&self, request: reqwest::RequestBuilder, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = request
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check_response_status(response)
            .await?
            .json::<T>()
            .await
            .context("Failed to parse response body")
    }

    async fn delete(&self, url: &str) -> Result<()> {
        debug!(url = %url, "DELETE");
        let response = self
            .http_client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_response_status(response).await?;
        Ok(())
    }
}

async fn check_response_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(anyhow!("Backend returned {}: {}", status, body))
}
