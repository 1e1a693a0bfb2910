//! Service configuration

use anyhow::Result;
use serde::Deserialize;

/// Insights service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InsightsConfig {
    /// Cluster name used in structured log events
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// API server port for health/metrics/discovery endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Metrics backend base URL for capacity queries
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,

    /// Pin discovery to this namespace instead of scoring all namespaces
    #[serde(default)]
    pub namespace_override: Option<String>,

    /// Namespace label key used for tenant discovery
    #[serde(default = "default_tenant_label_key")]
    pub tenant_label_key: String,

    /// Minimum confidence for a component to be reported
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Component topology cache TTL in seconds
    #[serde(default = "default_component_ttl")]
    pub component_ttl_secs: u64,

    /// Tenant topology cache TTL in seconds
    #[serde(default = "default_tenant_ttl")]
    pub tenant_ttl_secs: u64,

    /// Interval between background collection cycles in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Interval between memory-pressure checks in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Cache memory budget override in bytes; derived from system
    /// memory when unset
    #[serde(default)]
    pub max_cache_bytes: Option<u64>,

    /// Eviction policy: size-based, count-based, ttl-based, or hybrid
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// Deadline for individual metrics queries in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_cluster_name() -> String {
    std::env::var("CLUSTER_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_metrics_endpoint() -> String {
    "http://metrics-query:8080".to_string()
}

fn default_tenant_label_key() -> String {
    "tenant".to_string()
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_component_ttl() -> u64 {
    600
}

fn default_tenant_ttl() -> u64 {
    120
}

fn default_collection_interval() -> u64 {
    30
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_eviction_policy() -> String {
    "hybrid".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            api_port: default_api_port(),
            metrics_endpoint: default_metrics_endpoint(),
            namespace_override: None,
            tenant_label_key: default_tenant_label_key(),
            min_confidence: default_min_confidence(),
            component_ttl_secs: default_component_ttl(),
            tenant_ttl_secs: default_tenant_ttl(),
            collection_interval_secs: default_collection_interval(),
            monitor_interval_secs: default_monitor_interval(),
            max_cache_bytes: None,
            eviction_policy: default_eviction_policy(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl InsightsConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("INSIGHTS"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
