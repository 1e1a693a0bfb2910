//! Multi-source topology discovery
//!
//! The engine orchestrates namespace-root selection, component
//! classification, configuration parsing, and tenant consolidation. Each
//! sub-source fails independently; a cycle only fails outright when every
//! source failed.

pub mod components;
pub mod config_sources;
pub mod namespace;
pub mod patterns;
pub mod tenants;

pub use components::DEFAULT_MIN_CONFIDENCE;
pub use config_sources::FetchedConfig;
pub use namespace::NamespaceScore;
pub use patterns::{CategoryMatch, PatternMatcher, PatternTable};
pub use tenants::DEFAULT_TENANT_LABEL_KEY;

use crate::cluster::{ClusterLister, MetricsClient, TimedLister, DEFAULT_LIST_TIMEOUT};
use crate::error::InsightsError;
use crate::models::{ComponentTopology, TenantTopology};
use crate::observability::InsightsMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Tuning knobs for the discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Components below this confidence are dropped.
    pub min_confidence: f64,
    /// Namespace label key identifying tenants.
    pub tenant_label_key: String,
    /// Skip namespace-root scoring and use this namespace directly.
    pub namespace_override: Option<String>,
    /// Deadline applied to each cluster API call during a cycle.
    pub list_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            tenant_label_key: DEFAULT_TENANT_LABEL_KEY.to_string(),
            namespace_override: None,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }
}

/// Read-only discovery over a cluster and (optionally) the backend's own
/// metrics. Owns the precompiled pattern matcher.
pub struct DiscoveryEngine {
    lister: Arc<dyn ClusterLister>,
    metrics_client: Option<Arc<dyn MetricsClient>>,
    matcher: PatternMatcher,
    config: DiscoveryConfig,
    metrics: InsightsMetrics,
}

impl DiscoveryEngine {
    pub fn new(
        lister: Arc<dyn ClusterLister>,
        metrics_client: Option<Arc<dyn MetricsClient>>,
        config: DiscoveryConfig,
    ) -> Self {
        // Every cluster call inside a cycle runs under the same deadline.
        let lister: Arc<dyn ClusterLister> =
            Arc::new(TimedLister::new(lister, config.list_timeout));
        Self {
            lister,
            metrics_client,
            matcher: PatternMatcher::with_defaults(),
            config,
            metrics: InsightsMetrics::new(),
        }
    }

    pub fn with_pattern_table(mut self, table: &PatternTable) -> Self {
        self.matcher = PatternMatcher::new(table);
        self
    }

    /// Run one component-side discovery cycle.
    ///
    /// Fails only when namespace scoring, config discovery, and component
    /// listing all failed; otherwise returns whatever was gathered with
    /// the failure reasons recorded in the topology.
    pub async fn discover_component_topology(&self) -> Result<ComponentTopology, InsightsError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        let root = self.discover_root(&mut failures).await;
        let configs_outcome = config_sources::discover_config_sources(&self.lister, &root).await;
        let configs_failed = configs_outcome.is_failed();
        let configs = configs_outcome.fold_into("config-sources", &mut failures);

        let components_outcome = components::discover_components(
            &self.lister,
            &self.matcher,
            &root,
            self.config.min_confidence,
            &configs,
        )
        .await;
        let components_failed = components_outcome.is_failed();
        let components = components_outcome.fold_into("components", &mut failures);

        if components_failed && configs_failed {
            self.metrics.inc_discovery_errors();
            return Err(InsightsError::TotalDiscoveryFailure(failures.join("; ")));
        }

        self.metrics
            .observe_discovery_latency(started.elapsed().as_secs_f64());
        self.metrics.set_components_discovered(components.len() as i64);
        info!(
            namespace_root = %root,
            components = components.len(),
            config_sources = configs.len(),
            partial_failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Component discovery cycle complete"
        );

        Ok(ComponentTopology {
            namespace_root: root,
            components,
            config_sources: configs.into_iter().map(|f| f.source).collect(),
            discovered_at: Utc::now(),
            partial_failures: failures,
        })
    }

    /// Run one tenant-side discovery cycle.
    pub async fn discover_tenant_topology(&self) -> Result<TenantTopology, InsightsError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        let root = self.discover_root(&mut failures).await;
        let configs = config_sources::discover_config_sources(&self.lister, &root)
            .await
            .fold_into("config-sources", &mut failures);

        let outcome = tenants::discover_tenants(
            &self.lister,
            self.metrics_client.as_ref(),
            &self.config.tenant_label_key,
            &configs,
        )
        .await;

        let tenants_failed = outcome.is_failed();
        let tenants = outcome.fold_into("tenants", &mut failures);
        if tenants_failed {
            self.metrics.inc_discovery_errors();
            return Err(InsightsError::TotalDiscoveryFailure(failures.join("; ")));
        }

        self.metrics
            .observe_discovery_latency(started.elapsed().as_secs_f64());
        self.metrics.set_tenants_discovered(tenants.len() as i64);
        info!(
            tenants = tenants.len(),
            partial_failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tenant discovery cycle complete"
        );

        Ok(TenantTopology {
            tenants,
            discovered_at: Utc::now(),
            partial_failures: failures,
        })
    }

    async fn discover_root(&self, failures: &mut Vec<String>) -> String {
        if let Some(ns) = &self.config.namespace_override {
            return ns.clone();
        }
        let selected = namespace::discover_namespace(&self.lister, &self.matcher)
            .await
            .fold_into("namespace-root", failures);
        match selected {
            Some(score) => score.namespace,
            None => {
                warn!("No namespace scored above zero, discovering across all namespaces");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{async_trait, ResourceKind, ResourceMetadata};
    use anyhow::{bail, Result};

    struct ClusterFixture {
        fail_everything: bool,
    }

    #[async_trait]
    impl ClusterLister for ClusterFixture {
        async fn list_resources(
            &self,
            kind: ResourceKind,
            namespace: &str,
            _label_selector: Option<&str>,
        ) -> Result<Vec<ResourceMetadata>> {
            if self.fail_everything {
                bail!("api unavailable");
            }
            match kind {
                ResourceKind::Namespace => Ok(vec![
                    ResourceMetadata::new("payments-prod", "", ResourceKind::Namespace)
                        .with_label("tenant", "team-x"),
                    ResourceMetadata::new("scratch", "", ResourceKind::Namespace),
                ]),
                ResourceKind::Deployment if namespace == "payments-prod" => {
                    Ok(vec![ResourceMetadata::new(
                        "payments-prod-ingester",
                        "payments-prod",
                        ResourceKind::Deployment,
                    )
                    .with_label("app.kubernetes.io/name", "ingester-workload")
                    .with_replicas(3, 3)
                    .with_image("registry.local/backend:2.10.3")])
                }
                ResourceKind::ConfigMap if namespace == "payments-prod" => {
                    Ok(vec![ResourceMetadata::new(
                        "runtime-overrides",
                        "payments-prod",
                        ResourceKind::ConfigMap,
                    )])
                }
                _ => Ok(vec![]),
            }
        }

        async fn get_config_resource(&self, name: &str, _namespace: &str) -> Result<Option<String>> {
            if self.fail_everything {
                bail!("api unavailable");
            }
            if name == "runtime-overrides" {
                Ok(Some("team-x:\n  ingestion_rate: 50000\n".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    fn engine(fail_everything: bool) -> DiscoveryEngine {
        DiscoveryEngine::new(
            Arc::new(ClusterFixture { fail_everything }),
            None,
            DiscoveryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_full_component_cycle_selects_root_and_classifies() {
        let topology = engine(false).discover_component_topology().await.unwrap();

        assert_eq!(topology.namespace_root, "payments-prod");
        assert_eq!(topology.components.len(), 1);
        let ingester = &topology.components[0];
        assert_eq!(ingester.name, "payments-prod-ingester");
        assert_eq!(ingester.kind, crate::models::ComponentKind::WritePath);
        // Two independent matches: name pattern and label selector.
        assert!(ingester.validation.matched_by.len() >= 2);
        assert!(ingester.validation.confidence >= 0.6);
        assert_eq!(topology.config_sources.len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_surfaces_error() {
        let err = engine(true).discover_component_topology().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));

        let err = engine(true).discover_tenant_topology().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));
    }

    #[tokio::test]
    async fn test_hung_cluster_api_cut_off_by_deadline() {
        struct HangingLister;

        #[async_trait]
        impl ClusterLister for HangingLister {
            async fn list_resources(
                &self,
                _kind: ResourceKind,
                _namespace: &str,
                _label_selector: Option<&str>,
            ) -> Result<Vec<ResourceMetadata>> {
                std::future::pending().await
            }

            async fn get_config_resource(
                &self,
                _name: &str,
                _namespace: &str,
            ) -> Result<Option<String>> {
                std::future::pending().await
            }
        }

        let engine = DiscoveryEngine::new(
            Arc::new(HangingLister),
            None,
            DiscoveryConfig {
                list_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        // The cycle must come back as a failure instead of blocking.
        let err = engine.discover_component_topology().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));
    }

    #[tokio::test]
    async fn test_namespace_override_skips_scoring() {
        let lister = Arc::new(ClusterFixture { fail_everything: false });
        let engine = DiscoveryEngine::new(
            lister,
            None,
            DiscoveryConfig {
                namespace_override: Some("scratch".to_string()),
                ..Default::default()
            },
        );

        let topology = engine.discover_component_topology().await.unwrap();
        assert_eq!(topology.namespace_root, "scratch");
        assert!(topology.components.is_empty());
    }

    #[tokio::test]
    async fn test_tenant_cycle_consolidates_override_config() {
        let topology = engine(false).discover_tenant_topology().await.unwrap();
        assert_eq!(topology.tenants.len(), 1);
        assert_eq!(topology.tenants[0].name, "team-x");
    }
}
