//! Tenant discovery and consolidation
//!
//! Aggregates tenant candidates from three independent sources:
//! multiplexing identifiers in sidecar/agent configuration, namespace
//! labels under a configurable tenant-label key, and namespace naming
//! conventions plus tenant-specific override configs. Candidates are
//! deduplicated by name; the first discovered source wins and evidence
//! from later sources is appended.

use crate::cluster::{metrics, ClusterLister, MetricsClient, ResourceKind, TimeRange};
use crate::discovery::config_sources::{extract_multiplexing_ids, FetchedConfig};
use crate::error::SourceOutcome;
use crate::models::{ConfigKind, TenantCandidate, TenantSource};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default namespace label key identifying a tenant.
pub const DEFAULT_TENANT_LABEL_KEY: &str = "tenant";

/// Namespace name conventions that imply a tenant, with the tenant name
/// captured by the first group.
const NAMESPACE_NAME_PATTERNS: &[&str] = &[r"^tenant-([a-z0-9-]+)$", r"^(team-[a-z0-9-]+)$"];

/// Deadline for the per-tenant utilization probe.
const UTILIZATION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consolidates candidates from all sources, first source wins.
#[derive(Default)]
struct TenantSet {
    tenants: Vec<TenantCandidate>,
    index: HashMap<String, usize>,
}

impl TenantSet {
    fn add(&mut self, candidate: TenantCandidate) {
        match self.index.get(&candidate.name) {
            Some(&i) => {
                let existing = &mut self.tenants[i];
                for evidence in candidate.evidence {
                    if !existing.evidence.contains(&evidence) {
                        existing.evidence.push(evidence);
                    }
                }
                if existing.namespace.is_empty() {
                    existing.namespace = candidate.namespace;
                }
            }
            None => {
                self.index.insert(candidate.name.clone(), self.tenants.len());
                self.tenants.push(candidate);
            }
        }
    }

    fn into_sorted(mut self) -> Vec<TenantCandidate> {
        self.tenants.sort_by(|a, b| a.name.cmp(&b.name));
        self.tenants
    }
}

/// Discover tenant candidates across all sources.
///
/// Each source fails independently; the cycle completes with whatever was
/// gathered. Only all three sources failing yields a failed outcome.
pub async fn discover_tenants(
    lister: &Arc<dyn ClusterLister>,
    metrics_client: Option<&Arc<dyn MetricsClient>>,
    tenant_label_key: &str,
    configs: &[FetchedConfig],
) -> SourceOutcome<Vec<TenantCandidate>> {
    let mut set = TenantSet::default();
    let mut failures = Vec::new();
    let mut failed_sources = 0usize;

    // Source 1: multiplexing identifiers in sidecar/agent configuration.
    for config in configs {
        for id in extract_multiplexing_ids(&config.raw) {
            set.add(TenantCandidate {
                name: id,
                source: TenantSource::HeaderDerived,
                namespace: config.source.namespace.clone(),
                has_real_data: false,
                evidence: vec![format!("multiplexing-id:{}", config.source.name)],
            });
        }
    }
    if configs.is_empty() {
        failures.push("sidecar-config: no configuration resources available".to_string());
        failed_sources += 1;
    }

    // Sources 2 and 3 both read the namespace list.
    let namespaces = match lister.list_resources(ResourceKind::Namespace, "", None).await {
        Ok(namespaces) => namespaces,
        Err(e) => {
            warn!(error = %e, "Namespace listing failed, label and naming sources treated as empty");
            failures.push(format!("namespaces: {e}"));
            failed_sources += 2;
            Vec::new()
        }
    };

    let name_patterns: Vec<Regex> = NAMESPACE_NAME_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect();

    for ns in &namespaces {
        // Source 2: tenant label.
        if let Some(value) = ns.labels.get(tenant_label_key) {
            set.add(TenantCandidate {
                name: value.clone(),
                source: TenantSource::LabelDerived,
                namespace: ns.name.clone(),
                has_real_data: false,
                evidence: vec![format!("namespace-label:{tenant_label_key}={value}")],
            });
        }

        // Source 3a: naming conventions.
        for pattern in &name_patterns {
            if let Some(cap) = pattern.captures(&ns.name) {
                set.add(TenantCandidate {
                    name: cap[1].to_string(),
                    source: TenantSource::ConfigDerived,
                    namespace: ns.name.clone(),
                    has_real_data: false,
                    evidence: vec![format!("namespace-pattern:{}", ns.name)],
                });
            }
        }
    }

    // Source 3b: tenant-specific override configs mentioning the tenant.
    for config in configs {
        if !matches!(
            config.source.kind,
            ConfigKind::OverrideConfig | ConfigKind::TenantSpecificConfig
        ) {
            continue;
        }
        let known: Vec<String> = set.tenants.iter().map(|t| t.name.clone()).collect();
        for name in known {
            if config.raw.contains(&name) {
                set.add(TenantCandidate {
                    name,
                    source: TenantSource::ConfigDerived,
                    namespace: config.source.namespace.clone(),
                    has_real_data: false,
                    evidence: vec![format!("config-override:{}", config.source.name)],
                });
            }
        }
    }

    if failed_sources >= 3 {
        return SourceOutcome::Failed(failures.join("; "));
    }

    let mut tenants = set.into_sorted();
    mark_real_data(&mut tenants, lister, metrics_client, &namespaces).await;

    if failures.is_empty() {
        SourceOutcome::Complete(tenants)
    } else {
        SourceOutcome::Partial(tenants, failures.join("; "))
    }
}

/// Set `has_real_data` from live utilization signals.
///
/// A tenant counts as live when a workload in its namespace has ready
/// replicas and, when a metrics client is available, its latest ingestion
/// rate is non-zero. Probe failures leave the flag false.
async fn mark_real_data(
    tenants: &mut [TenantCandidate],
    lister: &Arc<dyn ClusterLister>,
    metrics_client: Option<&Arc<dyn MetricsClient>>,
    namespaces: &[crate::cluster::ResourceMetadata],
) {
    for tenant in tenants.iter_mut() {
        if let Some(client) = metrics_client {
            let range = TimeRange::last_hours(1);
            let probe = tokio::time::timeout(
                UTILIZATION_PROBE_TIMEOUT,
                client.query(&tenant.name, metrics::INGESTION_RATE, range),
            )
            .await;
            match probe {
                Ok(Ok(series)) => {
                    if series.iter().filter_map(|s| s.latest()).any(|v| v > 0.0) {
                        tenant.has_real_data = true;
                        tenant.evidence.push("live-ingestion".to_string());
                        continue;
                    }
                }
                Ok(Err(e)) => {
                    debug!(tenant = %tenant.name, error = %e, "Utilization probe failed");
                }
                Err(_) => {
                    debug!(tenant = %tenant.name, "Utilization probe timed out");
                }
            }
        }

        // Structural fallback: a running workload of any kind in the
        // tenant namespace.
        if tenant.namespace.is_empty() {
            continue;
        }
        if !namespaces.iter().any(|ns| ns.name == tenant.namespace) {
            continue;
        }
        for kind in [
            ResourceKind::Deployment,
            ResourceKind::StatefulSet,
            ResourceKind::DaemonSet,
        ] {
            match lister.list_resources(kind, &tenant.namespace, None).await {
                Ok(workloads) => {
                    if workloads
                        .iter()
                        .any(|w| w.ready_replicas.unwrap_or(0) > 0)
                    {
                        tenant.has_real_data = true;
                        tenant.evidence.push("running-workload".to_string());
                        break;
                    }
                }
                Err(e) => {
                    debug!(namespace = %tenant.namespace, kind = ?kind, error = %e, "Workload probe failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{async_trait, ResourceMetadata, SamplePoint, TimeSeries};
    use crate::discovery::config_sources::build_config_source;
    use anyhow::Result;

    struct MockLister {
        namespaces: Vec<ResourceMetadata>,
        workloads: Vec<ResourceMetadata>,
    }

    #[async_trait]
    impl ClusterLister for MockLister {
        async fn list_resources(
            &self,
            kind: ResourceKind,
            namespace: &str,
            _label_selector: Option<&str>,
        ) -> Result<Vec<ResourceMetadata>> {
            match kind {
                ResourceKind::Namespace => Ok(self.namespaces.clone()),
                ResourceKind::Deployment | ResourceKind::StatefulSet | ResourceKind::DaemonSet => {
                    Ok(self
                        .workloads
                        .iter()
                        .filter(|w| w.namespace == namespace && w.kind == kind)
                        .cloned()
                        .collect())
                }
                _ => Ok(vec![]),
            }
        }

        async fn get_config_resource(&self, _name: &str, _namespace: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct MockMetrics {
        live_tenants: Vec<String>,
    }

    #[async_trait]
    impl MetricsClient for MockMetrics {
        async fn query(
            &self,
            tenant: &str,
            metric: &str,
            _range: TimeRange,
        ) -> Result<Vec<TimeSeries>> {
            let value = if self.live_tenants.iter().any(|t| t == tenant) {
                1200.0
            } else {
                0.0
            };
            Ok(vec![TimeSeries {
                metric: metric.to_string(),
                points: vec![SamplePoint { timestamp: 0, value }],
            }])
        }
    }

    fn namespace(name: &str, labels: &[(&str, &str)]) -> ResourceMetadata {
        let mut ns = ResourceMetadata::new(name, "", ResourceKind::Namespace);
        for (k, v) in labels {
            ns.labels.insert(k.to_string(), v.to_string());
        }
        ns
    }

    fn fetched(name: &str, raw: &str) -> FetchedConfig {
        let meta = ResourceMetadata::new(name, "metrics-prod", ResourceKind::ConfigMap);
        FetchedConfig {
            source: build_config_source(&meta, raw),
            raw: raw.to_string(),
        }
    }

    #[tokio::test]
    async fn test_label_and_config_evidence_consolidated() {
        // team-x appears via namespace label and an override config with a
        // non-zero ingestion override; expect one candidate, two evidence
        // entries.
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![namespace("x-prod", &[("tenant", "team-x")])],
            workloads: vec![],
        });
        let configs = vec![fetched(
            "runtime-overrides",
            "team-x:\n  ingestion_rate: 50000\n",
        )];

        let outcome = discover_tenants(&lister, None, DEFAULT_TENANT_LABEL_KEY, &configs).await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };

        assert_eq!(tenants.len(), 1);
        let tenant = &tenants[0];
        assert_eq!(tenant.name, "team-x");
        assert_eq!(tenant.source, TenantSource::LabelDerived);
        assert_eq!(tenant.evidence.len(), 2);
        assert!(tenant.evidence[0].starts_with("namespace-label"));
        assert!(tenant.evidence[1].starts_with("config-override"));
    }

    #[tokio::test]
    async fn test_first_source_wins_on_dedup() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![namespace("y-prod", &[("tenant", "team-y")])],
            workloads: vec![],
        });
        // Header source sees team-y first.
        let configs = vec![fetched("agent-metrics-config", "X-Scope-OrgID: team-y\n")];

        let outcome = discover_tenants(&lister, None, DEFAULT_TENANT_LABEL_KEY, &configs).await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };

        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].source, TenantSource::HeaderDerived);
        assert!(tenants[0].evidence.len() >= 2);
    }

    #[tokio::test]
    async fn test_namespace_naming_pattern_source() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![namespace("tenant-acme", &[]), namespace("scratch", &[])],
            workloads: vec![],
        });
        let configs = vec![fetched("metrics-config", "retention: 30d\n")];

        let outcome = discover_tenants(&lister, None, DEFAULT_TENANT_LABEL_KEY, &configs).await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };

        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "acme");
        assert_eq!(tenants[0].source, TenantSource::ConfigDerived);
    }

    #[tokio::test]
    async fn test_has_real_data_from_metrics_probe() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![
                namespace("live-prod", &[("tenant", "team-live")]),
                namespace("idle-prod", &[("tenant", "team-idle")]),
            ],
            workloads: vec![],
        });
        let metrics_client: Arc<dyn MetricsClient> = Arc::new(MockMetrics {
            live_tenants: vec!["team-live".to_string()],
        });
        let configs = vec![fetched("metrics-config", "retention: 30d\n")];

        let outcome = discover_tenants(
            &lister,
            Some(&metrics_client),
            DEFAULT_TENANT_LABEL_KEY,
            &configs,
        )
        .await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };

        let live = tenants.iter().find(|t| t.name == "team-live").unwrap();
        let idle = tenants.iter().find(|t| t.name == "team-idle").unwrap();
        assert!(live.has_real_data);
        assert!(!idle.has_real_data);
    }

    #[tokio::test]
    async fn test_structural_fallback_requires_ready_replicas() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![namespace("z-prod", &[("tenant", "team-z")])],
            workloads: vec![
                ResourceMetadata::new("worker", "z-prod", ResourceKind::Deployment)
                    .with_replicas(2, 2),
            ],
        });
        let configs = vec![fetched("metrics-config", "retention: 30d\n")];

        let outcome = discover_tenants(&lister, None, DEFAULT_TENANT_LABEL_KEY, &configs).await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };
        assert!(tenants[0].has_real_data);
        assert!(tenants[0].evidence.contains(&"running-workload".to_string()));
    }

    #[tokio::test]
    async fn test_structural_fallback_covers_stateful_workloads() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![namespace("w-prod", &[("tenant", "team-w")])],
            workloads: vec![
                ResourceMetadata::new("timeseries-store", "w-prod", ResourceKind::StatefulSet)
                    .with_replicas(3, 3),
            ],
        });
        let configs = vec![fetched("metrics-config", "retention: 30d\n")];

        let outcome = discover_tenants(&lister, None, DEFAULT_TENANT_LABEL_KEY, &configs).await;
        let SourceOutcome::Complete(tenants) = outcome else {
            panic!("expected complete outcome");
        };
        assert!(tenants[0].has_real_data);
        assert!(tenants[0].evidence.contains(&"running-workload".to_string()));
    }
}
