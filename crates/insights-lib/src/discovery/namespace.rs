//! Namespace root selection
//!
//! Scores every namespace in the cluster with a composite point system
//! and selects the highest-scoring one as the authoritative root for
//! component discovery. Ties are broken by alphabetical namespace name so
//! selection stays deterministic.

use crate::cluster::{ClusterLister, ResourceKind};
use crate::discovery::patterns::PatternMatcher;
use crate::error::SourceOutcome;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Points awarded per scoring signal.
const NAME_PATTERN_POINTS: u32 = 10;
const LABEL_POINTS: u32 = 5;
const COMPONENT_POINTS: u32 = 20;
const SERVICE_POINTS: u32 = 10;
const CONFIG_POINTS: u32 = 5;

/// Namespace name fragments that suggest a metrics-backend deployment.
const NAMESPACE_NAME_HINT: &str = r"(?i)(metrics|monitoring|observability|prod)";

/// Labels that suggest a managed metrics-backend namespace.
const NAMESPACE_LABEL_KEYS: &[&str] = &["app.kubernetes.io/part-of", "monitoring"];

/// Composite score for one namespace.
#[derive(Debug, Clone)]
pub struct NamespaceScore {
    pub namespace: String,
    pub points: u32,
    pub matched_components: usize,
    pub matched_services: usize,
    pub matched_configs: usize,
}

/// Score all namespaces and pick the highest as the root.
///
/// A namespace whose sub-listing fails scores only on what was gathered;
/// the overall selection fails only if the namespace listing itself fails.
pub async fn discover_namespace(
    lister: &Arc<dyn ClusterLister>,
    matcher: &PatternMatcher,
) -> SourceOutcome<Option<NamespaceScore>> {
    let namespaces = match lister.list_resources(ResourceKind::Namespace, "", None).await {
        Ok(namespaces) => namespaces,
        Err(e) => return SourceOutcome::Failed(e.to_string()),
    };

    let name_hint = Regex::new(NAMESPACE_NAME_HINT).expect("static pattern");
    let mut scores: Vec<NamespaceScore> = Vec::new();
    let mut partial = Vec::new();

    for ns in &namespaces {
        let mut score = NamespaceScore {
            namespace: ns.name.clone(),
            points: 0,
            matched_components: 0,
            matched_services: 0,
            matched_configs: 0,
        };

        if name_hint.is_match(&ns.name) {
            score.points += NAME_PATTERN_POINTS;
        }
        if NAMESPACE_LABEL_KEYS.iter().any(|k| ns.labels.contains_key(*k)) {
            score.points += LABEL_POINTS;
        }

        for kind in [
            ResourceKind::Deployment,
            ResourceKind::StatefulSet,
            ResourceKind::DaemonSet,
        ] {
            match lister.list_resources(kind, &ns.name, None).await {
                Ok(workloads) => {
                    score.matched_components += workloads
                        .iter()
                        .filter(|w| matcher.best_match(&w.name, &w.labels).is_some())
                        .count();
                }
                Err(e) => {
                    warn!(namespace = %ns.name, kind = ?kind, error = %e, "Workload listing failed during namespace scoring");
                    partial.push(format!("{}/{kind:?}: {e}", ns.name));
                }
            }
        }

        match lister.list_resources(ResourceKind::Service, &ns.name, None).await {
            Ok(services) => {
                score.matched_services += services
                    .iter()
                    .filter(|s| matcher.best_match(&s.name, &s.labels).is_some())
                    .count();
            }
            Err(e) => partial.push(format!("{}/Service: {e}", ns.name)),
        }

        match lister.list_resources(ResourceKind::ConfigMap, &ns.name, None).await {
            Ok(configs) => {
                score.matched_configs += configs
                    .iter()
                    .filter(|c| {
                        let lower = c.name.to_ascii_lowercase();
                        ["metrics", "limits", "overrides", "runtime"]
                            .iter()
                            .any(|hint| lower.contains(hint))
                    })
                    .count();
            }
            Err(e) => partial.push(format!("{}/ConfigMap: {e}", ns.name)),
        }

        score.points += score.matched_components as u32 * COMPONENT_POINTS
            + score.matched_services as u32 * SERVICE_POINTS
            + score.matched_configs as u32 * CONFIG_POINTS;

        debug!(
            namespace = %score.namespace,
            points = score.points,
            components = score.matched_components,
            "Scored namespace"
        );
        scores.push(score);
    }

    // Highest points first; exact ties resolved alphabetically.
    scores.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.namespace.cmp(&b.namespace))
    });

    let selected = scores.into_iter().next().filter(|s| s.points > 0);

    if partial.is_empty() {
        SourceOutcome::Complete(selected)
    } else {
        SourceOutcome::Partial(selected, partial.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{async_trait, ResourceMetadata};
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
                _ => Ok(self
                    .workloads
                    .iter()
                    .filter(|w| w.namespace == namespace && w.kind == kind)
                    .cloned()
                    .collect()),
            }
        }

        async fn get_config_resource(&self, _name: &str, _namespace: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_namespace_with_matching_workload_wins() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![
                ResourceMetadata::new("payments-prod", "", ResourceKind::Namespace),
                ResourceMetadata::new("scratch", "", ResourceKind::Namespace),
            ],
            workloads: vec![ResourceMetadata::new(
                "payments-prod-ingester",
                "payments-prod",
                ResourceKind::Deployment,
            )
            .with_label("app.kubernetes.io/name", "ingester-workload")],
        });
        let matcher = PatternMatcher::with_defaults();

        let outcome = discover_namespace(&lister, &matcher).await;
        let SourceOutcome::Complete(Some(score)) = outcome else {
            panic!("expected a selected namespace");
        };

        assert_eq!(score.namespace, "payments-prod");
        assert_eq!(score.matched_components, 1);
        // Name hint (prod) plus one matched component.
        assert_eq!(score.points, NAME_PATTERN_POINTS + COMPONENT_POINTS);
    }

    #[tokio::test]
    async fn test_ties_break_alphabetically() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![
                ResourceMetadata::new("metrics-b", "", ResourceKind::Namespace),
                ResourceMetadata::new("metrics-a", "", ResourceKind::Namespace),
            ],
            workloads: vec![],
        });
        let matcher = PatternMatcher::with_defaults();

        let outcome = discover_namespace(&lister, &matcher).await;
        let SourceOutcome::Complete(Some(score)) = outcome else {
            panic!("expected a selected namespace");
        };
        assert_eq!(score.namespace, "metrics-a");
    }

    #[tokio::test]
    async fn test_no_signal_selects_nothing() {
        let lister: Arc<dyn ClusterLister> = Arc::new(MockLister {
            namespaces: vec![ResourceMetadata::new("scratch", "", ResourceKind::Namespace)],
            workloads: vec![],
        });
        let matcher = PatternMatcher::with_defaults();

        let outcome = discover_namespace(&lister, &matcher).await;
        let SourceOutcome::Complete(selected) = outcome else {
            panic!("expected complete outcome");
        };
        assert!(selected.is_none());
    }
}
