//! Component discovery and cross-validation
//!
//! Lists candidate workloads, classifies them through the pattern
//! matcher, then cross-validates each candidate against independently
//! listed services and configuration resources in the same namespace.

use crate::cluster::{ClusterLister, ResourceKind, ResourceMetadata};
use crate::discovery::config_sources::FetchedConfig;
use crate::discovery::patterns::{
    PatternMatcher, CONFIG_REFERENCE_WEIGHT, SERVICE_CORRELATION_WEIGHT,
};
use crate::error::SourceOutcome;
use crate::models::{DiscoveredComponent, ValidationResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Candidates below this confidence are dropped from the result.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

const WORKLOAD_KINDS: &[ResourceKind] = &[
    ResourceKind::Deployment,
    ResourceKind::StatefulSet,
    ResourceKind::DaemonSet,
];

/// Derive a version from an image reference's tag, ignoring digests.
fn version_from_image(image: &str) -> Option<String> {
    let tag = image.rsplit_once(':').map(|(_, t)| t)?;
    if tag.contains('/') || tag == "latest" || tag.starts_with("sha256") {
        return None;
    }
    Some(tag.trim_start_matches('v').to_string())
}

/// Whether a service plausibly fronts a workload, by name correlation.
fn service_correlates(service: &str, workload: &str) -> bool {
    service == workload || service.contains(workload) || workload.contains(service)
}

/// Discover and rank backend components in a namespace.
///
/// Each workload kind is listed independently; a failed listing is folded
/// as an empty contribution so the cycle always completes. The result is
/// ordered by descending confidence.
pub async fn discover_components(
    lister: &Arc<dyn ClusterLister>,
    matcher: &PatternMatcher,
    namespace: &str,
    min_confidence: f64,
    configs: &[FetchedConfig],
) -> SourceOutcome<Vec<DiscoveredComponent>> {
    let mut failures = Vec::new();
    let mut workloads: Vec<ResourceMetadata> = Vec::new();

    for kind in WORKLOAD_KINDS {
        match lister.list_resources(*kind, namespace, None).await {
            Ok(mut listed) => workloads.append(&mut listed),
            Err(e) => {
                warn!(kind = ?kind, namespace = %namespace, error = %e, "Workload listing failed, contribution treated as empty");
                failures.push(format!("{kind:?}: {e}"));
            }
        }
    }

    let services = match lister
        .list_resources(ResourceKind::Service, namespace, None)
        .await
    {
        Ok(services) => services,
        Err(e) => {
            warn!(namespace = %namespace, error = %e, "Service listing failed, skipping service correlation");
            failures.push(format!("Service: {e}"));
            Vec::new()
        }
    };

    if workloads.is_empty() && failures.len() == WORKLOAD_KINDS.len() + 1 {
        return SourceOutcome::Failed(failures.join("; "));
    }

    let mut components = Vec::new();
    for workload in &workloads {
        let Some(matched) = matcher.best_match(&workload.name, &workload.labels) else {
            continue;
        };

        let mut validation = ValidationResult::new();
        for (tag, weight) in matched.evidence.iter().zip(evidence_weights(&matched.evidence)) {
            validation.add_evidence(tag.clone(), weight);
        }

        let mut endpoints = Vec::new();
        for service in &services {
            if service_correlates(&service.name, &workload.name) {
                validation.add_evidence(
                    format!("service-correlation:{}", service.name),
                    SERVICE_CORRELATION_WEIGHT,
                );
                if service.ports.is_empty() {
                    endpoints.push(service.name.clone());
                } else {
                    endpoints
                        .extend(service.ports.iter().map(|p| format!("{}:{p}", service.name)));
                }
            }
        }

        let mut config_refs = Vec::new();
        for config in configs {
            if config.raw.contains(&workload.name) {
                validation.add_evidence(
                    format!("configmap-reference:{}", config.source.name),
                    CONFIG_REFERENCE_WEIGHT,
                );
                config_refs.push(config.source.name.clone());
            }
        }

        if validation.confidence < min_confidence {
            debug!(
                name = %workload.name,
                confidence = validation.confidence,
                "Dropping candidate below confidence floor"
            );
            continue;
        }

        validation
            .diagnostics
            .insert("workload-kind".to_string(), format!("{:?}", workload.kind));

        let image = workload.image.clone().unwrap_or_default();
        components.push(DiscoveredComponent {
            name: workload.name.clone(),
            kind: matched.category,
            namespace: workload.namespace.clone(),
            replicas: workload.replicas.unwrap_or(0),
            labels: workload.labels.clone(),
            annotations: workload.annotations.clone(),
            version: version_from_image(&image),
            image,
            endpoints,
            config_sources: config_refs,
            validation,
        });
    }

    components.sort_by(|a, b| {
        b.validation
            .confidence
            .partial_cmp(&a.validation.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    if failures.is_empty() {
        SourceOutcome::Complete(components)
    } else {
        SourceOutcome::Partial(components, failures.join("; "))
    }
}

/// Weights for pattern-matcher evidence tags, mirrored from the matcher
/// so the validation result reproduces the classification score.
fn evidence_weights(evidence: &[String]) -> Vec<f64> {
    use crate::discovery::patterns::{LABEL_MATCH_WEIGHT, NAME_MATCH_WEIGHT};
    evidence
        .iter()
        .map(|tag| {
            if tag.starts_with("name-pattern") {
                NAME_MATCH_WEIGHT
            } else {
                LABEL_MATCH_WEIGHT
            }
        })
        .collect()
}
