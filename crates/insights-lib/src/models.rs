//! Core data models for topology discovery and caching

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Backend component roles the discovery engine can infer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    IngressRouter,
    WritePath,
    StorageQuery,
    Compactor,
    RulesEngine,
    AlertRouter,
    ObjectGateway,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::IngressRouter => "ingress-router",
            ComponentKind::WritePath => "write-path",
            ComponentKind::StorageQuery => "storage-query",
            ComponentKind::Compactor => "compactor",
            ComponentKind::RulesEngine => "rules-engine",
            ComponentKind::AlertRouter => "alert-router",
            ComponentKind::ObjectGateway => "object-gateway",
        }
    }

}

/// Confidence evidence attached to a discovered component.
///
/// Confidence is the sum of weighted evidence contributions, capped at 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub confidence: f64,
    /// Evidence tags such as "name-pattern", "label-selector",
    /// "service-correlation", "configmap-reference".
    pub matched_by: Vec<String>,
    pub diagnostics: HashMap<String, String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            confidence: 0.0,
            matched_by: Vec::new(),
            diagnostics: HashMap::new(),
        }
    }

    /// Add one weighted evidence contribution. Capped at 1.0, so adding
    /// evidence never decreases confidence.
    pub fn add_evidence(&mut self, tag: impl Into<String>, weight: f64) {
        self.matched_by.push(tag.into());
        self.confidence = (self.confidence + weight).min(1.0);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// A backend component identified during a discovery cycle.
///
/// Immutable once produced; superseded wholesale by the next successful
/// cycle, never merged in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredComponent {
    pub name: String,
    pub kind: ComponentKind,
    pub namespace: String,
    pub replicas: i32,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub image: String,
    /// Version derived from the image tag, when present.
    pub version: Option<String>,
    /// Network endpoints of correlated services, "name:port".
    pub endpoints: Vec<String>,
    /// Names of configuration resources that reference this component.
    pub config_sources: Vec<String>,
    pub validation: ValidationResult,
}

/// Where a tenant candidate was first inferred from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TenantSource {
    /// Multiplexing identifier found in sidecar/agent configuration.
    HeaderDerived,
    /// Namespace label matching the configured tenant-label key.
    LabelDerived,
    /// Namespace naming convention or tenant-specific override config.
    ConfigDerived,
}

/// A tenant inferred from cluster signals.
///
/// Deduplicated by name during consolidation; the first discovered source
/// wins, evidence from later sources is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCandidate {
    pub name: String,
    pub source: TenantSource,
    pub namespace: String,
    /// True if a workload in the tenant's namespace shows non-zero
    /// utilization signals, as opposed to a purely structural match.
    pub has_real_data: bool,
    pub evidence: Vec<String>,
}

/// Classification of a matched configuration resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigKind {
    GlobalConfig,
    OverrideConfig,
    TenantSpecificConfig,
}

/// A parsed configuration resource. Never mutated, only replaced on
/// rediscovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub name: String,
    pub namespace: String,
    pub kind: ConfigKind,
    /// Parsed key/value limit map. Ordered for stable round-trips.
    pub limits: BTreeMap<String, String>,
    /// sha256 checksum of the raw content, hex-encoded.
    pub checksum: String,
}

/// Component-side topology produced by one discovery cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentTopology {
    pub namespace_root: String,
    pub components: Vec<DiscoveredComponent>,
    pub config_sources: Vec<ConfigSource>,
    pub discovered_at: DateTime<Utc>,
    /// Reasons for sub-sources that failed during the cycle.
    pub partial_failures: Vec<String>,
}

/// Tenant-side topology produced by one discovery cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantTopology {
    pub tenants: Vec<TenantCandidate>,
    pub discovered_at: DateTime<Utc>,
    pub partial_failures: Vec<String>,
}

/// Combined discovery snapshot exposed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub namespace_root: String,
    pub components: Vec<DiscoveredComponent>,
    pub tenants: Vec<TenantCandidate>,
    pub config_sources: Vec<ConfigSource>,
    pub last_updated: DateTime<Utc>,
}

/// Per-cache status exposed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub populated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub ttl_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,
    pub item_count: usize,
    /// True when the entry is older than its TTL but was kept because the
    /// last refresh failed.
    pub stale: bool,
}
