//! External collaborator interfaces
//!
//! The cluster resource lister and the metrics query client are consumed
//! at this boundary only; their implementations live with the deployment.
//! "Not found" from either collaborator is a non-fatal empty result.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use async_trait::async_trait;

/// Deadline applied to a single cluster API call.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Resource kinds the discovery engine lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    ConfigMap,
    Namespace,
}

/// Metadata of one listed cluster resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub name: String,
    pub namespace: String,
    pub kind: ResourceKind,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Desired replicas for workload kinds.
    pub replicas: Option<i32>,
    /// Ready replicas for workload kinds; non-zero signals live usage.
    pub ready_replicas: Option<i32>,
    pub image: Option<String>,
    /// Exposed ports for services.
    pub ports: Vec<u16>,
}

impl ResourceMetadata {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            replicas: None,
            ready_replicas: None,
            image: None,
            ports: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_replicas(mut self, desired: i32, ready: i32) -> Self {
        self.replicas = Some(desired);
        self.ready_replicas = Some(ready);
        self
    }
}

/// Read-only view of cluster resources.
///
/// An empty namespace lists across all namespaces. Implementations must
/// map "not found" to an empty result rather than an error.
#[async_trait]
pub trait ClusterLister: Send + Sync {
    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>>;

    /// Fetch the raw content of a configuration resource. `Ok(None)` when
    /// the resource does not exist.
    async fn get_config_resource(&self, name: &str, namespace: &str) -> Result<Option<String>>;
}

/// Wraps a lister so every call carries a deadline. A hung cluster API
/// then surfaces as an ordinary source failure instead of stalling the
/// discovery cycle and everyone waiting on it.
pub struct TimedLister {
    inner: Arc<dyn ClusterLister>,
    timeout: Duration,
}

impl TimedLister {
    pub fn new(inner: Arc<dyn ClusterLister>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ClusterLister for TimedLister {
    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        tokio::time::timeout(
            self.timeout,
            self.inner.list_resources(kind, namespace, label_selector),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "listing {kind:?} in '{namespace}' timed out after {}s",
                self.timeout.as_secs()
            )
        })?
    }

    async fn get_config_resource(&self, name: &str, namespace: &str) -> Result<Option<String>> {
        tokio::time::timeout(self.timeout, self.inner.get_config_resource(name, namespace))
            .await
            .map_err(|_| {
                anyhow!(
                    "fetching config '{namespace}/{name}' timed out after {}s",
                    self.timeout.as_secs()
                )
            })?
    }
}

/// One timestamped sample of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub timestamp: i64,
    pub value: f64,
}

/// An ordered metric series for one tenant, restartable by re-issuing the
/// same query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub metric: String,
    pub points: Vec<SamplePoint>,
}

impl TimeSeries {
    pub fn latest(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn first(&self) -> Option<f64> {
        self.points.first().map(|p| p.value)
    }
}

/// Query window for metric series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::hours(hours),
            end,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Read-only view of the metrics backend's own usage series.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Query one metric for one tenant over a range. Implementations must
    /// honor tokio cancellation promptly.
    async fn query(&self, tenant: &str, metric: &str, range: TimeRange) -> Result<Vec<TimeSeries>>;
}

/// Metric names queried from the backend.
pub mod metrics {
    pub const INGESTION_RATE: &str = "ingestion_rate";
    pub const ACTIVE_SERIES: &str = "active_series";
    pub const MEMORY_USAGE_BYTES: &str = "memory_usage_bytes";
    pub const REJECTED_SAMPLES: &str = "rejected_samples";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series_first_and_latest() {
        let series = TimeSeries {
            metric: metrics::INGESTION_RATE.to_string(),
            points: vec![
                SamplePoint { timestamp: 1, value: 100.0 },
                SamplePoint { timestamp: 2, value: 150.0 },
            ],
        };
        assert_eq!(series.first(), Some(100.0));
        assert_eq!(series.latest(), Some(150.0));

        let empty = TimeSeries { metric: "x".into(), points: vec![] };
        assert_eq!(empty.latest(), None);
    }

    #[test]
    fn test_time_range_duration() {
        let range = TimeRange::last_hours(24);
        assert_eq!(range.duration_secs(), 24 * 3600);
    }
}
