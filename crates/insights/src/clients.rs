//! Concrete cluster and metrics-backend clients
//!
//! `KubeLister` reads workloads, services, config maps, and namespaces
//! through the Kubernetes API. `PromMetricsClient` issues range queries
//! against a Prometheus-compatible query endpoint, scoped per tenant
//! with the standard multiplexing header.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use insights_lib::cluster::{
    ClusterLister, MetricsClient, ResourceKind, ResourceMetadata, SamplePoint, TimeRange,
    TimeSeries,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams};
use kube::{Client, Config};
use serde::Deserialize;
use tracing::debug;

/// Query step for capacity windows; coarse enough to keep responses small.
const QUERY_STEP: &str = "5m";

pub struct KubeLister {
    client: Client,
}

impl KubeLister {
    /// Connect using in-cluster config or the local kubeconfig.
    pub async fn connect() -> Result<Self> {
        let config = Config::infer()
            .await
            .context("failed to infer Kubernetes client configuration")?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    fn params(label_selector: Option<&str>) -> ListParams {
        match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        }
    }

    fn base(meta: &ObjectMeta, kind: ResourceKind) -> ResourceMetadata {
        let mut resource = ResourceMetadata::new(
            meta.name.clone().unwrap_or_default(),
            meta.namespace.clone().unwrap_or_default(),
            kind,
        );
        if let Some(labels) = &meta.labels {
            resource.labels = labels.clone().into_iter().collect();
        }
        if let Some(annotations) = &meta.annotations {
            resource.annotations = annotations.clone().into_iter().collect();
        }
        resource
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        let api: Api<Deployment> = Self::scoped(self.client.clone(), namespace);
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|d| {
                let mut resource = Self::base(&d.metadata, ResourceKind::Deployment);
                resource.replicas = d.spec.as_ref().and_then(|s| s.replicas);
                resource.ready_replicas = d.status.as_ref().and_then(|s| s.ready_replicas);
                resource.image = d
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.spec.as_ref())
                    .and_then(|p| p.containers.first())
                    .and_then(|c| c.image.clone());
                resource
            })
            .collect())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        let api: Api<StatefulSet> = Self::scoped(self.client.clone(), namespace);
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|s| {
                let mut resource = Self::base(&s.metadata, ResourceKind::StatefulSet);
                resource.replicas = s.spec.as_ref().and_then(|spec| spec.replicas);
                resource.ready_replicas = s.status.as_ref().and_then(|st| st.ready_replicas);
                resource.image = s
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.template.spec.as_ref())
                    .and_then(|p| p.containers.first())
                    .and_then(|c| c.image.clone());
                resource
            })
            .collect())
    }

    async fn list_daemon_sets(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        let api: Api<DaemonSet> = Self::scoped(self.client.clone(), namespace);
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|d| {
                let mut resource = Self::base(&d.metadata, ResourceKind::DaemonSet);
                resource.replicas = d.status.as_ref().map(|s| s.desired_number_scheduled);
                resource.ready_replicas = d.status.as_ref().map(|s| s.number_ready);
                resource.image = d
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.template.spec.as_ref())
                    .and_then(|p| p.containers.first())
                    .and_then(|c| c.image.clone());
                resource
            })
            .collect())
    }

    async fn list_services(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        let api: Api<Service> = Self::scoped(self.client.clone(), namespace);
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|s| {
                let mut resource = Self::base(&s.metadata, ResourceKind::Service);
                resource.ports = s
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.ports.as_ref())
                    .map(|ports| {
                        ports
                            .iter()
                            .filter_map(|p| u16::try_from(p.port).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                resource
            })
            .collect())
    }

    async fn list_config_maps(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        let api: Api<ConfigMap> = Self::scoped(self.client.clone(), namespace);
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|c| Self::base(&c.metadata, ResourceKind::ConfigMap))
            .collect())
    }

    async fn list_namespaces(&self, selector: Option<&str>) -> Result<Vec<ResourceMetadata>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&Self::params(selector)).await?;
        Ok(list
            .items
            .iter()
            .map(|n| Self::base(&n.metadata, ResourceKind::Namespace))
            .collect())
    }

    fn scoped<K>(client: Client, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        if namespace.is_empty() {
            Api::all(client)
        } else {
            Api::namespaced(client, namespace)
        }
    }
}

#[async_trait]
impl ClusterLister for KubeLister {
    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<ResourceMetadata>> {
        match kind {
            ResourceKind::Deployment => self.list_deployments(namespace, label_selector).await,
            ResourceKind::StatefulSet => self.list_stateful_sets(namespace, label_selector).await,
            ResourceKind::DaemonSet => self.list_daemon_sets(namespace, label_selector).await,
            ResourceKind::Service => self.list_services(namespace, label_selector).await,
            ResourceKind::ConfigMap => self.list_config_maps(namespace, label_selector).await,
            ResourceKind::Namespace => self.list_namespaces(label_selector).await,
        }
    }

    async fn get_config_resource(&self, name: &str, namespace: &str) -> Result<Option<String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(config_map) => {
                // Concatenate all data entries; discovery only inspects content,
                // never individual keys.
                let content = config_map
                    .data
                    .map(|data| {
                        data.into_iter()
                            .map(|(key, value)| format!("{key}:\n{value}"))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                Ok(Some(content))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Prometheus-compatible range-query client, tenant-scoped via the
/// X-Scope-OrgID header.
pub struct PromMetricsClient {
    http: reqwest::Client,
    base_url: String,
}

impl PromMetricsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MetricsClient for PromMetricsClient {
    async fn query(&self, tenant: &str, metric: &str, range: TimeRange) -> Result<Vec<TimeSeries>> {
        let url = format!(
            "{}/api/v1/query_range?query={}&start={}&end={}&step={}",
            self.base_url,
            urlencoding::encode(metric),
            range.start.timestamp(),
            range.end.timestamp(),
            QUERY_STEP,
        );
        debug!(tenant = %tenant, metric = %metric, "Issuing range query");

        let response = self
            .http
            .get(&url)
            .header("X-Scope-OrgID", tenant)
            .send()
            .await
            .context("metrics query request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("metrics query returned HTTP {}", response.status()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .context("failed to parse metrics query response")?;
        if body.status != "success" {
            return Err(anyhow!(
                "metrics query failed: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        let series = body
            .data
            .map(|data| {
                data.result
                    .into_iter()
                    .map(|result| TimeSeries {
                        metric: metric.to_string(),
                        points: result
                            .values
                            .into_iter()
                            .filter_map(|(ts, value)| {
                                value.parse::<f64>().ok().filter(|v| v.is_finite()).map(
                                    |v| SamplePoint {
                                        timestamp: ts as i64,
                                        value: v,
                                    },
                                )
                            })
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(series)
    }
}
