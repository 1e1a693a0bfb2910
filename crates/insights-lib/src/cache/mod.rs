//! Dual-TTL topology caching
//!
//! Two independently TTL'd caches wrap the discovery engine: component
//! topology (structural, longer TTL) and tenant topology (volatile,
//! shorter TTL). Every refresh is admission-controlled by the memory
//! manager; a rejected value is still returned to the caller but not
//! stored, so repeated callers re-trigger discovery until pressure
//! subsides.

pub mod estimate;
pub mod eviction;
pub mod memory;

pub use estimate::estimate_size;
pub use eviction::EvictionPolicy;
pub use memory::{CacheCategory, MemoryConfig, MemoryManager, MemorySnapshot, TrackedItem};

use crate::discovery::DiscoveryEngine;
use crate::error::InsightsError;
use crate::models::{CacheStatus, ComponentTopology, DiscoverySnapshot, TenantTopology};
use crate::observability::InsightsMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Component topology changes rarely; ten minutes by default.
pub const DEFAULT_COMPONENT_TTL: Duration = Duration::from_secs(600);
/// Tenants can appear and disappear via pod-level headers; two minutes.
pub const DEFAULT_TENANT_TTL: Duration = Duration::from_secs(120);

/// TTLs for the two caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub component_ttl: Duration,
    pub tenant_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            component_ttl: DEFAULT_COMPONENT_TTL,
            tenant_ttl: DEFAULT_TENANT_TTL,
        }
    }
}

struct CacheEntry<T> {
    payload: Arc<T>,
    created_at: DateTime<Utc>,
}

struct Slot<T> {
    entry: Option<CacheEntry<T>>,
    /// Set when the most recent refresh attempt failed and the entry is
    /// being served past its TTL.
    last_refresh_failed: bool,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            entry: None,
            last_refresh_failed: false,
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<Arc<T>> {
        let entry = self.entry.as_ref()?;
        let age = (Utc::now() - entry.created_at).num_seconds();
        if age >= 0 && (age as u64) < ttl.as_secs() {
            Some(entry.payload.clone())
        } else {
            None
        }
    }
}

/// Owns both topology caches and coordinates refreshes with the memory
/// manager. The per-slot write lock makes the replace step atomic, so
/// concurrent cycles resolve last-writer-wins by completion order.
pub struct CacheManager {
    engine: Arc<DiscoveryEngine>,
    memory: Arc<MemoryManager>,
    config: CacheConfig,
    components: RwLock<Slot<ComponentTopology>>,
    tenants: RwLock<Slot<TenantTopology>>,
    metrics: InsightsMetrics,
}

impl CacheManager {
    pub fn new(engine: Arc<DiscoveryEngine>, memory: Arc<MemoryManager>, config: CacheConfig) -> Self {
        Self {
            engine,
            memory,
            config,
            components: RwLock::new(Slot::empty()),
            tenants: RwLock::new(Slot::empty()),
            metrics: InsightsMetrics::new(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Serve the component topology, refreshing when the entry is absent
    /// or past its TTL. A fresh entry is returned without any I/O.
    pub async fn get_components(&self) -> Result<Arc<ComponentTopology>, InsightsError> {
        if let Some(payload) = self.components.read().await.fresh(self.config.component_ttl) {
            self.metrics.inc_cache_hit(CacheCategory::ComponentTopology.as_str());
            return Ok(payload);
        }
        self.metrics.inc_cache_miss(CacheCategory::ComponentTopology.as_str());
        self.refresh_components(true).await
    }

    /// Serve the tenant topology, refreshing when absent or expired.
    pub async fn get_tenants(&self) -> Result<Arc<TenantTopology>, InsightsError> {
        if let Some(payload) = self.tenants.read().await.fresh(self.config.tenant_ttl) {
            self.metrics.inc_cache_hit(CacheCategory::TenantTopology.as_str());
            return Ok(payload);
        }
        self.metrics.inc_cache_miss(CacheCategory::TenantTopology.as_str());
        self.refresh_tenants(true).await
    }

    /// Unconditionally rediscover the component topology, bypassing TTL.
    /// A failed rediscovery is reported to the caller, never papered over
    /// with the cached entry.
    pub async fn force_refresh_components(&self) -> Result<Arc<ComponentTopology>, InsightsError> {
        self.refresh_components(false).await
    }

    /// Unconditionally rediscover the tenant topology, bypassing TTL.
    /// Failures propagate like [`Self::force_refresh_components`].
    pub async fn force_refresh_tenants(&self) -> Result<Arc<TenantTopology>, InsightsError> {
        self.refresh_tenants(false).await
    }

    /// Refresh both caches concurrently. The failure domains are
    /// independent: a single-source failure is logged and the other cache
    /// still updates; only both failing is an error.
    pub async fn refresh_all(&self) -> Result<(), InsightsError> {
        let (components, tenants) =
            tokio::join!(self.refresh_components(false), self.refresh_tenants(false));

        match (components, tenants) {
            (Ok(_), Ok(_)) => Ok(()),
            (Err(e), Ok(_)) => {
                warn!(error = %e, "Component refresh failed, tenant cache still updated");
                Ok(())
            }
            (Ok(_), Err(e)) => {
                warn!(error = %e, "Tenant refresh failed, component cache still updated");
                Ok(())
            }
            (Err(ce), Err(te)) => Err(InsightsError::TotalDiscoveryFailure(format!(
                "component refresh: {ce}; tenant refresh: {te}"
            ))),
        }
    }

    async fn refresh_components(
        &self,
        allow_stale: bool,
    ) -> Result<Arc<ComponentTopology>, InsightsError> {
        let result = self.engine.discover_component_topology().await;
        let mut slot = self.components.write().await;
        match result {
            Ok(topology) => {
                let payload = Arc::new(topology);
                slot.last_refresh_failed = false;
                self.store(
                    &mut slot,
                    payload.clone(),
                    CacheCategory::ComponentTopology,
                    self.config.component_ttl,
                );
                Ok(payload)
            }
            Err(e) => Self::on_refresh_failure(&mut slot, e, allow_stale, &self.metrics),
        }
    }

    async fn refresh_tenants(
        &self,
        allow_stale: bool,
    ) -> Result<Arc<TenantTopology>, InsightsError> {
        let result = self.engine.discover_tenant_topology().await;
        let mut slot = self.tenants.write().await;
        match result {
            Ok(topology) => {
                let payload = Arc::new(topology);
                slot.last_refresh_failed = false;
                self.store(
                    &mut slot,
                    payload.clone(),
                    CacheCategory::TenantTopology,
                    self.config.tenant_ttl,
                );
                Ok(payload)
            }
            Err(e) => Self::on_refresh_failure(&mut slot, e, allow_stale, &self.metrics),
        }
    }

    /// Replace the slot's entry under admission control. Rejection leaves
    /// the fresh value uncached; the caller still receives it.
    fn store<T: Serialize>(
        &self,
        slot: &mut Slot<T>,
        payload: Arc<T>,
        category: CacheCategory,
        ttl: Duration,
    ) {
        let bytes = estimate_size(payload.as_ref()) as u64;
        let now = Utc::now();

        // Release-then-admit so a replacement is never double-counted.
        if slot.entry.take().is_some() {
            self.memory.release(category.as_str());
        }

        match self.memory.admit(TrackedItem {
            id: category.as_str().to_string(),
            category,
            bytes,
            inserted_at: now,
            expires_at: now + chrono::Duration::seconds(ttl.as_secs() as i64),
        }) {
            Ok(()) => {
                slot.entry = Some(CacheEntry { payload, created_at: now });
            }
            Err(e) => {
                self.metrics.inc_admission_rejections(category.as_str());
                warn!(
                    category = category.as_str(),
                    bytes,
                    error = %e,
                    "Fresh value rejected by admission control, serving uncached"
                );
            }
        }
    }

    /// On a TTL-driven refresh failure, serve the previous value when one
    /// exists; forced refreshes never fall back, and neither does a cache
    /// that has never been populated.
    fn on_refresh_failure<T>(
        slot: &mut Slot<T>,
        error: InsightsError,
        allow_stale: bool,
        metrics: &InsightsMetrics,
    ) -> Result<Arc<T>, InsightsError> {
        metrics.inc_refresh_errors();
        slot.last_refresh_failed = true;
        match &slot.entry {
            Some(entry) if allow_stale && error.is_recoverable_with_stale() => {
                warn!(error = %error, "Refresh failed, serving stale cached value");
                Ok(entry.payload.clone())
            }
            _ => Err(error),
        }
    }

    /// Drop cache entries evicted by a memory-manager cycle. The budget
    /// accounting was already adjusted when the ids were chosen.
    pub async fn drop_evicted(&self, ids: &[String]) {
        for id in ids {
            if id == CacheCategory::ComponentTopology.as_str() {
                self.components.write().await.entry = None;
                info!("Component topology cache entry dropped by eviction");
            } else if id == CacheCategory::TenantTopology.as_str() {
                self.tenants.write().await.entry = None;
                info!("Tenant topology cache entry dropped by eviction");
            }
        }
    }

    /// Combined snapshot for API consumers; refreshes whatever is stale.
    pub async fn snapshot(&self) -> Result<DiscoverySnapshot, InsightsError> {
        let components = self.get_components().await?;
        let tenants = self.get_tenants().await?;
        Ok(DiscoverySnapshot {
            namespace_root: components.namespace_root.clone(),
            components: components.components.clone(),
            tenants: tenants.tenants.clone(),
            config_sources: components.config_sources.clone(),
            last_updated: components.discovered_at.max(tenants.discovered_at),
        })
    }

    /// Per-cache status without triggering any refresh.
    pub async fn status(&self) -> (CacheStatus, CacheStatus) {
        let components = self.components.read().await;
        let tenants = self.tenants.read().await;
        (
            Self::slot_status(
                &components,
                self.config.component_ttl,
                components.entry.as_ref().map(|e| e.payload.components.len()),
            ),
            Self::slot_status(
                &tenants,
                self.config.tenant_ttl,
                tenants.entry.as_ref().map(|e| e.payload.tenants.len()),
            ),
        )
    }

    fn slot_status<T>(slot: &Slot<T>, ttl: Duration, item_count: Option<usize>) -> CacheStatus {
        let (last_updated, age_secs) = match &slot.entry {
            Some(entry) => (
                Some(entry.created_at),
                Some((Utc::now() - entry.created_at).num_seconds()),
            ),
            None => (None, None),
        };
        let expired = age_secs.map(|a| a as u64 >= ttl.as_secs()).unwrap_or(false);
        CacheStatus {
            populated: slot.entry.is_some(),
            last_updated,
            ttl_secs: ttl.as_secs(),
            age_secs,
            item_count: item_count.unwrap_or(0),
            stale: expired && slot.last_refresh_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{async_trait, ClusterLister, ResourceKind, ResourceMetadata};
    use crate::discovery::{DiscoveryConfig, DiscoveryEngine};
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts listing calls and can be switched into a failing mode.
    struct CountingLister {
        list_calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl CountingLister {
        fn new() -> Self {
            Self {
                list_calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ClusterLister for CountingLister {
        async fn list_resources(
            &self,
            kind: ResourceKind,
            _namespace: &str,
            _label_selector: Option<&str>,
        ) -> Result<Vec<ResourceMetadata>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                bail!("api unavailable");
            }
            match kind {
                ResourceKind::Namespace => Ok(vec![ResourceMetadata::new(
                    "metrics-prod",
                    "",
                    ResourceKind::Namespace,
                )
                .with_label("tenant", "team-x")]),
                ResourceKind::Deployment => Ok(vec![ResourceMetadata::new(
                    "metrics-ingester",
                    "metrics-prod",
                    ResourceKind::Deployment,
                )
                .with_replicas(3, 3)]),
                _ => Ok(vec![]),
            }
        }

        async fn get_config_resource(&self, _name: &str, _namespace: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn build_cache(
        lister: Arc<CountingLister>,
        cache_config: CacheConfig,
        memory_config: MemoryConfig,
    ) -> CacheManager {
        let engine = Arc::new(DiscoveryEngine::new(
            lister,
            None,
            DiscoveryConfig::default(),
        ));
        let memory = Arc::new(MemoryManager::new(memory_config));
        CacheManager::new(engine, memory, cache_config)
    }

    fn roomy_memory() -> MemoryConfig {
        MemoryConfig {
            max_bytes: Some(100 * 1024 * 1024),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_within_ttl_performs_no_discovery_calls() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister.clone(), CacheConfig::default(), roomy_memory());

        let first = cache.get_components().await.unwrap();
        let calls_after_first = lister.list_calls.load(Ordering::SeqCst);

        let second = cache.get_components().await.unwrap();
        let calls_after_second = lister.list_calls.load(Ordering::SeqCst);

        assert_eq!(calls_after_first, calls_after_second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_refresh() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(
            lister.clone(),
            CacheConfig {
                component_ttl: Duration::from_secs(0),
                tenant_ttl: Duration::from_secs(0),
            },
            roomy_memory(),
        );

        cache.get_components().await.unwrap();
        let calls_after_first = lister.list_calls.load(Ordering::SeqCst);
        cache.get_components().await.unwrap();
        assert!(lister.list_calls.load(Ordering::SeqCst) > calls_after_first);
    }

    #[tokio::test]
    async fn test_first_population_failure_propagates() {
        let lister = Arc::new(CountingLister::new());
        lister.failing.store(true, Ordering::SeqCst);
        let cache = build_cache(lister, CacheConfig::default(), roomy_memory());

        let err = cache.get_components().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));
    }

    #[tokio::test]
    async fn test_stale_value_served_after_later_failure() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(
            lister.clone(),
            CacheConfig {
                component_ttl: Duration::from_secs(0),
                tenant_ttl: Duration::from_secs(0),
            },
            roomy_memory(),
        );

        let first = cache.get_components().await.unwrap();
        lister.failing.store(true, Ordering::SeqCst);

        let served = cache.get_components().await.unwrap();
        assert_eq!(served.namespace_root, first.namespace_root);

        let (component_status, _) = cache.status().await;
        assert!(component_status.populated);
        assert!(component_status.stale);
    }

    #[tokio::test]
    async fn test_admission_rejection_returns_value_uncached() {
        let lister = Arc::new(CountingLister::new());
        // A budget too small for any topology.
        let cache = build_cache(
            lister.clone(),
            CacheConfig::default(),
            MemoryConfig {
                max_bytes: Some(8),
                ..Default::default()
            },
        );

        let value = cache.get_components().await.unwrap();
        assert_eq!(value.namespace_root, "metrics-prod");

        let (component_status, _) = cache.status().await;
        assert!(!component_status.populated);

        // Next call re-triggers discovery because nothing was stored.
        let calls_before = lister.list_calls.load(Ordering::SeqCst);
        cache.get_components().await.unwrap();
        assert!(lister.list_calls.load(Ordering::SeqCst) > calls_before);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_ttl() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister.clone(), CacheConfig::default(), roomy_memory());

        cache.get_components().await.unwrap();
        let calls_before = lister.list_calls.load(Ordering::SeqCst);
        cache.force_refresh_components().await.unwrap();
        assert!(lister.list_calls.load(Ordering::SeqCst) > calls_before);
    }

    #[tokio::test]
    async fn test_force_refresh_failure_propagates_despite_cached_entry() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister.clone(), CacheConfig::default(), roomy_memory());

        let first = cache.get_components().await.unwrap();
        lister.failing.store(true, Ordering::SeqCst);

        // Manual invalidation reports the failure instead of answering
        // with the cached value.
        let err = cache.force_refresh_components().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));

        // Reads keep serving the cached entry.
        let served = cache.get_components().await.unwrap();
        assert_eq!(served.namespace_root, first.namespace_root);
    }

    #[tokio::test]
    async fn test_refresh_all_reports_error_only_when_both_fail() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister.clone(), CacheConfig::default(), roomy_memory());

        assert!(cache.refresh_all().await.is_ok());

        lister.failing.store(true, Ordering::SeqCst);
        let err = cache.refresh_all().await.unwrap_err();
        assert!(matches!(err, InsightsError::TotalDiscoveryFailure(_)));
    }

    #[tokio::test]
    async fn test_drop_evicted_clears_entry_and_status() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister, CacheConfig::default(), roomy_memory());

        cache.get_components().await.unwrap();
        let (status, _) = cache.status().await;
        assert!(status.populated);

        cache
            .drop_evicted(&["component-topology".to_string()])
            .await;
        let (status, _) = cache.status().await;
        assert!(!status.populated);
    }

    #[tokio::test]
    async fn test_snapshot_combines_both_topologies() {
        let lister = Arc::new(CountingLister::new());
        let cache = build_cache(lister, CacheConfig::default(), roomy_memory());

        let snapshot = cache.snapshot().await.unwrap();
        assert_eq!(snapshot.namespace_root, "metrics-prod");
        assert_eq!(snapshot.components.len(), 1);
        assert_eq!(snapshot.tenants.len(), 1);
        assert_eq!(snapshot.tenants[0].name, "team-x");
    }
}
