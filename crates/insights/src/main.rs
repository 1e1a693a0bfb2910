//! Metrics Insights - topology discovery and capacity planning service
//!
//! Discovers the components and tenants of a multi-tenant metrics
//! backend running in the cluster, caches the topology under a bounded
//! memory budget, and serves capacity projections per tenant.

use anyhow::Result;
use insights_lib::{
    cache::{CacheConfig, CacheManager, EvictionPolicy, MemoryConfig, MemoryManager},
    discovery::{DiscoveryConfig, DiscoveryEngine},
    health::{subsystems, HealthRegistry},
    observability::StructuredLogger,
    planner::{CapacityPlanner, PlannerConfig},
    tasks::{CollectionTask, MemoryMonitorTask},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod clients;
mod config;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metrics-insights");

    let config = config::InsightsConfig::load()?;
    info!(cluster = %config.cluster_name, "Service configured");

    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(SERVICE_VERSION);

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(subsystems::DISCOVERY).await;
    health_registry.register(subsystems::COMPONENT_CACHE).await;
    health_registry.register(subsystems::TENANT_CACHE).await;
    health_registry.register(subsystems::MEMORY_BUDGET).await;
    health_registry.register(subsystems::PLANNER).await;

    // Cluster and metrics-backend collaborators
    let lister = Arc::new(clients::KubeLister::connect().await?);
    let metrics_client = Arc::new(clients::PromMetricsClient::new(&config.metrics_endpoint));

    // Discovery engine
    let engine = Arc::new(DiscoveryEngine::new(
        lister,
        Some(metrics_client.clone()),
        DiscoveryConfig {
            min_confidence: config.min_confidence,
            tenant_label_key: config.tenant_label_key.clone(),
            namespace_override: config.namespace_override.clone(),
            ..Default::default()
        },
    ));

    // Memory-budgeted topology caches
    let policy = config
        .eviction_policy
        .parse::<EvictionPolicy>()
        .unwrap_or_else(|_| {
            warn!(policy = %config.eviction_policy, "Unknown eviction policy, using hybrid");
            EvictionPolicy::Hybrid
        });
    let memory = Arc::new(MemoryManager::new(MemoryConfig {
        max_bytes: config.max_cache_bytes,
        policy,
        ..Default::default()
    }));
    let cache = Arc::new(CacheManager::new(
        engine,
        memory,
        CacheConfig {
            component_ttl: Duration::from_secs(config.component_ttl_secs),
            tenant_ttl: Duration::from_secs(config.tenant_ttl_secs),
        },
    ));

    // Capacity planner reads usage series directly, independent of the cache
    let planner = Arc::new(CapacityPlanner::new(
        metrics_client,
        PlannerConfig {
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        },
        &config.cluster_name,
    ));

    // First population; a failure here is logged and the collection task
    // flips readiness on its first successful cycle instead.
    match cache.refresh_all().await {
        Ok(()) => {
            health_registry.set_ready(true).await;
        }
        Err(e) => {
            warn!(error = %e, "Initial discovery failed, readiness deferred to background refresh");
            health_registry
                .set_degraded(subsystems::DISCOVERY, e.to_string())
                .await;
            health_registry.set_ready(false).await;
        }
    }

    // Background tasks with a shared shutdown signal
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let collection = CollectionTask::new(
        cache.clone(),
        health_registry.clone(),
        Duration::from_secs(config.collection_interval_secs),
        &config.cluster_name,
    );
    let monitor = MemoryMonitorTask::new(
        cache.clone(),
        Duration::from_secs(config.monitor_interval_secs),
        &config.cluster_name,
    );
    tokio::spawn(collection.run(shutdown_tx.subscribe()));
    tokio::spawn(monitor.run(shutdown_tx.subscribe()));

    // API server
    let app_state = Arc::new(api::AppState::new(health_registry, cache, planner));
    tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    info!("Shutting down");

    Ok(())
}
