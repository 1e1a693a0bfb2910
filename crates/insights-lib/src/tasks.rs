//! Background task loops
//!
//! Two independently scheduled periodic tasks run alongside on-demand
//! API calls: a collection task that refreshes both topology caches,
//! and a memory monitor that checks budget pressure and drives
//! evictions. Both stop cleanly on the shared shutdown signal and
//! never take the process down on a failed cycle.

use crate::cache::CacheManager;
use crate::health::{subsystems, HealthRegistry};
use crate::observability::StructuredLogger;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Default interval between full collection cycles
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between memory-pressure checks
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub collection_interval: Duration,
    pub monitor_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

/// Periodically refreshes both topology caches and keeps the discovery
/// subsystem's health and the service's readiness in step with the
/// outcome of each cycle.
pub struct CollectionTask {
    cache: Arc<CacheManager>,
    health: HealthRegistry,
    interval: Duration,
    logger: StructuredLogger,
}

impl CollectionTask {
    pub fn new(
        cache: Arc<CacheManager>,
        health: HealthRegistry,
        interval: Duration,
        cluster_name: &str,
    ) -> Self {
        Self {
            cache,
            health,
            interval,
            logger: StructuredLogger::new(cluster_name),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = interval(self.interval);
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    match self.cache.refresh_all().await {
                        Ok(()) => {
                            cycle_count += 1;
                            self.health.set_healthy(subsystems::DISCOVERY).await;
                            self.health.set_ready(true).await;
                            if let (Ok(components), Ok(tenants)) =
                                (self.cache.get_components().await, self.cache.get_tenants().await)
                            {
                                self.logger.log_discovery_cycle(
                                    &components.namespace_root,
                                    components.components.len(),
                                    tenants.tenants.len(),
                                    components.partial_failures.len(),
                                );
                            }
                            debug!(
                                cycle = cycle_count,
                                elapsed_ms = start.elapsed().as_millis(),
                                "Collection cycle complete"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "Collection cycle failed, will retry on next tick");
                            self.health.set_degraded(subsystems::DISCOVERY, e.to_string()).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down collection task");
                    break;
                }
            }
        }
    }
}

/// Periodically checks memory pressure and applies evictions chosen by
/// the budget's policy, dropping the matching cache entries.
pub struct MemoryMonitorTask {
    cache: Arc<CacheManager>,
    interval: Duration,
    logger: StructuredLogger,
}

impl MemoryMonitorTask {
    pub fn new(cache: Arc<CacheManager>, interval: Duration, cluster_name: &str) -> Self {
        Self {
            cache,
            interval,
            logger: StructuredLogger::new(cluster_name),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.cache.memory().monitor_tick();
                    if !evicted.is_empty() {
                        let snapshot = self.cache.memory().snapshot();
                        self.logger.log_eviction_round(
                            evicted.len(),
                            snapshot.current_bytes,
                            snapshot.max_bytes,
                        );
                        self.cache.drop_evicted(&evicted).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down memory monitor task");
                    break;
                }
            }
        }
    }
}
