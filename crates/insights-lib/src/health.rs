//! Health check infrastructure for the insights service
//!
//! Tracks subsystem health for Kubernetes liveness and readiness
//! probes, and maps cache staleness into probe status so consumers can
//! distinguish fresh data, stale-but-available data, and no data yet.

use crate::models::CacheStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemStatus {
    /// Subsystem is functioning normally
    Healthy,
    /// Subsystem is serving degraded results (stale data, partial sources)
    Degraded,
    /// Subsystem has failed
    Unhealthy,
}

impl SubsystemStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, SubsystemStatus::Healthy | SubsystemStatus::Degraded)
    }
}

/// Information about a subsystem's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemHealth {
    pub status: SubsystemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl SubsystemHealth {
    pub fn healthy() -> Self {
        Self {
            status: SubsystemStatus::Healthy,
            message: None,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: SubsystemStatus::Degraded,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: SubsystemStatus::Unhealthy,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Map a cache's serve state onto probe status: fresh data is
    /// healthy, stale-but-available is degraded, and an unpopulated
    /// cache is degraded rather than unhealthy since the next refresh
    /// can still populate it.
    pub fn from_cache_status(status: &CacheStatus) -> Self {
        if !status.populated {
            Self::degraded("no data cached yet")
        } else if status.stale {
            Self::degraded(format!(
                "serving stale data, age {}s exceeds ttl {}s",
                status.age_secs.unwrap_or(0),
                status.ttl_secs
            ))
        } else {
            Self::healthy()
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: SubsystemStatus,
    pub subsystems: HashMap<String, SubsystemHealth>,
}

impl HealthResponse {
    /// Compute overall status from subsystem statuses
    pub fn compute_status(subsystems: &HashMap<String, SubsystemHealth>) -> SubsystemStatus {
        let mut has_degraded = false;

        for health in subsystems.values() {
            match health.status {
                SubsystemStatus::Unhealthy => return SubsystemStatus::Unhealthy,
                SubsystemStatus::Degraded => has_degraded = true,
                SubsystemStatus::Healthy => {}
            }
        }

        if has_degraded {
            SubsystemStatus::Degraded
        } else {
            SubsystemStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Subsystem names for health tracking
pub mod subsystems {
    pub const DISCOVERY: &str = "discovery";
    pub const COMPONENT_CACHE: &str = "component_cache";
    pub const TENANT_CACHE: &str = "tenant_cache";
    pub const MEMORY_BUDGET: &str = "memory_budget";
    pub const PLANNER: &str = "planner";
}

/// Health registry for tracking subsystem health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    subsystems: Arc<RwLock<HashMap<String, SubsystemHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            subsystems: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a subsystem with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut subsystems = self.subsystems.write().await;
        subsystems.insert(name.to_string(), SubsystemHealth::healthy());
    }

    /// Update subsystem health status
    pub async fn update(&self, name: &str, health: SubsystemHealth) {
        let mut subsystems = self.subsystems.write().await;
        subsystems.insert(name.to_string(), health);
    }

    /// Mark subsystem as healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, SubsystemHealth::healthy()).await;
    }

    /// Mark subsystem as degraded
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, SubsystemHealth::degraded(message)).await;
    }

    /// Mark subsystem as unhealthy
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, SubsystemHealth::unhealthy(message)).await;
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let subsystems = self.subsystems.read().await.clone();
        let status = HealthResponse::compute_status(&subsystems);
        HealthResponse { status, subsystems }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("First discovery cycle has not completed".to_string()),
            }
        } else if !health.status.is_operational() {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical subsystem unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
