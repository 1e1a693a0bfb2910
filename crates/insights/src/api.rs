//! HTTP API for health checks, Prometheus metrics, and topology data

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use insights_lib::{
    cache::{CacheManager, MemorySnapshot},
    cluster::TimeRange,
    health::{subsystems, HealthRegistry, SubsystemHealth, SubsystemStatus},
    models::CacheStatus,
    planner::{CapacityPlanner, ReportKind},
    InsightsError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub cache: Arc<CacheManager>,
    pub planner: Arc<CapacityPlanner>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        cache: Arc<CacheManager>,
        planner: Arc<CapacityPlanner>,
    ) -> Self {
        Self {
            health_registry,
            cache,
            planner,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: &InsightsError) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn map_error(error: InsightsError) -> axum::response::Response {
    match &error {
        InsightsError::QueryTimeout { .. } => error_response(StatusCode::GATEWAY_TIMEOUT, &error),
        InsightsError::TotalDiscoveryFailure(_) | InsightsError::PartialSourceFailure { .. } => {
            error_response(StatusCode::BAD_GATEWAY, &error)
        }
        InsightsError::AdmissionRejected { .. } => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, &error)
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        SubsystemStatus::Healthy => StatusCode::OK,
        SubsystemStatus::Degraded => StatusCode::OK, // Still operational
        SubsystemStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Combined discovery snapshot; serves cached data, refreshing stale caches
async fn discovery(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match state.cache.snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => map_error(e),
    }
}

/// Manual invalidation: rediscover both topologies regardless of TTL
async fn refresh(State(state): State<Arc<AppState>>) -> axum::response::Response {
    info!("Manual refresh requested");
    let components = state.cache.force_refresh_components().await;
    let tenants = state.cache.force_refresh_tenants().await;
    match (components, tenants) {
        (Ok(_), Ok(_)) => match state.cache.snapshot().await {
            Ok(snapshot) => Json(snapshot).into_response(),
            Err(e) => map_error(e),
        },
        (Err(e), _) | (_, Err(e)) => map_error(e),
    }
}

#[derive(Debug, Serialize)]
struct CacheResponse {
    components: CacheStatus,
    tenants: CacheStatus,
    memory: MemorySnapshot,
}

/// Cache and memory-budget status without triggering a refresh
async fn cache_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (components, tenants) = state.cache.status().await;

    state
        .health_registry
        .update(
            subsystems::COMPONENT_CACHE,
            SubsystemHealth::from_cache_status(&components),
        )
        .await;
    state
        .health_registry
        .update(
            subsystems::TENANT_CACHE,
            SubsystemHealth::from_cache_status(&tenants),
        )
        .await;

    Json(CacheResponse {
        components,
        tenants,
        memory: state.cache.memory().snapshot(),
    })
}

/// Longest report window accepted from a caller, in hours.
const MAX_WINDOW_HOURS: i64 = 24 * 90;

#[derive(Debug, Deserialize)]
struct CapacityParams {
    /// Report window in hours
    #[serde(default = "default_window_hours")]
    hours: i64,
    /// Report kind: short-horizon or long-horizon
    #[serde(default)]
    kind: Option<String>,
}

fn default_window_hours() -> i64 {
    insights_lib::planner::DEFAULT_WINDOW_HOURS
}

impl CapacityParams {
    fn report_kind(&self) -> ReportKind {
        match self.kind.as_deref() {
            Some("long-horizon") => ReportKind::LongHorizon,
            _ => ReportKind::ShortHorizon,
        }
    }

    /// Window with the hours parameter clamped to a sane positive range,
    /// so a hostile or typo'd value can never invert start and end.
    fn window(&self) -> TimeRange {
        TimeRange::last_hours(self.hours.clamp(1, MAX_WINDOW_HOURS))
    }
}

/// Full capacity report for one tenant
async fn capacity(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(params): Query<CapacityParams>,
) -> axum::response::Response {
    match state
        .planner
        .generate_report(&tenant, params.window(), params.report_kind())
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => map_error(e),
    }
}

/// Plain-text capacity summary for one tenant
async fn capacity_summary(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(params): Query<CapacityParams>,
) -> axum::response::Response {
    match state
        .planner
        .generate_report(&tenant, params.window(), params.report_kind())
        .await
    {
        Ok(report) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            report.to_text_summary(),
        )
            .into_response(),
        Err(e) => map_error(e),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/discovery", get(discovery))
        .route("/api/v1/discovery/refresh", post(refresh))
        .route("/api/v1/cache", get(cache_status))
        .route("/api/v1/capacity/:tenant", get(capacity))
        .route("/api/v1/capacity/:tenant/summary", get(capacity_summary))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
