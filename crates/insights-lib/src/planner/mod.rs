//! Trend-based capacity planning
//!
//! Reads tenant usage series from the metrics backend and produces
//! on-demand capacity reports: current usage, growth trends, linear
//! projections over three horizons, a risk assessment, and sizing
//! guidance. Reports are never cached; every call recomputes from the
//! latest available metrics.

pub mod report;
pub mod trend;

pub use report::{
    CapacityReport, Horizon, ProjectionData, ReportKind, ResourceOptimization, RiskAssessment,
    RiskLevel, UsageMetrics,
};
pub use trend::{RejectionTrend, SeasonalPattern, TrendAnalysis};

use crate::cluster::{metrics, MetricsClient, TimeRange, TimeSeries};
use crate::error::InsightsError;
use crate::observability::{InsightsMetrics, StructuredLogger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default report window when the caller does not supply one.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub query_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

pub struct CapacityPlanner {
    client: Arc<dyn MetricsClient>,
    config: PlannerConfig,
    metrics: InsightsMetrics,
    logger: StructuredLogger,
}

impl CapacityPlanner {
    pub fn new(client: Arc<dyn MetricsClient>, config: PlannerConfig, cluster_name: &str) -> Self {
        Self {
            client,
            config,
            metrics: InsightsMetrics::new(),
            logger: StructuredLogger::new(cluster_name),
        }
    }

    /// Generate a capacity report for one tenant over the given window.
    ///
    /// There is no cache to fall back on, so query timeouts are surfaced
    /// directly to the caller.
    pub async fn generate_report(
        &self,
        tenant: &str,
        window: TimeRange,
        kind: ReportKind,
    ) -> Result<CapacityReport, InsightsError> {
        let ingestion = self.query(tenant, metrics::INGESTION_RATE, window).await?;
        let series = self.query(tenant, metrics::ACTIVE_SERIES, window).await?;
        let memory = self.query(tenant, metrics::MEMORY_USAGE_BYTES, window).await?;
        let rejections = self.query(tenant, metrics::REJECTED_SAMPLES, window).await?;

        let usage = UsageMetrics {
            ingestion_rate: ingestion.latest().unwrap_or(0.0),
            active_series: series.latest().unwrap_or(0.0),
            memory_usage_bytes: memory.latest().unwrap_or(0.0),
            rejected_samples: rejections.latest().unwrap_or(0.0),
        };
        let trend = TrendAnalysis::from_series(&ingestion, &series, &memory, &rejections);
        let projections = ProjectionData::from_trend(&usage, &trend);
        let risk = RiskAssessment::from_trend(&trend);
        let optimization = ResourceOptimization::from_projection(&usage, &projections);
        let recommendations = Self::build_recommendations(&risk, &optimization);

        let report = CapacityReport {
            tenant: tenant.to_string(),
            kind,
            generated_at: Utc::now(),
            window,
            usage,
            trend,
            risk,
            optimization,
            recommendations,
            projections,
        };

        self.metrics.inc_capacity_reports();
        self.logger.log_capacity_report(
            tenant,
            report.risk.level.as_str(),
            report.trend.ingestion_growth_rate,
            report.projections.medium.projected_ingestion_rate,
        );
        Ok(report)
    }

    /// Issue one metric query under the configured deadline. A missing
    /// series is treated as empty, not as an error.
    async fn query(
        &self,
        tenant: &str,
        metric: &str,
        window: TimeRange,
    ) -> Result<TimeSeries, InsightsError> {
        let operation = format!("query:{metric}");
        let result = timeout(
            self.config.query_timeout,
            self.client.query(tenant, metric, window),
        )
        .await
        .map_err(|_| InsightsError::QueryTimeout {
            operation,
            timeout_secs: self.config.query_timeout.as_secs(),
        })?;

        match result {
            Ok(mut all) if !all.is_empty() => Ok(all.remove(0)),
            Ok(_) => Ok(TimeSeries {
                metric: metric.to_string(),
                points: Vec::new(),
            }),
            Err(e) => Err(InsightsError::PartialSourceFailure {
                source_name: format!("metrics:{metric}"),
                reason: e.to_string(),
            }),
        }
    }

    fn build_recommendations(
        risk: &RiskAssessment,
        optimization: &ResourceOptimization,
    ) -> Vec<String> {
        let mut recommendations: Vec<String> = risk.mitigations.clone();
        recommendations.extend(optimization.rationale.iter().map(|rationale| {
            format!(
                "scale to {} replicas / {:.0} cores / {:.0} GB memory ({rationale})",
                optimization.recommended_replicas,
                optimization.recommended_cpu_cores,
                optimization.recommended_memory_gb,
            )
        }));
        if recommendations.is_empty() {
            recommendations.push("current capacity is adequate for the projected window".to_string());
        }
        recommendations
    }
}
