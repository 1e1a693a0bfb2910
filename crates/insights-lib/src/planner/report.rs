//! Capacity report assembly: projections, risk, and export formats.
//!
//! Projections are a simple linear extrapolation of current usage by
//! observed growth rates, not a statistical forecast model.

use crate::cluster::TimeRange;
use crate::planner::trend::{RejectionTrend, TrendAnalysis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory growth beyond this rate escalates risk to medium.
pub const MEMORY_GROWTH_RISK_THRESHOLD: f64 = 0.2;
/// Ingestion growth beyond this rate escalates risk to high.
pub const INGESTION_GROWTH_RISK_THRESHOLD: f64 = 0.5;

/// Medium-horizon ingestion above 1.5x current triggers compute scaling.
const INGESTION_SCALE_RATIO: f64 = 1.5;
/// Medium-horizon memory above 2x current triggers memory/storage scaling.
const MEMORY_SCALE_RATIO: f64 = 2.0;

const BASELINE_REPLICAS: u32 = 3;
const BASELINE_CPU_CORES: f64 = 2.0;
const BASELINE_MEMORY_GB: f64 = 8.0;
const BASELINE_STORAGE_GB: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    ShortHorizon,
    LongHorizon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    /// Growth multiplier applied per horizon. Weights increase with
    /// horizon length so farther projections extrapolate further.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Short => 0.25,
            Self::Medium => 1.0,
            Self::Long => 2.0,
        }
    }

    /// Nearer horizons carry higher confidence.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Short => 0.9,
            Self::Medium => 0.7,
            Self::Long => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// Latest observed value per tracked metric, read from the newest
/// point of each series rather than averaged over the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub ingestion_rate: f64,
    pub active_series: f64,
    pub memory_usage_bytes: f64,
    pub rejected_samples: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub horizon: Horizon,
    pub projected_ingestion_rate: f64,
    pub projected_active_series: f64,
    pub projected_memory_bytes: f64,
    pub confidence: f64,
}

impl Projection {
    fn extrapolate(horizon: Horizon, usage: &UsageMetrics, trend: &TrendAnalysis) -> Self {
        let scale = |current: f64, growth: f64| current * (1.0 + growth * horizon.weight());
        Self {
            horizon,
            projected_ingestion_rate: scale(usage.ingestion_rate, trend.ingestion_growth_rate),
            projected_active_series: scale(usage.active_series, trend.series_growth_rate),
            projected_memory_bytes: scale(usage.memory_usage_bytes, trend.memory_growth_rate),
            confidence: horizon.confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionData {
    pub short: Projection,
    pub medium: Projection,
    pub long: Projection,
}

impl ProjectionData {
    pub fn from_trend(usage: &UsageMetrics, trend: &TrendAnalysis) -> Self {
        Self {
            short: Projection::extrapolate(Horizon::Short, usage, trend),
            medium: Projection::extrapolate(Horizon::Medium, usage, trend),
            long: Projection::extrapolate(Horizon::Long, usage, trend),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Risk is monotonic within a single report: each threshold check can
/// only raise the level, never lower it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub mitigations: Vec<String>,
}

impl RiskAssessment {
    pub fn from_trend(trend: &TrendAnalysis) -> Self {
        let mut assessment = Self {
            level: RiskLevel::Low,
            factors: Vec::new(),
            mitigations: Vec::new(),
        };

        if trend.memory_growth_rate > MEMORY_GROWTH_RISK_THRESHOLD {
            assessment.escalate(
                RiskLevel::Medium,
                format!(
                    "memory usage grew {:.0}% over the window",
                    trend.memory_growth_rate * 100.0
                ),
                "review per-tenant series limits and increase ingester memory requests",
            );
        }
        if trend.ingestion_growth_rate > INGESTION_GROWTH_RISK_THRESHOLD {
            assessment.escalate(
                RiskLevel::High,
                format!(
                    "ingestion rate grew {:.0}% over the window",
                    trend.ingestion_growth_rate * 100.0
                ),
                "scale the write path horizontally before rate limits start rejecting samples",
            );
        }
        if trend.rejection_trend == RejectionTrend::Increasing {
            assessment.escalate(
                RiskLevel::High,
                "rejected-sample count is trending upward".to_string(),
                "raise the tenant ingestion-rate override or reduce client scrape cardinality",
            );
        }

        assessment
    }

    fn escalate(&mut self, level: RiskLevel, factor: String, mitigation: &str) {
        self.level = self.level.max(level);
        self.factors.push(factor);
        self.mitigations.push(mitigation.to_string());
    }
}

/// Baseline sizing guidance, scaled up when medium-horizon projections
/// outgrow current usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOptimization {
    pub recommended_replicas: u32,
    pub recommended_cpu_cores: f64,
    pub recommended_memory_gb: f64,
    pub recommended_storage_gb: f64,
    pub rationale: Vec<String>,
}

impl ResourceOptimization {
    pub fn from_projection(usage: &UsageMetrics, projections: &ProjectionData) -> Self {
        let mut optimization = Self {
            recommended_replicas: BASELINE_REPLICAS,
            recommended_cpu_cores: BASELINE_CPU_CORES,
            recommended_memory_gb: BASELINE_MEMORY_GB,
            recommended_storage_gb: BASELINE_STORAGE_GB,
            rationale: Vec::new(),
        };

        if usage.ingestion_rate > 0.0
            && projections.medium.projected_ingestion_rate > usage.ingestion_rate * INGESTION_SCALE_RATIO
        {
            optimization.recommended_replicas = BASELINE_REPLICAS * 2;
            optimization.recommended_cpu_cores = BASELINE_CPU_CORES * 2.0;
            optimization.rationale.push(
                "medium-horizon ingestion exceeds 1.5x current rate".to_string(),
            );
        }
        if usage.memory_usage_bytes > 0.0
            && projections.medium.projected_memory_bytes > usage.memory_usage_bytes * MEMORY_SCALE_RATIO
        {
            optimization.recommended_memory_gb = BASELINE_MEMORY_GB * 2.0;
            optimization.recommended_storage_gb = BASELINE_STORAGE_GB * 2.0;
            optimization.rationale.push(
                "medium-horizon memory usage exceeds 2x current usage".to_string(),
            );
        }

        optimization
    }
}

/// A complete capacity report for one tenant. Computed on demand and
/// never cached; the export methods below are pure transformations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityReport {
    pub tenant: String,
    pub kind: ReportKind,
    pub generated_at: DateTime<Utc>,
    pub window: TimeRange,
    pub usage: UsageMetrics,
    pub trend: TrendAnalysis,
    pub projections: ProjectionData,
    pub recommendations: Vec<String>,
    pub risk: RiskAssessment,
    pub optimization: ResourceOptimization,
}

impl CapacityReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text summary suitable for operator-facing output.
    pub fn to_text_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Capacity report for tenant '{}' ({})\n",
            self.tenant,
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));
        out.push_str(&format!(
            "  Current: {:.0} samples/s ingested, {:.0} active series, {:.1} GB memory\n",
            self.usage.ingestion_rate,
            self.usage.active_series,
            self.usage.memory_usage_bytes / 1e9,
        ));
        out.push_str(&format!(
            "  Trend: ingestion {:+.1}%, memory {:+.1}%, rejections {}\n",
            self.trend.ingestion_growth_rate * 100.0,
            self.trend.memory_growth_rate * 100.0,
            self.trend.rejection_trend.as_str(),
        ));
        for projection in [
            &self.projections.short,
            &self.projections.medium,
            &self.projections.long,
        ] {
            out.push_str(&format!(
                "  {} horizon: {:.0} samples/s, {:.1} GB memory (confidence {:.0}%)\n",
                projection.horizon.as_str(),
                projection.projected_ingestion_rate,
                projection.projected_memory_bytes / 1e9,
                projection.confidence * 100.0,
            ));
        }
        out.push_str(&format!("  Risk: {}\n", self.risk.level.as_str()));
        for factor in &self.risk.factors {
            out.push_str(&format!("    - {factor}\n"));
        }
        if !self.recommendations.is_empty() {
            out.push_str("  Recommendations:\n");
            for recommendation in &self.recommendations {
                out.push_str(&format!("    - {recommendation}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::trend::SeasonalPattern;

    fn usage() -> UsageMetrics {
        UsageMetrics {
            ingestion_rate: 1000.0,
            active_series: 50_000.0,
            memory_usage_bytes: 4e9,
            rejected_samples: 10.0,
        }
    }

    fn trend(ingestion: f64, memory: f64, rejection: f64) -> TrendAnalysis {
        TrendAnalysis {
            ingestion_growth_rate: ingestion,
            series_growth_rate: 0.0,
            memory_growth_rate: memory,
            rejection_growth_rate: rejection,
            rejection_trend: RejectionTrend::classify(rejection),
            seasonal: SeasonalPattern::business_hours(),
        }
    }

    #[test]
    fn test_projection_weights_increase_and_confidence_decreases() {
        let projections = ProjectionData::from_trend(&usage(), &trend(0.4, 0.0, 0.0));
        assert!(
            projections.short.projected_ingestion_rate
                < projections.medium.projected_ingestion_rate
        );
        assert!(
            projections.medium.projected_ingestion_rate
                < projections.long.projected_ingestion_rate
        );
        assert!(projections.short.confidence > projections.medium.confidence);
        assert!(projections.medium.confidence > projections.long.confidence);
    }

    #[test]
    fn test_flat_trend_projects_current_usage() {
        let projections = ProjectionData::from_trend(&usage(), &trend(0.0, 0.0, 0.0));
        assert_eq!(projections.long.projected_ingestion_rate, 1000.0);
        assert_eq!(projections.long.projected_memory_bytes, 4e9);
    }

    #[test]
    fn test_risk_starts_low() {
        let risk = RiskAssessment::from_trend(&trend(0.1, 0.05, 0.0));
        assert_eq!(risk.level, RiskLevel::Low);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn test_risk_medium_on_memory_growth() {
        let risk = RiskAssessment::from_trend(&trend(0.1, 0.3, 0.0));
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.factors.len(), 1);
        assert_eq!(risk.mitigations.len(), 1);
    }

    #[test]
    fn test_risk_never_deescalates() {
        // High ingestion growth plus medium memory growth: the later
        // memory check must not lower the level back down.
        let risk = RiskAssessment::from_trend(&trend(0.8, 0.3, 0.5));
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.factors.len(), 3);
    }

    #[test]
    fn test_optimization_scales_on_projected_ingestion() {
        let projections = ProjectionData::from_trend(&usage(), &trend(0.8, 0.0, 0.0));
        let optimization = ResourceOptimization::from_projection(&usage(), &projections);
        assert_eq!(optimization.recommended_replicas, 6);
        assert_eq!(optimization.recommended_memory_gb, 8.0);
    }

    #[test]
    fn test_optimization_baseline_when_flat() {
        let projections = ProjectionData::from_trend(&usage(), &trend(0.0, 0.0, 0.0));
        let optimization = ResourceOptimization::from_projection(&usage(), &projections);
        assert_eq!(optimization.recommended_replicas, 3);
        assert!(optimization.rationale.is_empty());
    }

    #[test]
    fn test_text_summary_mentions_tenant_and_risk() {
        let trend = trend(0.6, 0.1, 0.0);
        let projections = ProjectionData::from_trend(&usage(), &trend);
        let report = CapacityReport {
            tenant: "team-x".to_string(),
            kind: ReportKind::ShortHorizon,
            generated_at: Utc::now(),
            window: TimeRange::last_hours(24),
            usage: usage(),
            risk: RiskAssessment::from_trend(&trend),
            optimization: ResourceOptimization::from_projection(&usage(), &projections),
            recommendations: vec!["scale the write path".to_string()],
            trend,
            projections,
        };
        let summary = report.to_text_summary();
        assert!(summary.contains("team-x"));
        assert!(summary.contains("Risk: high"));
        assert!(summary.contains("scale the write path"));
    }
}
