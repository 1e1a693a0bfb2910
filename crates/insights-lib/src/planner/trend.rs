//! Growth-rate and trend classification over metric time series.

use crate::cluster::TimeSeries;
use serde::{Deserialize, Serialize};

/// Rejection-trend classification threshold: growth beyond +/-10%
/// over the window counts as a trend, anything inside is stable.
pub const REJECTION_TREND_THRESHOLD: f64 = 0.10;

/// Growth rate over the window: (last - first) / first. A zero or
/// missing first value yields 0.0 rather than dividing by zero.
pub fn growth_rate(series: &TimeSeries) -> f64 {
    match (series.first(), series.latest()) {
        (Some(first), Some(last)) if first != 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl RejectionTrend {
    pub fn classify(growth: f64) -> Self {
        if growth > REJECTION_TREND_THRESHOLD {
            Self::Increasing
        } else if growth < -REJECTION_TREND_THRESHOLD {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

/// Static seasonal load templates. These encode operational domain
/// knowledge about ingest traffic shape and are not learned from data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalPattern {
    /// Hours of day (UTC) with elevated ingest traffic.
    pub daily_peak_hours: Vec<u8>,
    /// Days of week with elevated ingest traffic.
    pub weekly_peak_days: Vec<String>,
}

impl SeasonalPattern {
    /// Business-hours template: weekday working hours drive most
    /// scrape and rule-evaluation load.
    pub fn business_hours() -> Self {
        Self {
            daily_peak_hours: (9..=17).collect(),
            weekly_peak_days: vec![
                "monday".to_string(),
                "tuesday".to_string(),
                "wednesday".to_string(),
            ],
        }
    }
}

/// Per-metric growth rates plus the rejection-trend classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub ingestion_growth_rate: f64,
    pub series_growth_rate: f64,
    pub memory_growth_rate: f64,
    pub rejection_growth_rate: f64,
    pub rejection_trend: RejectionTrend,
    pub seasonal: SeasonalPattern,
}

impl TrendAnalysis {
    pub fn from_series(
        ingestion: &TimeSeries,
        series: &TimeSeries,
        memory: &TimeSeries,
        rejections: &TimeSeries,
    ) -> Self {
        let rejection_growth_rate = growth_rate(rejections);
        Self {
            ingestion_growth_rate: growth_rate(ingestion),
            series_growth_rate: growth_rate(series),
            memory_growth_rate: growth_rate(memory),
            rejection_growth_rate,
            rejection_trend: RejectionTrend::classify(rejection_growth_rate),
            seasonal: SeasonalPattern::business_hours(),
        }
    }
}
