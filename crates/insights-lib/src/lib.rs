//! Insights library for metrics-backend topology discovery
//!
//! This crate provides the core functionality for:
//! - Pattern-based component and tenant discovery in a cluster
//! - Dual-TTL topology caching under a bounded memory budget
//! - Trend-based capacity planning per tenant
//! - Health checks and observability

pub mod cache;
pub mod cluster;
pub mod discovery;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod planner;
pub mod tasks;

pub use error::{InsightsError, SourceOutcome};
pub use health::{HealthRegistry, HealthResponse, ReadinessResponse, SubsystemHealth, SubsystemStatus};
pub use models::*;
pub use observability::{InsightsMetrics, StructuredLogger};
