//! Error taxonomy for discovery, caching, and capacity planning

use thiserror::Error;

/// Errors surfaced by the insights core.
///
/// Background tasks log these and continue on the next tick; only
/// synchronous on-demand calls (first cache population, forced refresh,
/// capacity report generation) propagate them to the caller.
#[derive(Debug, Error)]
pub enum InsightsError {
    /// One discovery sub-source failed; the cycle continues with reduced
    /// evidence. Never surfaced as a cycle failure on its own.
    #[error("discovery source '{source_name}' failed: {reason}")]
    PartialSourceFailure { source_name: String, reason: String },

    /// Every sub-source of a discovery cycle failed. Surfaced to the
    /// caller of the very first population; afterwards the stale cached
    /// value is served instead.
    #[error("all discovery sources failed: {0}")]
    TotalDiscoveryFailure(String),

    /// A fresh value was computed but exceeds the memory budget. The
    /// value is still returned to the caller, just not cached.
    #[error("cache admission rejected for {category}: {reason}")]
    AdmissionRejected { category: String, reason: String },

    /// A metrics or cluster call exceeded its deadline.
    #[error("query '{operation}' timed out after {timeout_secs}s")]
    QueryTimeout {
        operation: String,
        timeout_secs: u64,
    },
}

impl InsightsError {
    /// Whether this error still allows serving a previously cached value.
    pub fn is_recoverable_with_stale(&self) -> bool {
        matches!(
            self,
            InsightsError::TotalDiscoveryFailure(_) | InsightsError::QueryTimeout { .. }
        )
    }
}

/// Outcome of one independent discovery source, folded during a cycle.
///
/// Sources never abort the cycle; a failed source contributes empty data
/// and a recorded reason.
#[derive(Debug)]
pub enum SourceOutcome<T> {
    /// Source completed and produced data.
    Complete(T),
    /// Source produced data but some sub-queries failed.
    Partial(T, String),
    /// Source produced nothing.
    Failed(String),
}

impl<T: Default> SourceOutcome<T> {
    /// Extract the data, recording any failure reason into `failures`.
    pub fn fold_into(self, source: &str, failures: &mut Vec<String>) -> T {
        match self {
            SourceOutcome::Complete(data) => data,
            SourceOutcome::Partial(data, reason) => {
                failures.push(format!("{source} (partial): {reason}"));
                data
            }
            SourceOutcome::Failed(reason) => {
                failures.push(format!("{source}: {reason}"));
                T::default()
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_complete_records_no_failure() {
        let outcome: SourceOutcome<Vec<u32>> = SourceOutcome::Complete(vec![1, 2]);
        let mut failures = Vec::new();
        let data = outcome.fold_into("services", &mut failures);
        assert_eq!(data, vec![1, 2]);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_fold_failed_yields_default_and_reason() {
        let outcome: SourceOutcome<Vec<u32>> = SourceOutcome::Failed("permission denied".into());
        let mut failures = Vec::new();
        let data = outcome.fold_into("services", &mut failures);
        assert!(data.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("permission denied"));
    }

    #[test]
    fn test_partial_source_failure_formats_and_chains() {
        let err = InsightsError::PartialSourceFailure {
            source_name: "services".into(),
            reason: "listing denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "discovery source 'services' failed: listing denied"
        );
        // Must be usable as a plain error with no inner cause.
        let err: &dyn std::error::Error = &err;
        assert!(err.source().is_none());
    }

    #[test]
    fn test_stale_recovery_classification() {
        assert!(InsightsError::TotalDiscoveryFailure("x".into()).is_recoverable_with_stale());
        assert!(!InsightsError::AdmissionRejected {
            category: "tenant-topology".into(),
            reason: "over budget".into(),
        }
        .is_recoverable_with_stale());
    }
}
