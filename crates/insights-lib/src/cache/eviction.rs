//! Eviction policies
//!
//! Policies choose which already-admitted items to remove when memory
//! pressure crosses the eviction threshold. Policy choice never changes
//! admission semantics, only victim ordering.

use crate::cache::memory::TrackedItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Selectable at runtime via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Evict largest items first.
    SizeBased,
    /// Evict oldest-by-insertion first.
    CountBased,
    /// Evict items closest to (or past) expiry first.
    TtlBased,
    /// Weighted combination favoring items that are both large and stale.
    Hybrid,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::SizeBased => "size-based",
            EvictionPolicy::CountBased => "count-based",
            EvictionPolicy::TtlBased => "ttl-based",
            EvictionPolicy::Hybrid => "hybrid",
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "size-based" => Ok(EvictionPolicy::SizeBased),
            "count-based" => Ok(EvictionPolicy::CountBased),
            "ttl-based" => Ok(EvictionPolicy::TtlBased),
            "hybrid" => Ok(EvictionPolicy::Hybrid),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

/// Order item ids victims-first according to the policy.
pub fn order_for_eviction(
    policy: EvictionPolicy,
    items: &[TrackedItem],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut ranked: Vec<&TrackedItem> = items.iter().collect();
    match policy {
        EvictionPolicy::SizeBased => {
            ranked.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.id.cmp(&b.id)));
        }
        EvictionPolicy::CountBased => {
            ranked.sort_by(|a, b| a.inserted_at.cmp(&b.inserted_at).then_with(|| a.id.cmp(&b.id)));
        }
        EvictionPolicy::TtlBased => {
            ranked.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        }
        EvictionPolicy::Hybrid => {
            let max_bytes = items.iter().map(|i| i.bytes).max().unwrap_or(1).max(1);
            let max_age = items
                .iter()
                .map(|i| (now - i.inserted_at).num_seconds().max(0))
                .max()
                .unwrap_or(1)
                .max(1);
            let weight = |item: &TrackedItem| {
                let size_norm = item.bytes as f64 / max_bytes as f64;
                let age_norm = (now - item.inserted_at).num_seconds().max(0) as f64 / max_age as f64;
                size_norm * 0.5 + age_norm * 0.5
            };
            ranked.sort_by(|a, b| {
                weight(b)
                    .partial_cmp(&weight(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
    }
    ranked.into_iter().map(|i| i.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::CacheCategory;
    use chrono::Duration;

    fn item(id: &str, bytes: u64, age_secs: i64, ttl_secs: i64) -> TrackedItem {
        let now = Utc::now();
        TrackedItem {
            id: id.to_string(),
            category: CacheCategory::TenantTopology,
            bytes,
            inserted_at: now - Duration::seconds(age_secs),
            expires_at: now - Duration::seconds(age_secs) + Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn test_size_based_orders_largest_first() {
        let items = vec![item("s", 100, 0, 600), item("l", 900, 0, 600), item("m", 500, 0, 600)];
        let order = order_for_eviction(EvictionPolicy::SizeBased, &items, Utc::now());
        assert_eq!(order, vec!["l", "m", "s"]);
    }

    #[test]
    fn test_count_based_orders_oldest_insertion_first() {
        let items = vec![item("new", 100, 10, 600), item("old", 100, 500, 600)];
        let order = order_for_eviction(EvictionPolicy::CountBased, &items, Utc::now());
        assert_eq!(order, vec!["old", "new"]);
    }

    #[test]
    fn test_ttl_based_orders_closest_to_expiry_first() {
        let items = vec![item("fresh", 100, 0, 600), item("expiring", 100, 0, 30)];
        let order = order_for_eviction(EvictionPolicy::TtlBased, &items, Utc::now());
        assert_eq!(order, vec!["expiring", "fresh"]);
    }

    #[test]
    fn test_hybrid_prefers_large_and_stale() {
        let items = vec![
            item("large-stale", 900, 500, 600),
            item("large-fresh", 900, 0, 600),
            item("small-stale", 100, 500, 600),
        ];
        let order = order_for_eviction(EvictionPolicy::Hybrid, &items, Utc::now());
        assert_eq!(order[0], "large-stale");
    }

    #[test]
    fn test_policy_parse_round_trip() {
        for policy in [
            EvictionPolicy::SizeBased,
            EvictionPolicy::CountBased,
            EvictionPolicy::TtlBased,
            EvictionPolicy::Hybrid,
        ] {
            assert_eq!(policy.as_str().parse::<EvictionPolicy>().unwrap(), policy);
        }
        assert!("lru".parse::<EvictionPolicy>().is_err());
    }
}
