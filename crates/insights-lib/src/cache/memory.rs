//! Memory budget accounting and admission control
//!
//! Tracks the estimated byte size of every cached item against a budget
//! sized from system memory at startup. An item is either admitted and
//! fully accounted for, or rejected outright; partial admission is
//! forbidden, and current bytes never exceed the budget after any
//! admission decision.

use crate::cache::eviction::{order_for_eviction, EvictionPolicy};
use crate::error::InsightsError;
use crate::observability::InsightsMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Budget floor: never starve the cache on small hosts.
pub const BUDGET_FLOOR_BYTES: u64 = 100 * 1024 * 1024;
/// Budget ceiling: never over-commit on large hosts.
pub const BUDGET_CEILING_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Used when system memory detection reports zero.
const BUDGET_FALLBACK_BYTES: u64 = 256 * 1024 * 1024;

/// Log-and-count threshold, fraction of the budget.
pub const WARNING_THRESHOLD: f64 = 0.8;
/// Eviction-cycle trigger, fraction of the budget.
pub const EVICTION_THRESHOLD: f64 = 0.9;

/// Budget categories, one per cached topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
    ComponentTopology,
    TenantTopology,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::ComponentTopology => "component-topology",
            CacheCategory::TenantTopology => "tenant-topology",
        }
    }

    pub fn all() -> &'static [CacheCategory] {
        &[CacheCategory::ComponentTopology, CacheCategory::TenantTopology]
    }
}

/// Sizing and policy knobs for the memory manager.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Explicit budget override; when absent the budget is derived from
    /// system memory (total / 4, clamped to floor and ceiling).
    pub max_bytes: Option<u64>,
    /// Maximum tracked items per category.
    pub max_items_per_category: usize,
    /// Maximum tracked items overall.
    pub max_total_items: usize,
    pub warning_threshold: f64,
    pub eviction_threshold: f64,
    pub policy: EvictionPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            max_items_per_category: 64,
            max_total_items: 128,
            warning_threshold: WARNING_THRESHOLD,
            eviction_threshold: EVICTION_THRESHOLD,
            policy: EvictionPolicy::Hybrid,
        }
    }
}

/// One admitted item's accounting record.
#[derive(Debug, Clone)]
pub struct TrackedItem {
    pub id: String,
    pub category: CacheCategory,
    pub bytes: u64,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

struct BudgetState {
    current_bytes: u64,
    peak_bytes: u64,
    counts: HashMap<CacheCategory, usize>,
    eviction_count: u64,
    warning_count: u64,
    last_eviction: Option<DateTime<Utc>>,
    items: HashMap<String, TrackedItem>,
}

/// Point-in-time view of the budget, exposed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub current_bytes: u64,
    pub max_bytes: u64,
    pub usage_percent: f64,
    pub peak_bytes: u64,
    pub item_counts: HashMap<String, usize>,
    pub item_limit_per_category: usize,
    pub eviction_count: u64,
    pub warning_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_eviction: Option<DateTime<Utc>>,
    pub policy: String,
    pub warning_threshold: f64,
    pub eviction_threshold: f64,
}

/// Derive the startup budget from total system memory.
pub fn budget_from_system_memory() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        warn!(
            fallback_bytes = BUDGET_FALLBACK_BYTES,
            "Could not detect system memory, using fallback budget"
        );
        return BUDGET_FALLBACK_BYTES;
    }
    (total / 4).clamp(BUDGET_FLOOR_BYTES, BUDGET_CEILING_BYTES)
}

/// Resident set size of this process, for the periodic cross-check
/// between tracked cache bytes and actual memory use.
fn process_rss_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = sysinfo::System::new();
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory())
}

/// Owns the budget counters. All mutation happens through atomic
/// admit/release pairs under its own lock; lost updates are impossible by
/// construction.
pub struct MemoryManager {
    max_bytes: u64,
    config: MemoryConfig,
    state: RwLock<BudgetState>,
    metrics: InsightsMetrics,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        let max_bytes = config.max_bytes.unwrap_or_else(budget_from_system_memory);
        info!(
            max_bytes,
            policy = config.policy.as_str(),
            "Memory budget initialized"
        );
        Self {
            max_bytes,
            config,
            state: RwLock::new(BudgetState {
                current_bytes: 0,
                peak_bytes: 0,
                counts: HashMap::new(),
                eviction_count: 0,
                warning_count: 0,
                last_eviction: None,
                items: HashMap::new(),
            }),
            metrics: InsightsMetrics::new(),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.config.policy
    }

    /// Check whether an item of the given size may be admitted. Three
    /// independent checks, all of which must pass: per-category count,
    /// total count, and the byte budget.
    pub fn can_admit(&self, category: CacheCategory, bytes: u64) -> Result<(), InsightsError> {
        let state = self.state.read().expect("budget lock poisoned");
        self.check(&state, category, bytes)
    }

    fn check(
        &self,
        state: &BudgetState,
        category: CacheCategory,
        bytes: u64,
    ) -> Result<(), InsightsError> {
        let reject = |reason: String| InsightsError::AdmissionRejected {
            category: category.as_str().to_string(),
            reason,
        };

        let category_count = state.counts.get(&category).copied().unwrap_or(0);
        if category_count >= self.config.max_items_per_category {
            return Err(reject(format!(
                "category item limit reached ({category_count}/{})",
                self.config.max_items_per_category
            )));
        }
        if state.items.len() >= self.config.max_total_items {
            return Err(reject(format!(
                "total item limit reached ({}/{})",
                state.items.len(),
                self.config.max_total_items
            )));
        }
        if state.current_bytes + bytes > self.max_bytes {
            return Err(reject(format!(
                "{} + {bytes} bytes exceeds budget of {}",
                state.current_bytes, self.max_bytes
            )));
        }
        Ok(())
    }

    /// Admit an item, re-running the checks under the write lock so the
    /// decision and the accounting update are one atomic step. An id that
    /// is already tracked is released first so its bytes are never counted
    /// twice.
    pub fn admit(&self, item: TrackedItem) -> Result<(), InsightsError> {
        let mut state = self.state.write().expect("budget lock poisoned");
        if let Some(previous) = state.items.remove(&item.id) {
            state.current_bytes = state.current_bytes.saturating_sub(previous.bytes);
            if let Some(count) = state.counts.get_mut(&previous.category) {
                *count = count.saturating_sub(1);
            }
        }
        self.check(&state, item.category, item.bytes)?;

        state.current_bytes += item.bytes;
        state.peak_bytes = state.peak_bytes.max(state.current_bytes);
        *state.counts.entry(item.category).or_insert(0) += 1;
        debug!(id = %item.id, bytes = item.bytes, category = item.category.as_str(), "Admitted cache item");
        state.items.insert(item.id.clone(), item);

        self.metrics.set_memory_bytes(state.current_bytes as i64, state.peak_bytes as i64);
        Ok(())
    }

    /// Release a previously admitted item. Must pair with the admit that
    /// accounted for it; replacing a value releases the old item first.
    pub fn release(&self, id: &str) -> Option<TrackedItem> {
        let mut state = self.state.write().expect("budget lock poisoned");
        let item = state.items.remove(id)?;
        state.current_bytes = state.current_bytes.saturating_sub(item.bytes);
        if let Some(count) = state.counts.get_mut(&item.category) {
            *count = count.saturating_sub(1);
        }
        self.metrics.set_memory_bytes(state.current_bytes as i64, state.peak_bytes as i64);
        Some(item)
    }

    /// Periodic cross-check against the budget and thresholds. Crossing
    /// the warning threshold only logs and counts; crossing the eviction
    /// threshold runs an eviction cycle and returns the evicted ids.
    pub fn monitor_tick(&self) -> Vec<String> {
        let (current_bytes, usage) = {
            let state = self.state.read().expect("budget lock poisoned");
            (
                state.current_bytes,
                state.current_bytes as f64 / self.max_bytes as f64,
            )
        };

        if let Some(rss) = process_rss_bytes() {
            debug!(tracked_bytes = current_bytes, rss_bytes = rss, "Memory check");
        }

        if usage >= self.config.eviction_threshold {
            warn!(
                usage_percent = (usage * 100.0) as u64,
                "Memory usage crossed eviction threshold, running eviction cycle"
            );
            return self.run_eviction();
        }

        if usage >= self.config.warning_threshold {
            let mut state = self.state.write().expect("budget lock poisoned");
            state.warning_count += 1;
            warn!(
                usage_percent = (usage * 100.0) as u64,
                warnings = state.warning_count,
                "Memory usage crossed warning threshold"
            );
        }
        Vec::new()
    }

    /// Evict items in policy order until usage drops back under the
    /// eviction threshold. Returns the ids of evicted items; the owner of
    /// the cached values drops them on sight of their ids.
    pub fn run_eviction(&self) -> Vec<String> {
        let target = (self.max_bytes as f64 * self.config.eviction_threshold) as u64;
        let mut state = self.state.write().expect("budget lock poisoned");

        let items: Vec<TrackedItem> = state.items.values().cloned().collect();
        let ordered = order_for_eviction(self.config.policy, &items, Utc::now());

        let mut evicted = Vec::new();
        for id in ordered {
            if state.current_bytes < target {
                break;
            }
            if let Some(item) = state.items.remove(&id) {
                state.current_bytes = state.current_bytes.saturating_sub(item.bytes);
                if let Some(count) = state.counts.get_mut(&item.category) {
                    *count = count.saturating_sub(1);
                }
                state.eviction_count += 1;
                info!(id = %item.id, bytes = item.bytes, policy = self.config.policy.as_str(), "Evicted cache item");
                evicted.push(item.id);
            }
        }

        if !evicted.is_empty() {
            state.last_eviction = Some(Utc::now());
            self.metrics.inc_evictions(evicted.len() as u64);
            self.metrics.set_memory_bytes(state.current_bytes as i64, state.peak_bytes as i64);
        }
        evicted
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.read().expect("budget lock poisoned");
        let mut item_counts = HashMap::new();
        for category in CacheCategory::all() {
            item_counts.insert(
                category.as_str().to_string(),
                state.counts.get(category).copied().unwrap_or(0),
            );
        }
        MemorySnapshot {
            current_bytes: state.current_bytes,
            max_bytes: self.max_bytes,
            usage_percent: state.current_bytes as f64 / self.max_bytes as f64 * 100.0,
            peak_bytes: state.peak_bytes,
            item_counts,
            item_limit_per_category: self.config.max_items_per_category,
            eviction_count: state.eviction_count,
            warning_count: state.warning_count,
            last_eviction: state.last_eviction,
            policy: self.config.policy.as_str().to_string(),
            warning_threshold: self.config.warning_threshold,
            eviction_threshold: self.config.eviction_threshold,
        }
    }
}
