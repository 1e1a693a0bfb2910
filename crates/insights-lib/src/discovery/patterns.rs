//! Pattern-driven component classification
//!
//! Compiles naming patterns and label-selector rules once at construction
//! and evaluates them against resource metadata. Evaluation is a pure
//! function of its inputs.

use crate::models::ComponentKind;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

/// Weight of an exact name-pattern match.
pub const NAME_MATCH_WEIGHT: f64 = 0.4;
/// Weight of a label-selector match. Less than a name match.
pub const LABEL_MATCH_WEIGHT: f64 = 0.25;
/// Weight of a correlated service in the same namespace.
pub const SERVICE_CORRELATION_WEIGHT: f64 = 0.2;
/// Weight of a configuration resource referencing the component.
pub const CONFIG_REFERENCE_WEIGHT: f64 = 0.15;

/// Uncompiled classification table, expressed as data.
#[derive(Debug, Clone)]
pub struct PatternTable {
    /// category -> name regexes (matched case-insensitively).
    pub name_patterns: Vec<(ComponentKind, Vec<String>)>,
    /// category -> (label key, value regex).
    pub label_rules: Vec<(ComponentKind, String, String)>,
}

impl Default for PatternTable {
    fn default() -> Self {
        let patterns = |ps: &[&str]| ps.iter().map(|p| p.to_string()).collect::<Vec<String>>();
        let name_patterns = vec![
            (
                ComponentKind::WritePath,
                patterns(&[r"ingest", r"distributor", r"write[-_]?path"]),
            ),
            (
                ComponentKind::StorageQuery,
                patterns(&[r"querier", r"query[-_](frontend|scheduler)", r"store[-_]gateway"]),
            ),
            (ComponentKind::Compactor, patterns(&[r"compact"])),
            (ComponentKind::RulesEngine, patterns(&[r"ruler", r"rules[-_]engine"])),
            (
                ComponentKind::AlertRouter,
                patterns(&[r"alertmanager", r"alert[-_]rout"]),
            ),
            (
                ComponentKind::ObjectGateway,
                patterns(&[r"minio", r"object[-_](store|gateway)", r"s3[-_]gateway"]),
            ),
            (
                ComponentKind::IngressRouter,
                patterns(&[r"ingress", r"nginx", r"gateway$", r"router"]),
            ),
        ];

        let label_keys = ["app.kubernetes.io/name", "app", "app.kubernetes.io/component"];
        let mut label_rules = Vec::new();
        for key in label_keys {
            label_rules.extend([
                (ComponentKind::WritePath, key.to_string(), r"ingest|distributor".to_string()),
                (
                    ComponentKind::StorageQuery,
                    key.to_string(),
                    r"querier|query-frontend|store-gateway".to_string(),
                ),
                (ComponentKind::Compactor, key.to_string(), r"compact".to_string()),
                (ComponentKind::RulesEngine, key.to_string(), r"ruler".to_string()),
                (ComponentKind::AlertRouter, key.to_string(), r"alertmanager".to_string()),
                (ComponentKind::ObjectGateway, key.to_string(), r"minio|object-store".to_string()),
                (ComponentKind::IngressRouter, key.to_string(), r"ingress|nginx".to_string()),
            ]);
        }

        Self { name_patterns, label_rules }
    }
}

struct CompiledNameRule {
    category: ComponentKind,
    pattern: Regex,
    source: String,
}

struct CompiledLabelRule {
    category: ComponentKind,
    key: String,
    value: Regex,
}

/// One matched category with its accumulated score and evidence tags.
#[derive(Debug, Clone)]
pub struct CategoryMatch {
    pub category: ComponentKind,
    pub score: f64,
    pub evidence: Vec<String>,
}

/// Precompiled matcher. Individual patterns that fail to compile are
/// skipped with a warning; construction itself never fails.
pub struct PatternMatcher {
    name_rules: Vec<CompiledNameRule>,
    label_rules: Vec<CompiledLabelRule>,
}

impl PatternMatcher {
    pub fn new(table: &PatternTable) -> Self {
        let mut name_rules = Vec::new();
        for (category, patterns) in &table.name_patterns {
            for pattern in patterns {
                match Regex::new(&format!("(?i){pattern}")) {
                    Ok(re) => name_rules.push(CompiledNameRule {
                        category: *category,
                        pattern: re,
                        source: pattern.clone(),
                    }),
                    Err(e) => {
                        warn!(
                            category = category.as_str(),
                            pattern = %pattern,
                            error = %e,
                            "Skipping unparseable name pattern"
                        );
                    }
                }
            }
        }

        let mut label_rules = Vec::new();
        for (category, key, value_pattern) in &table.label_rules {
            match Regex::new(&format!("(?i){value_pattern}")) {
                Ok(re) => label_rules.push(CompiledLabelRule {
                    category: *category,
                    key: key.clone(),
                    value: re,
                }),
                Err(e) => {
                    warn!(
                        category = category.as_str(),
                        key = %key,
                        pattern = %value_pattern,
                        error = %e,
                        "Skipping unparseable label rule"
                    );
                }
            }
        }

        Self { name_rules, label_rules }
    }

    pub fn with_defaults() -> Self {
        Self::new(&PatternTable::default())
    }

    /// Evaluate a resource against the table. Multiple independent matches
    /// for the same category accumulate rather than replace.
    pub fn classify(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Vec<CategoryMatch> {
        let mut matches: HashMap<ComponentKind, CategoryMatch> = HashMap::new();

        for rule in &self.name_rules {
            if rule.pattern.is_match(name) {
                let entry = matches.entry(rule.category).or_insert_with(|| CategoryMatch {
                    category: rule.category,
                    score: 0.0,
                    evidence: Vec::new(),
                });
                // One name-pattern contribution per category, even when
                // several of its patterns match the same name.
                if !entry.evidence.iter().any(|e| e.starts_with("name-pattern")) {
                    entry.score += NAME_MATCH_WEIGHT;
                    entry.evidence.push(format!("name-pattern:{}", rule.source));
                }
            }
        }

        for rule in &self.label_rules {
            if let Some(value) = labels.get(&rule.key) {
                if rule.value.is_match(value) {
                    let entry = matches.entry(rule.category).or_insert_with(|| CategoryMatch {
                        category: rule.category,
                        score: 0.0,
                        evidence: Vec::new(),
                    });
                    if !entry.evidence.iter().any(|e| e.starts_with("label-selector")) {
                        entry.score += LABEL_MATCH_WEIGHT;
                        entry.evidence.push(format!("label-selector:{}={}", rule.key, value));
                    }
                }
            }
        }

        let mut result: Vec<CategoryMatch> = matches.into_values().collect();
        result.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.category.as_str().cmp(b.category.as_str()))
        });
        result
    }

    /// The single best category for a resource, if any rule matched.
    pub fn best_match(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Option<CategoryMatch> {
        self.classify(name, labels).into_iter().next()
    }

    pub fn rule_count(&self) -> usize {
        self.name_rules.len() + self.label_rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_table_compiles_all_rules() {
        let matcher = PatternMatcher::with_defaults();
        let table = PatternTable::default();
        let expected: usize =
            table.name_patterns.iter().map(|(_, p)| p.len()).sum::<usize>() + table.label_rules.len();
        assert_eq!(matcher.rule_count(), expected);
    }

    #[test]
    fn test_invalid_pattern_skipped_not_fatal() {
        let table = PatternTable {
            name_patterns: vec![(
                ComponentKind::Compactor,
                vec![r"compact".to_string(), r"(unclosed".to_string()],
            )],
            label_rules: vec![(
                ComponentKind::Compactor,
                "app".to_string(),
                r"[bad".to_string(),
            )],
        };
        let matcher = PatternMatcher::new(&table);
        assert_eq!(matcher.rule_count(), 1);
        assert!(matcher.best_match("metrics-compactor", &HashMap::new()).is_some());
    }

    #[test]
    fn test_name_match_outweighs_label_match() {
        let matcher = PatternMatcher::with_defaults();

        let by_name = matcher
            .best_match("payments-prod-ingester", &HashMap::new())
            .unwrap();
        let by_label = matcher
            .best_match("opaque-workload", &labels(&[("app", "ingester-0")]))
            .unwrap();

        assert_eq!(by_name.category, ComponentKind::WritePath);
        assert_eq!(by_label.category, ComponentKind::WritePath);
        assert!(by_name.score > by_label.score);
    }

    #[test]
    fn test_independent_matches_accumulate() {
        let matcher = PatternMatcher::with_defaults();

        let combined = matcher
            .best_match(
                "payments-prod-ingester",
                &labels(&[("app.kubernetes.io/name", "ingester-workload")]),
            )
            .unwrap();

        assert_eq!(combined.category, ComponentKind::WritePath);
        assert!((combined.score - (NAME_MATCH_WEIGHT + LABEL_MATCH_WEIGHT)).abs() < 1e-9);
        assert_eq!(combined.evidence.len(), 2);
    }

    #[test]
    fn test_classification_of_known_roles() {
        let matcher = PatternMatcher::with_defaults();
        let cases = [
            ("metrics-distributor", ComponentKind::WritePath),
            ("query-frontend", ComponentKind::StorageQuery),
            ("store-gateway-1", ComponentKind::StorageQuery),
            ("metrics-compactor", ComponentKind::Compactor),
            ("metrics-ruler", ComponentKind::RulesEngine),
            ("alertmanager", ComponentKind::AlertRouter),
            ("minio", ComponentKind::ObjectGateway),
            ("nginx-frontend", ComponentKind::IngressRouter),
        ];
        for (name, expected) in cases {
            let m = matcher.best_match(name, &HashMap::new()).unwrap();
            assert_eq!(m.category, expected, "misclassified {name}");
        }
    }

    #[test]
    fn test_no_match_yields_empty() {
        let matcher = PatternMatcher::with_defaults();
        assert!(matcher.classify("redis-cache", &HashMap::new()).is_empty());
    }
}
