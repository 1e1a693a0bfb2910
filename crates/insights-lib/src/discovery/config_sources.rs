//! Configuration resource discovery and parsing
//!
//! Matches configuration resources belonging to the backend, classifies
//! them, parses flat key/value limit maps out of their content, and
//! records a sha256 checksum of the raw content for change detection.

use crate::cluster::{ClusterLister, ResourceKind, ResourceMetadata};
use crate::error::SourceOutcome;
use crate::models::{ConfigKind, ConfigSource};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name fragments that mark a config resource as belonging to the backend.
const CONFIG_NAME_HINTS: &[&str] = &["metrics", "limits", "overrides", "runtime", "tenant"];

/// Classify a config resource by its name.
pub fn classify_config(name: &str) -> ConfigKind {
    let lower = name.to_ascii_lowercase();
    if lower.contains("override") {
        ConfigKind::OverrideConfig
    } else if lower.contains("tenant") {
        ConfigKind::TenantSpecificConfig
    } else {
        ConfigKind::GlobalConfig
    }
}

fn is_backend_config(meta: &ResourceMetadata) -> bool {
    let lower = meta.name.to_ascii_lowercase();
    CONFIG_NAME_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Parse flat `key: value` / `key = value` pairs from raw config content.
///
/// Parsing is line-based and tolerant: lines that are comments, section
/// headers, or nested structure markers are skipped. Repeated parses of
/// identical input yield an identical map.
pub fn parse_limit_map(content: &str) -> BTreeMap<String, String> {
    let mut limits = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':').or_else(|| trimmed.split_once('=')) else {
            continue;
        };
        let key = key.trim().trim_matches('"');
        let value = value.trim().trim_matches('"');
        if key.is_empty() || value.is_empty() {
            continue;
        }
        limits.insert(key.to_string(), value.to_string());
    }
    limits
}

/// Hex-encoded sha256 of the raw content. Stable across repeated calls.
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a ConfigSource from a matched resource and its raw content.
pub fn build_config_source(meta: &ResourceMetadata, content: &str) -> ConfigSource {
    ConfigSource {
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        kind: classify_config(&meta.name),
        limits: parse_limit_map(content),
        checksum: content_checksum(content),
    }
}

/// A parsed config source together with the raw content it came from.
///
/// The raw content is kept for one cycle only, for cross-validation of
/// component and tenant candidates; only the parsed source is cached.
#[derive(Debug, Clone)]
pub struct FetchedConfig {
    pub source: ConfigSource,
    pub raw: String,
}

/// Discover configuration sources in a namespace.
///
/// A failed listing yields a failed outcome; individual unreadable
/// resources are skipped with a warning but do not fail the source.
pub async fn discover_config_sources(
    lister: &Arc<dyn ClusterLister>,
    namespace: &str,
) -> SourceOutcome<Vec<FetchedConfig>> {
    let configs = match lister
        .list_resources(ResourceKind::ConfigMap, namespace, None)
        .await
    {
        Ok(configs) => configs,
        Err(e) => return SourceOutcome::Failed(e.to_string()),
    };

    let mut sources = Vec::new();
    let mut fetch_errors = 0usize;
    for meta in configs.iter().filter(|m| is_backend_config(m)) {
        match lister.get_config_resource(&meta.name, &meta.namespace).await {
            Ok(Some(content)) => sources.push(FetchedConfig {
                source: build_config_source(meta, &content),
                raw: content,
            }),
            Ok(None) => {
                debug!(name = %meta.name, namespace = %meta.namespace, "Config resource vanished between list and get");
            }
            Err(e) => {
                fetch_errors += 1;
                warn!(name = %meta.name, namespace = %meta.namespace, error = %e, "Failed to fetch config resource");
            }
        }
    }

    if fetch_errors > 0 {
        SourceOutcome::Partial(sources, format!("{fetch_errors} config fetches failed"))
    } else {
        SourceOutcome::Complete(sources)
    }
}

/// Extract multiplexing identifiers (tenant header values) from raw
/// sidecar/agent configuration content.
pub fn extract_multiplexing_ids(content: &str) -> Vec<String> {
    // The tenant header and explicit tenant keys as they appear in agent
    // remote-write and proxy configuration.
    static PATTERNS: &[&str] = &[
        r#"(?im)^\s*x-scope-orgid\s*[:=]\s*"?([a-z0-9][a-z0-9_-]*)"#,
        r#"(?im)^\s*tenant(?:_id)?\s*[:=]\s*"?([a-z0-9][a-z0-9_-]*)"#,
    ];

    let mut ids = Vec::new();
    for pattern in PATTERNS {
        // Patterns are static; compilation cannot fail at runtime.
        let re = Regex::new(pattern).expect("static pattern");
        for cap in re.captures_iter(content) {
            let id = cap[1].to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
