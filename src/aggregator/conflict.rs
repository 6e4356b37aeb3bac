//! Conflict resolution between backends exposing tools of the same name.
//!
//! Implements the three strategies from `AggregationConfig`: `prefix`
//! (namespace every tool with its backend, so collisions are structurally
//! impossible), `priority` (an explicit backend order breaks ties), and
//! `manual` (no renaming; the operator is responsible for disambiguating
//! via per-workload `overrides`/`filter`).

use std::collections::HashMap;

use crate::config::model::{AggregationConfig, ConflictResolution};

use super::types::AggregatedTool;

/// One tool as discovered from a single backend, before naming/collision
/// resolution.
#[derive(Debug, Clone)]
pub struct DiscoveredTool {
    pub backend: String,
    pub original_name: String,
    pub effective_name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Outcome of resolution: the tools that made it into the aggregate, plus
/// human-readable notes about anything dropped (for logging).
pub struct Resolution {
    pub tools: Vec<AggregatedTool>,
    pub dropped: Vec<String>,
}

pub fn resolve(discovered: Vec<DiscoveredTool>, config: &AggregationConfig) -> Resolution {
    match config.conflict_resolution {
        ConflictResolution::Prefix => resolve_prefix(discovered, &config.config.prefix_format),
        ConflictResolution::Priority => resolve_priority(discovered, config.config.priority_order.as_deref().unwrap_or(&[])),
        ConflictResolution::Manual => resolve_first_wins(discovered),
    }
}

fn format_prefixed_name(format: &Option<String>, backend: &str, tool: &str) -> String {
    match format {
        Some(f) => f.replace("{backend}", backend).replace("{tool}", tool),
        None => format!("{backend}_{tool}"),
    }
}

fn resolve_prefix(discovered: Vec<DiscoveredTool>, prefix_format: &Option<String>) -> Resolution {
    let tools = discovered
        .into_iter()
        .map(|d| AggregatedTool {
            name: format_prefixed_name(prefix_format, &d.backend, &d.effective_name),
            original_name: d.original_name,
            backend: d.backend,
            description: d.description,
            input_schema: d.input_schema,
        })
        .collect();
    Resolution { tools, dropped: Vec::new() }
}

fn backend_rank(priority_order: &[String], backend: &str) -> usize {
    priority_order.iter().position(|b| b == backend).unwrap_or(priority_order.len())
}

fn resolve_priority(discovered: Vec<DiscoveredTool>, priority_order: &[String]) -> Resolution {
    let mut by_name: HashMap<String, Vec<DiscoveredTool>> = HashMap::new();
    for tool in discovered {
        by_name.entry(tool.effective_name.clone()).or_default().push(tool);
    }

    let mut tools = Vec::new();
    let mut dropped = Vec::new();

    for (name, mut candidates) in by_name {
        candidates.sort_by_key(|c| backend_rank(priority_order, &c.backend));
        let winner = candidates.remove(0);
        for loser in &candidates {
            dropped.push(format!(
                "tool '{name}' from backend '{}' dropped in favor of backend '{}' (priority order)",
                loser.backend, winner.backend
            ));
        }
        tools.push(AggregatedTool {
            name: winner.effective_name,
            original_name: winner.original_name,
            backend: winner.backend,
            description: winner.description,
            input_schema: winner.input_schema,
        });
    }

    Resolution { tools, dropped }
}

fn resolve_first_wins(discovered: Vec<DiscoveredTool>) -> Resolution {
    let mut seen = std::collections::HashSet::new();
    let mut tools = Vec::new();
    let mut dropped = Vec::new();

    for tool in discovered {
        if !seen.insert(tool.effective_name.clone()) {
            dropped.push(format!(
                "tool '{}' from backend '{}' dropped: name already claimed under manual conflict resolution",
                tool.effective_name, tool.backend
            ));
            continue;
        }
        tools.push(AggregatedTool {
            name: tool.effective_name,
            original_name: tool.original_name,
            backend: tool.backend,
            description: tool.description,
            input_schema: tool.input_schema,
        });
    }

    Resolution { tools, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConflictResolutionConfig;

    fn tool(backend: &str, name: &str) -> DiscoveredTool {
        DiscoveredTool {
            backend: backend.to_string(),
            original_name: name.to_string(),
            effective_name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn prefix_strategy_namespaces_every_tool() {
        let discovered = vec![tool("github", "search"), tool("jira", "search")];
        let config = AggregationConfig { conflict_resolution: ConflictResolution::Prefix, ..Default::default() };
        let resolution = resolve(discovered, &config);
        let names: Vec<_> = resolution.tools.iter().map(|t| t.name.clone()).collect();
        assert!(names.contains(&"github_search".to_string()));
        assert!(names.contains(&"jira_search".to_string()));
        assert!(resolution.dropped.is_empty());
    }

    #[test]
    fn prefix_strategy_honors_custom_format() {
        let discovered = vec![tool("github", "search")];
        let config = AggregationConfig {
            conflict_resolution: ConflictResolution::Prefix,
            config: ConflictResolutionConfig { prefix_format: Some("{backend}::{tool}".to_string()), priority_order: None },
            ..Default::default()
        };
        let resolution = resolve(discovered, &config);
        assert_eq!(resolution.tools[0].name, "github::search");
    }

    #[test]
    fn priority_strategy_keeps_higher_priority_backend() {
        let discovered = vec![tool("jira", "search"), tool("github", "search")];
        let config = AggregationConfig {
            conflict_resolution: ConflictResolution::Priority,
            config: ConflictResolutionConfig {
                prefix_format: None,
                priority_order: Some(vec!["github".to_string(), "jira".to_string()]),
            },
            ..Default::default()
        };
        let resolution = resolve(discovered, &config);
        assert_eq!(resolution.tools.len(), 1);
        assert_eq!(resolution.tools[0].backend, "github");
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn manual_strategy_keeps_first_and_drops_rest() {
        let discovered = vec![tool("github", "search"), tool("jira", "search")];
        let config = AggregationConfig { conflict_resolution: ConflictResolution::Manual, ..Default::default() };
        let resolution = resolve(discovered, &config);
        assert_eq!(resolution.tools.len(), 1);
        assert_eq!(resolution.dropped.len(), 1);
    }

    #[test]
    fn no_collision_passes_through_unchanged_under_manual() {
        let discovered = vec![tool("github", "search"), tool("jira", "triage")];
        let config = AggregationConfig { conflict_resolution: ConflictResolution::Manual, ..Default::default() };
        let resolution = resolve(discovered, &config);
        assert_eq!(resolution.tools.len(), 2);
        assert!(resolution.dropped.is_empty());
    }
}
