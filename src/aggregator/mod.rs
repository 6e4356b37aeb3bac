//! Capability aggregation: discover each backend's tools/prompts/resources
//! concurrently, apply per-workload filtering and overrides, resolve
//! cross-backend name collisions, and merge into one `AggregatedCapabilities`.
//!
//! Grounded on the teacher's bounded-concurrency scatter/gather pattern
//! (`mcp/registry/executor/scatter_gather.rs`): a `tokio::Semaphore` caps
//! in-flight backend queries, and `tokio::time::timeout` enforces the
//! per-workload (or default) query timeout from `operational.timeouts`.

pub mod conflict;
pub mod types;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::model::{AggregationConfig, Config, WorkloadToolConfig};
use crate::error::BackendError;
use crate::mcp_client::McpBackendClient;

pub use conflict::{resolve as resolve_conflicts, DiscoveredTool, Resolution};
pub use types::{AggregatedCapabilities, AggregatedPrompt, AggregatedResource, AggregatedTool};

const DEFAULT_DISCOVERY_CONCURRENCY: usize = 8;

/// Discover tools/prompts/resources across every backend and fold them
/// into a single, conflict-resolved `AggregatedCapabilities`.
pub async fn discover_and_aggregate(
    backends: &[Arc<dyn McpBackendClient>],
    config: &Config,
) -> Result<AggregatedCapabilities, BackendError> {
    // `excludeAllTools` suppresses *advertisement* only (spec §4.4): backends
    // are still discovered and every tool stays routable for composite-tool
    // use, so discovery below always runs regardless of this flag.
    let semaphore = Arc::new(Semaphore::new(DEFAULT_DISCOVERY_CONCURRENCY.min(backends.len().max(1))));
    let mut tasks = Vec::with_capacity(backends.len());

    for backend in backends {
        let backend = Arc::clone(backend);
        let semaphore = Arc::clone(&semaphore);
        let timeout = per_backend_timeout(config, backend.backend_id());

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let backend_id = backend.backend_id().to_string();

            let tools = match tokio::time::timeout(timeout.as_std(), backend.list_tools()).await {
                Ok(Ok(tools)) => tools,
                Ok(Err(e)) => {
                    warn!(backend = %backend_id, error = %e, "tool discovery failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(backend = %backend_id, "tool discovery timed out");
                    Vec::new()
                }
            };

            let prompts = match tokio::time::timeout(timeout.as_std(), backend.list_prompts()).await {
                Ok(Ok(prompts)) => prompts,
                _ => Vec::new(),
            };

            let resources = match tokio::time::timeout(timeout.as_std(), backend.list_resources()).await {
                Ok(Ok(resources)) => resources,
                _ => Vec::new(),
            };

            (backend_id, tools, prompts, resources)
        }));
    }

    let mut advertisable_tools = Vec::new();
    let mut all_tools = Vec::new();
    let mut prompts = Vec::new();
    let mut resources = Vec::new();

    for task in tasks {
        let (backend_id, backend_tools, backend_prompts, backend_resources) =
            task.await.map_err(|e| BackendError::Transport { backend: "unknown".to_string(), message: e.to_string() })?;

        let workload_config = find_workload_config(&config.aggregation, &backend_id);
        let workload_excluded = workload_config.map(|w| w.exclude_all).unwrap_or(false);

        for tool in backend_tools {
            let original_name = tool.name.to_string();
            let (effective_name, description) = apply_override(workload_config, &original_name, tool.description.as_deref());
            let input_schema = serde_json::to_value(&tool.input_schema).unwrap_or(serde_json::Value::Null);

            // Every discovered tool stays routable regardless of
            // advertisement suppression (spec §4.4 "Visibility vs routing").
            all_tools.push(AggregatedTool {
                name: effective_name.clone(),
                original_name: original_name.clone(),
                backend: backend_id.clone(),
                description: description.clone(),
                input_schema: input_schema.clone(),
            });

            if config.aggregation.exclude_all_tools || workload_excluded {
                continue;
            }
            if let Some(wc) = workload_config {
                if !wc.filter.is_empty() && !wc.filter.contains(&original_name) {
                    continue;
                }
            }
            advertisable_tools.push(DiscoveredTool { backend: backend_id.clone(), original_name, effective_name, description, input_schema });
        }

        for prompt in backend_prompts {
            prompts.push(AggregatedPrompt {
                name: prompt.name.clone(),
                original_name: prompt.name.clone(),
                backend: backend_id.clone(),
                description: prompt.description.clone(),
            });
        }

        for resource in backend_resources {
            resources.push(AggregatedResource {
                uri: resource.raw.uri.clone(),
                backend: backend_id.clone(),
                name: Some(resource.raw.name.clone()),
                description: resource.raw.description.clone(),
            });
        }
    }

    // excludeAllTools already excluded every tool from `advertisable_tools`
    // above; running conflict resolution over an empty input is a no-op,
    // kept rather than special-cased so there is one resolution code path.
    let resolution = resolve_conflicts(advertisable_tools, &config.aggregation);
    for note in &resolution.dropped {
        info!(note, "capability aggregation dropped a tool");
    }

    Ok(AggregatedCapabilities::with_all_tools(resolution.tools, all_tools, prompts, resources))
}

fn find_workload_config<'a>(agg: &'a AggregationConfig, backend_id: &str) -> Option<&'a WorkloadToolConfig> {
    agg.tools.iter().find(|w| w.workload == backend_id)
}

fn apply_override(
    workload_config: Option<&WorkloadToolConfig>,
    original_name: &str,
    original_description: Option<&str>,
) -> (String, Option<String>) {
    let Some(wc) = workload_config else {
        return (original_name.to_string(), original_description.map(str::to_string));
    };
    let Some(over) = wc.overrides.get(original_name) else {
        return (original_name.to_string(), original_description.map(str::to_string));
    };
    let name = over.name.clone().unwrap_or_else(|| original_name.to_string());
    let description = over.description.clone().or_else(|| original_description.map(str::to_string));
    (name, description)
}

fn per_backend_timeout(config: &Config, backend_id: &str) -> crate::duration::Duration {
    config.operational.timeouts.per_workload.get(backend_id).copied().unwrap_or(config.operational.timeouts.default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ToolOverride;
    use std::collections::HashMap;

    #[test]
    fn apply_override_renames_tool_and_keeps_original_description_when_unset() {
        let mut overrides = HashMap::new();
        overrides.insert("search".to_string(), ToolOverride { name: Some("find".to_string()), description: None });
        let wc = WorkloadToolConfig {
            workload: "github".to_string(),
            tool_config_ref: None,
            filter: vec![],
            overrides,
            exclude_all: false,
        };
        let (name, description) = apply_override(Some(&wc), "search", Some("searches things"));
        assert_eq!(name, "find");
        assert_eq!(description, Some("searches things".to_string()));
    }

    #[test]
    fn apply_override_passes_through_without_workload_config() {
        let (name, description) = apply_override(None, "search", Some("d"));
        assert_eq!(name, "search");
        assert_eq!(description, Some("d".to_string()));
    }
}
