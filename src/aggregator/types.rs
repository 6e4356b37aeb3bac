//! Aggregated-capability records: the merged, conflict-resolved view of
//! every backend's tools/prompts/resources, plus a deterministic checksum
//! used to detect when the aggregate has actually changed.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregatedTool {
    /// The name callers see and invoke.
    pub name: String,
    /// The name as the owning backend knows it.
    pub original_name: String,
    pub backend: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregatedPrompt {
    pub name: String,
    pub original_name: String,
    pub backend: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregatedResource {
    pub uri: String,
    pub backend: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct AggregatedCapabilities {
    /// The advertised surface: post-filter, post-conflict-resolution.
    pub tools: Vec<AggregatedTool>,
    /// Every tool discovered on every backend, independent of
    /// `excludeAllTools`/per-workload `excludeAll`/`filter` and of conflict
    /// resolution dropping a loser from the advertised surface. The router
    /// builds backend-qualified routes from this so a composite tool can
    /// still reach a tool that was suppressed from advertisement, per
    /// spec's "Visibility vs routing" invariant.
    pub all_tools: Vec<AggregatedTool>,
    pub prompts: Vec<AggregatedPrompt>,
    pub resources: Vec<AggregatedResource>,
    pub checksum: String,
}

impl AggregatedCapabilities {
    /// Build the capabilities record and compute its checksum from a
    /// deterministically-ordered serialization (tools/prompts/resources
    /// sorted by name/uri so two runs discovering the same backends in a
    /// different order still agree). `all_tools` defaults to the advertised
    /// set; callers that need to preserve suppressed/dropped tools for
    /// routing should use `with_all_tools` instead.
    pub fn new(tools: Vec<AggregatedTool>, prompts: Vec<AggregatedPrompt>, resources: Vec<AggregatedResource>) -> Self {
        Self::with_all_tools(tools.clone(), tools, prompts, resources)
    }

    pub fn with_all_tools(
        mut tools: Vec<AggregatedTool>,
        mut all_tools: Vec<AggregatedTool>,
        mut prompts: Vec<AggregatedPrompt>,
        mut resources: Vec<AggregatedResource>,
    ) -> Self {
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        all_tools.sort_by(|a, b| (a.backend.as_str(), a.name.as_str()).cmp(&(b.backend.as_str(), b.name.as_str())));
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));

        let checksum = checksum_of(&tools, &prompts, &resources);
        Self { tools, all_tools, prompts, resources, checksum }
    }
}

fn checksum_of(tools: &[AggregatedTool], prompts: &[AggregatedPrompt], resources: &[AggregatedResource]) -> String {
    let canonical = serde_json::json!({
        "tools": tools,
        "prompts": prompts,
        "resources": resources,
    });
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
