//! Request routing: resolves an incoming tool/prompt/resource name to the
//! backend (and original name) that serves it, via a routing table held
//! behind an `arc_swap::ArcSwap` so readers never observe a partially
//! updated table.
//!
//! Grounded on the lock-free published-state pattern the teacher uses for
//! its own hot-path lookup tables, generalized here from a single
//! capability kind to the three the spec names (tools/prompts/resources).

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::aggregator::AggregatedCapabilities;

/// Where a resolved capability lives: which backend, and what the backend
/// itself calls it (since aggregation may have renamed it for callers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub backend: String,
    pub original_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    tools: HashMap<String, Route>,
    prompts: HashMap<String, Route>,
    resources: HashMap<String, Route>,
}

impl RoutingTable {
    pub fn from_capabilities(capabilities: &AggregatedCapabilities) -> Self {
        let mut tools: HashMap<String, Route> = capabilities
            .tools
            .iter()
            .map(|t| (t.name.clone(), Route { backend: t.backend.clone(), original_name: t.original_name.clone() }))
            .collect();

        // Every discovered tool stays routable under its backend-qualified
        // name, even if `excludeAllTools`/per-workload `excludeAll`/`filter`
        // kept it off the advertised surface, or conflict resolution dropped
        // it as a collision loser (spec's "Visibility vs routing" invariant).
        for t in &capabilities.all_tools {
            let qualified = format!("{}.{}", t.backend, t.name);
            tools.entry(qualified).or_insert(Route { backend: t.backend.clone(), original_name: t.original_name.clone() });
        }

        let prompts = capabilities
            .prompts
            .iter()
            .map(|p| (p.name.clone(), Route { backend: p.backend.clone(), original_name: p.original_name.clone() }))
            .collect();
        let resources = capabilities
            .resources
            .iter()
            .map(|r| (r.uri.clone(), Route { backend: r.backend.clone(), original_name: r.uri.clone() }))
            .collect();
        Self { tools, prompts, resources }
    }

    pub fn resolve_tool(&self, name: &str) -> Option<&Route> {
        self.tools.get(name)
    }

    pub fn resolve_prompt(&self, name: &str) -> Option<&Route> {
        self.prompts.get(name)
    }

    pub fn resolve_resource(&self, uri: &str) -> Option<&Route> {
        self.resources.get(uri)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

/// The published, swappable routing table. `update` builds a fresh table
/// and atomically replaces the old one; in-flight readers keep the `Arc`
/// they already loaded, so no reader ever sees a half-built table.
#[derive(Default)]
pub struct Router {
    table: ArcSwap<RoutingTable>,
}

impl Router {
    pub fn new(initial: RoutingTable) -> Self {
        Self { table: ArcSwap::from_pointee(initial) }
    }

    pub fn current(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    pub fn update(&self, capabilities: &AggregatedCapabilities) {
        self.table.store(Arc::new(RoutingTable::from_capabilities(capabilities)));
    }
}
