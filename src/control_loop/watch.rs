//! Dependency watching: decide whether a changed external object (secret,
//! config map, composite-tool bundle) should trigger a re-reconcile of a
//! given `Config`.

use std::collections::HashSet;

use crate::config::model::{BackendAuthStrategy, Config, IncomingAuth};
use crate::loader::object_store::ObjectRef;

/// Implemented per referenced kind so the control loop can ask "does this
/// object care about that change" without re-deriving the reference set
/// from the config on every watch event.
pub trait ReferenceWatcher: Send + Sync {
    fn references(&self, changed: &ObjectRef) -> bool;
}

/// Collects every `ObjectRef` a `Config` depends on: composite-tool
/// bundles, tool-config-ref config maps, and the secrets backing
/// `*Env`-indirected auth fields.
pub struct ConfigReferenceWatcher {
    refs: HashSet<ObjectRef>,
}

impl ConfigReferenceWatcher {
    pub fn from_config(config: &Config) -> Self {
        let mut refs = HashSet::new();

        for name in &config.composite_tool_refs {
            refs.insert(ObjectRef::Bundle { name: name.clone() });
        }

        for tool_config in &config.aggregation.tools {
            if let Some(config_map) = &tool_config.tool_config_ref {
                refs.insert(ObjectRef::ConfigMap { name: config_map.clone(), key: "config".to_string() });
            }
        }

        if let IncomingAuth::Oidc { client_secret_env: Some(name), .. } = &config.incoming_auth {
            refs.insert(ObjectRef::Secret { name: name.clone(), key: "value".to_string() });
        }

        if let Some(default) = &config.outgoing_auth.default {
            collect_strategy_secret(default, &mut refs);
        }
        for strategy in config.outgoing_auth.backends.values() {
            collect_strategy_secret(strategy, &mut refs);
        }

        Self { refs }
    }
}

fn collect_strategy_secret(strategy: &BackendAuthStrategy, refs: &mut HashSet<ObjectRef>) {
    let name = match strategy {
        BackendAuthStrategy::HeaderInjection { header_value_env: Some(name), .. } => Some(name),
        BackendAuthStrategy::TokenExchange { client_secret_env: Some(name), .. } => Some(name),
        _ => None,
    };
    if let Some(name) = name {
        refs.insert(ObjectRef::Secret { name: name.clone(), key: "value".to_string() });
    }
}

impl ReferenceWatcher for ConfigReferenceWatcher {
    fn references(&self, changed: &ObjectRef) -> bool {
        self.refs.contains(changed)
    }
}
