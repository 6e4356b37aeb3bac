//! Cluster-native object-store adapter.
//!
//! Resolves the same `Config` model from a cluster-controlled object graph
//! instead of a flat YAML document: secrets/config-maps referenced by name,
//! and composite-tool bundles referenced by `compositeToolRefs`. Storage is
//! abstracted behind a trait rather than a concrete client, mirroring the
//! teacher's `mcp/registry/store.rs`.

use async_trait::async_trait;

use crate::config::model::{BackendAuthStrategy, CompositeTool, Config, IncomingAuth};
use crate::error::{ConfigError, ResolutionError};

/// A reference to a value stored outside the config document itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Secret { name: String, key: String },
    ConfigMap { name: String, key: String },
    Bundle { name: String },
}

/// Storage abstraction for the cluster-native surface. A real
/// implementation talks to the cluster's object API; tests provide an
/// in-memory double.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn get_secret(&self, name: &str, key: &str) -> Result<String, ResolutionError>;
    async fn get_config_map(&self, name: &str, key: &str) -> Result<String, ResolutionError>;
    async fn get_bundle(&self, name: &str) -> Result<String, ResolutionError>;
}

pub struct ObjectStoreLoader;

impl ObjectStoreLoader {
    /// Resolve `config.compositeToolRefs` against the object store, fold
    /// the fetched composite tools into `config.compositeTools`, verify
    /// every secret reference exists (without copying secret values into
    /// the returned `Config`), and run the same default-fill/validate pass
    /// the document loader runs.
    pub async fn load(mut config: Config, client: &dyn ObjectStoreClient) -> Result<Config, ConfigError> {
        check_secret_references(&config, client).await?;

        let mut seen: std::collections::HashSet<String> =
            config.composite_tools.iter().map(|t| t.name.clone()).collect();

        for ref_name in config.composite_tool_refs.clone() {
            let bundle = client
                .get_bundle(&ref_name)
                .await
                .map_err(|e| ConfigError::Other(format!("composite tool ref '{ref_name}': {e}")))?;
            let tool: CompositeTool = serde_yaml::from_str(&bundle)
                .map_err(|e| ConfigError::invalid(format!("compositeToolRefs.{ref_name}"), e.to_string()))?;
            if !seen.insert(tool.name.clone()) {
                return Err(ConfigError::invalid(
                    format!("compositeToolRefs.{ref_name}"),
                    format!("composite tool name '{}' collides with an existing entry", tool.name),
                ));
            }
            config.composite_tools.push(tool);
        }

        crate::config::prepare(config)
    }
}

async fn check_secret_references(config: &Config, client: &dyn ObjectStoreClient) -> Result<(), ConfigError> {
    if let IncomingAuth::Oidc { client_secret_env, .. } = &config.incoming_auth {
        if let Some(secret_name) = client_secret_env {
            ensure_secret_exists(client, secret_name).await?;
        }
    }

    if let Some(default) = &config.outgoing_auth.default {
        check_strategy_secret_references(default, client).await?;
    }
    for strategy in config.outgoing_auth.backends.values() {
        check_strategy_secret_references(strategy, client).await?;
    }

    Ok(())
}

async fn check_strategy_secret_references(
    strategy: &BackendAuthStrategy,
    client: &dyn ObjectStoreClient,
) -> Result<(), ConfigError> {
    match strategy {
        BackendAuthStrategy::Unauthenticated => Ok(()),
        BackendAuthStrategy::HeaderInjection { header_value_env, .. } => {
            if let Some(name) = header_value_env {
                ensure_secret_exists(client, name).await?;
            }
            Ok(())
        }
        BackendAuthStrategy::TokenExchange { client_secret_env, .. } => {
            if let Some(name) = client_secret_env {
                ensure_secret_exists(client, name).await?;
            }
            Ok(())
        }
    }
}

/// In the object-store surface a `*Env` field names a secret object, not a
/// process environment variable; this existence check reuses the same
/// field so the unified `Config` model does not need two parallel sets of
/// indirection fields for the two loading surfaces.
async fn ensure_secret_exists(client: &dyn ObjectStoreClient, secret_name: &str) -> Result<(), ConfigError> {
    client
        .get_secret(secret_name, "value")
        .await
        .map(|_| ())
        .map_err(|_| ConfigError::Invalid {
            field: secret_name.to_string(),
            message: "referenced secret not found in object store".to_string(),
        })
}
