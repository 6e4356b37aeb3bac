//! Strict YAML document loader.
//!
//! Parses a single `Config` document with `#[serde(deny_unknown_fields)]`
//! already enforced by the model types, then fails fast on any
//! environment-variable indirection (`headerValueEnv`, `clientSecretEnv`,
//! ...) that points at a variable which is unset or empty. The referenced
//! secret value itself is never copied into the `Config` tree: resolution
//! happens again, lazily, wherever the runtime actually needs the secret
//! (`auth::strategy`), so a materialized/checksummed config document never
//! carries secret material at rest.

use std::collections::HashMap;

use crate::config::model::{BackendAuthStrategy, Config, IncomingAuth};
use crate::error::ConfigError;

/// Abstraction over the process environment, injected for testability.
pub trait EnvReader: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads `std::env::var` directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvReader;

impl EnvReader for ProcessEnvReader {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed map, for unit tests and for the document loader's own test
/// suite.
#[derive(Debug, Clone, Default)]
pub struct MapEnvReader(pub HashMap<String, String>);

impl MapEnvReader {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl EnvReader for MapEnvReader {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

pub struct DocumentLoader;

impl DocumentLoader {
    /// Parse and fully prepare (env-check, default-fill, validate) a
    /// `Config` document from a YAML string.
    pub fn load(yaml: &str, env: &dyn EnvReader) -> Result<Config, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::invalid("<document>", e.to_string()))?;

        check_env_references(&config, env)?;

        crate::config::prepare(config)
    }
}

/// Fail fast if any `*Env`-suffixed field names an environment variable
/// that is unset or set to the empty string. Does not read the literal
/// secret into the returned `Config`.
fn check_env_references(config: &Config, env: &dyn EnvReader) -> Result<(), ConfigError> {
    if let IncomingAuth::Oidc { client_secret_env, .. } = &config.incoming_auth {
        if let Some(name) = client_secret_env {
            require_non_empty(env, name)?;
        }
    }

    if let Some(default) = &config.outgoing_auth.default {
        check_strategy_env_references(default, env)?;
    }
    for strategy in config.outgoing_auth.backends.values() {
        check_strategy_env_references(strategy, env)?;
    }

    Ok(())
}

fn check_strategy_env_references(strategy: &BackendAuthStrategy, env: &dyn EnvReader) -> Result<(), ConfigError> {
    match strategy {
        BackendAuthStrategy::Unauthenticated => Ok(()),
        BackendAuthStrategy::HeaderInjection { header_value_env, .. } => {
            if let Some(name) = header_value_env {
                require_non_empty(env, name)?;
            }
            Ok(())
        }
        BackendAuthStrategy::TokenExchange { client_secret_env, .. } => {
            if let Some(name) = client_secret_env {
                require_non_empty(env, name)?;
            }
            Ok(())
        }
    }
}

fn require_non_empty(env: &dyn EnvReader, name: &str) -> Result<(), ConfigError> {
    match env.get(name) {
        Some(value) if !value.is_empty() => Ok(()),
        Some(_) => Err(ConfigError::Invalid {
            field: name.to_string(),
            message: "environment variable is set but empty".to_string(),
        }),
        None => Err(ConfigError::EnvVarMissing { name: name.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
name: my-gateway
group: default-group
incomingAuth:
  type: anonymous
"#
    }

    #[test]
    fn loads_minimal_document() {
        let env = MapEnvReader::new();
        let config = DocumentLoader::load(minimal_yaml(), &env).unwrap();
        assert_eq!(config.name, "my-gateway");
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let yaml = format!("{}\nbogus: true\n", minimal_yaml());
        let env = MapEnvReader::new();
        assert!(DocumentLoader::load(&yaml, &env).is_err());
    }

    #[test]
    fn fails_fast_on_missing_env_var() {
        let yaml = r#"
name: g
group: grp
incomingAuth:
  type: anonymous
outgoingAuth:
  default:
    type: headerInjection
    headerName: X-Api-Key
    headerValueEnv: MISSING_VAR
"#;
        let env = MapEnvReader::new();
        let err = DocumentLoader::load(yaml, &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarMissing { name } if name == "MISSING_VAR"));
    }

    #[test]
    fn fails_fast_on_empty_env_var() {
        let yaml = r#"
name: g
group: grp
incomingAuth:
  type: anonymous
outgoingAuth:
  default:
    type: headerInjection
    headerName: X-Api-Key
    headerValueEnv: EMPTY_VAR
"#;
        let env = MapEnvReader::new().with("EMPTY_VAR", "");
        let err = DocumentLoader::load(yaml, &env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn accepts_present_env_var() {
        let yaml = r#"
name: g
group: grp
incomingAuth:
  type: anonymous
outgoingAuth:
  default:
    type: headerInjection
    headerName: X-Api-Key
    headerValueEnv: PRESENT_VAR
"#;
        let env = MapEnvReader::new().with("PRESENT_VAR", "secret-value");
        let config = DocumentLoader::load(yaml, &env).unwrap();
        assert_eq!(config.name, "g");
    }
}
