//! Reconcile: turn a declared `Config` into a materialized, checksummed
//! document plus a `DeploymentSpec` that references it by content hash,
//! and an `ObjectStatus` record the control loop publishes back.
//!
//! Grounded on the teacher's `mcp/registry/store.rs`, which already
//! caches compiled registry artifacts by content hash before publishing
//! them; here the same "compute the canonical checksum, then publish"
//! shape produces both the materialized document and the status in one
//! pass so a reader never observes a `DeploymentSpec` whose checksum
//! doesn't match the document it names.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::error::ConfigError;

/// A reference to the declared object that owns a materialized child, so
/// deleting the owner cascades to everything reconciled from it.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl OwnerReference {
    fn for_config(name: &str, uid: &str) -> Self {
        Self { api_version: "vmcp.toolhive.stacklok.dev/v1alpha1".to_string(), kind: "VirtualMCPServer".to_string(), name: name.to_string(), uid: uid.to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedConfig {
    pub bytes: Vec<u8>,
    pub checksum: String,
    pub owner: OwnerReference,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSpec {
    pub name: String,
    pub generation: u64,
    pub config_checksum: String,
    pub owner: OwnerReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Pending,
    Ready,
    Failed,
    Terminating,
}

#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub kind: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectStatus {
    pub observed_generation: u64,
    pub phase: Phase,
    pub conditions: Vec<Condition>,
}

impl ObjectStatus {
    fn ready(generation: u64) -> Self {
        Self {
            observed_generation: generation,
            phase: Phase::Ready,
            conditions: vec![
                Condition {
                    kind: "PodTemplateValid".to_string(),
                    status: true,
                    reason: "PodTemplateValid".to_string(),
                    message: "embedded pod template is valid".to_string(),
                },
                Condition { kind: "Ready".to_string(), status: true, reason: "ReconcileSucceeded".to_string(), message: "reconcile succeeded".to_string() },
            ],
        }
    }

    /// `pod_template_invalid` distinguishes a failure in the embedded pod
    /// template (surfaced via `PodTemplateValid`) from any other config
    /// validation failure; either way the object transitions to `Failed`.
    fn failed(generation: u64, message: String, pod_template_invalid: bool) -> Self {
        let pod_template_condition = if pod_template_invalid {
            Condition { kind: "PodTemplateValid".to_string(), status: false, reason: "PodTemplateInvalid".to_string(), message: message.clone() }
        } else {
            Condition {
                kind: "PodTemplateValid".to_string(),
                status: true,
                reason: "PodTemplateValid".to_string(),
                message: "embedded pod template is valid".to_string(),
            }
        };
        Self {
            observed_generation: generation,
            phase: Phase::Failed,
            conditions: vec![
                pod_template_condition,
                Condition { kind: "Ready".to_string(), status: false, reason: "ConfigInvalid".to_string(), message },
            ],
        }
    }

    /// Published once the declared object's deletion has been observed and
    /// its children are being torn down; deletion of the owner cascades to
    /// every child carrying its `OwnerReference` so this phase is
    /// transitional rather than terminal.
    pub fn terminating(generation: u64) -> Self {
        Self {
            observed_generation: generation,
            phase: Phase::Terminating,
            conditions: vec![Condition {
                kind: "Ready".to_string(),
                status: false,
                reason: "Terminating".to_string(),
                message: "object is being deleted; cascading deletion of owned children".to_string(),
            }],
        }
    }
}

pub struct ReconcileOutcome {
    pub materialized: MaterializedConfig,
    pub deployment: DeploymentSpec,
    pub status: ObjectStatus,
}

/// Did a validation failure originate in the embedded pod template, or
/// elsewhere in the config? Threaded separately from the joined error
/// message so the caller can pick the right status condition without
/// re-parsing field-prefixed text.
struct Failure {
    message: String,
    pod_template_invalid: bool,
}

fn validate_and_prepare(config: Config) -> Result<Config, Failure> {
    let mut config = config;
    crate::config::fill_defaults(&mut config);
    let result = crate::config::validate(&config);
    if result.is_valid() {
        return Ok(config);
    }
    let pod_template_invalid = result.errors.iter().any(|e| e.field.starts_with("deployment"));
    let message = result.errors.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join("; ");
    Err(Failure { message, pod_template_invalid })
}

fn materialize(name: &str, generation: u64, owner_uid: &str, prepared: &Config) -> Result<ReconcileOutcome, ConfigError> {
    let bytes = serde_json::to_vec(prepared).map_err(|e| ConfigError::Other(e.to_string()))?;
    let checksum = checksum_of(&bytes);
    let owner = OwnerReference::for_config(name, owner_uid);

    Ok(ReconcileOutcome {
        materialized: MaterializedConfig { bytes, checksum: checksum.clone(), owner: owner.clone() },
        deployment: DeploymentSpec { name: name.to_string(), generation, config_checksum: checksum, owner },
        status: ObjectStatus::ready(generation),
    })
}

/// Validate and materialize `config` for generation `generation`, owned by
/// `owner_uid`. On a validation failure, returns `Err`; callers that want a
/// published `ObjectStatus` even on failure should use `reconcile_to_status`
/// instead.
pub fn reconcile(name: &str, generation: u64, owner_uid: &str, config: Config) -> Result<ReconcileOutcome, ConfigError> {
    let prepared = validate_and_prepare(config).map_err(|f| ConfigError::Other(f.message))?;
    materialize(name, generation, owner_uid, &prepared)
}

/// Same as `reconcile`, but never returns `Err`: a validation failure is
/// folded into a `Failed` `ObjectStatus` so the control loop always has
/// something to publish back to the declared object.
pub fn reconcile_to_status(name: &str, generation: u64, owner_uid: &str, config: Config) -> (Option<ReconcileOutcome>, ObjectStatus) {
    let prepared = match validate_and_prepare(config) {
        Ok(prepared) => prepared,
        Err(f) => return (None, ObjectStatus::failed(generation, f.message, f.pod_template_invalid)),
    };
    match materialize(name, generation, owner_uid, &prepared) {
        Ok(outcome) => {
            let status = outcome.status.clone();
            (Some(outcome), status)
        }
        Err(e) => (None, ObjectStatus::failed(generation, e.to_string(), false)),
    }
}

fn checksum_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Config;

    #[test]
    fn reconcile_produces_matching_checksum() {
        let config = Config::new("svc", "grp");
        let outcome = reconcile("svc", 1, "uid-1", config).unwrap();
        assert_eq!(outcome.materialized.checksum, outcome.deployment.config_checksum);
        assert_eq!(outcome.status.phase, Phase::Ready);
        assert!(outcome.status.conditions.iter().any(|c| c.kind == "PodTemplateValid" && c.status));
        assert_eq!(outcome.materialized.owner.name, "svc");
        assert_eq!(outcome.deployment.owner.uid, "uid-1");
    }

    #[test]
    fn invalid_config_yields_failed_status_without_panicking() {
        let config = Config::new("", "grp");
        let (outcome, status) = reconcile_to_status("svc", 1, "uid-1", config);
        assert!(outcome.is_none());
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.observed_generation, 1);
        assert!(status.conditions.iter().any(|c| c.kind == "PodTemplateValid" && c.status));
    }

    #[test]
    fn invalid_pod_template_sets_pod_template_invalid_condition() {
        let mut config = Config::new("svc", "grp");
        config.deployment = Some(serde_json::json!({"podTemplate": {"containers": []}}));
        let (outcome, status) = reconcile_to_status("svc", 1, "uid-1", config);
        assert!(outcome.is_none());
        assert_eq!(status.phase, Phase::Failed);
        assert!(status.conditions.iter().any(|c| c.kind == "PodTemplateValid" && !c.status));
    }

    #[test]
    fn same_config_reconciles_to_same_checksum() {
        let a = reconcile("svc", 1, "uid-1", Config::new("svc", "grp")).unwrap();
        let b = reconcile("svc", 2, "uid-1", Config::new("svc", "grp")).unwrap();
        assert_eq!(a.materialized.checksum, b.materialized.checksum);
    }
}
