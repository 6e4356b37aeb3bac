//! Unified configuration: data model, defaulting, and validation.

pub mod defaults;
pub mod model;
pub mod validate;

pub use defaults::{default_operational_config, fill_defaults};
pub use model::{
    AggregationConfig, Authz, AuthzKind, BackendAuthStrategy, CircuitBreakerConfig, CompositeTool,
    ConflictResolution, ConflictResolutionConfig, Config, ElicitationOutcomeAction, ErrorAction,
    FailureHandlingConfig, IncomingAuth, OnError, OperationalConfig, OutgoingAuth, OutgoingAuthSource,
    OutputConfig, OutputProperty, OutputPropertyType, PartialFailureMode, StaticBackend, StepType, TimeoutsConfig,
    Transport, ToolOverride, WorkflowStep, WorkloadToolConfig,
};
pub use validate::{validate, ValidationIssue, ValidationResult};

use crate::error::ConfigError;

/// Load-time helper: fill defaults then validate, turning accumulated
/// errors into a single `ConfigError` for callers that just want a
/// pass/fail outcome. Callers that want the full `ValidationResult`
/// (e.g. to surface warnings) should call `fill_defaults` and `validate`
/// directly instead.
pub fn prepare(mut config: Config) -> Result<Config, ConfigError> {
    fill_defaults(&mut config);
    let result = validate(&config);
    if !result.is_valid() {
        let joined =
            result.errors.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join("; ");
        return Err(ConfigError::Other(joined));
    }
    Ok(config)
}
