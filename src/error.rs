//! Error taxonomy shared across the vMCP runtime.
//!
//! Each component defines its own narrow error enum (see `config::validate`,
//! `auth::strategy`, `workflow::executor`, ...); this module defines the
//! cross-cutting categories callers use to decide how to react, per the
//! taxonomy in the specification's error-handling design.

use std::fmt;

use thiserror::Error;

/// Top-level error category. Individual component errors carry more detail
/// and convert into one of these via `From` impls so callers can match on
/// category without caring which component raised it.
#[derive(Debug, Error)]
pub enum VmcpError {
    /// Pre-runtime configuration error. Fatal for the affected object.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A reference (env var, secret, config-map, composite-tool-ref) could
    /// not be resolved. Fatal until the referenced object is fixed.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Incoming auth rejected (401/403) or outgoing auth exchange failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Backend RPC failure. Recovered at the workflow layer per `onError`.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// A deadline elapsed; propagated as cancellation to children.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The circuit for a backend is open; the call was short-circuited
    /// without reaching the backend.
    #[error("circuit open for backend '{backend}', retry after {retry_after:?}")]
    CircuitOpen {
        backend: String,
        retry_after: std::time::Duration,
    },

    /// Workflow structured output failed schema coercion.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("environment variable '{name}' not set or empty")]
    EnvVarMissing { name: String },

    #[error("{0}")]
    Other(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("environment variable '{name}' not found")]
    EnvVarNotFound { name: String },

    #[error("referenced object '{kind}/{name}' not found")]
    ObjectNotFound { kind: String, name: String },

    #[error("composite tool '{0}' not found")]
    CompositeToolNotFound(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("incoming token rejected: {0}")]
    IncomingRejected(String),

    #[error("token exchange failed for backend '{backend}': {message}")]
    ExchangeFailed { backend: String, message: String },

    #[error("token exchange endpoint returned status {status}")]
    ExchangeHttpStatus { status: u16 },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend '{backend}' tool call '{tool}' failed: {message}")]
    CallFailed { backend: String, tool: String, message: String },

    #[error("backend '{backend}' is unhealthy")]
    Unhealthy { backend: String },

    #[error("transport error talking to backend '{backend}': {message}")]
    Transport { backend: String, message: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("field '{field}' failed schema validation: {message}")]
    SchemaMismatch { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// A user-visible failure, as required by the error-handling design: step
/// id (if any), tool name (if any), category, and a short reason.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserVisibleFailure {
    pub step_id: Option<String>,
    pub tool_name: Option<String>,
    pub category: &'static str,
    pub reason: String,
}

impl fmt::Display for UserVisibleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.category)?;
        if let Some(step) = &self.step_id {
            write!(f, " step={step}")?;
        }
        if let Some(tool) = &self.tool_name {
            write!(f, " tool={tool}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl VmcpError {
    pub fn category(&self) -> &'static str {
        match self {
            VmcpError::Config(_) => "ConfigError",
            VmcpError::Resolution(_) => "ResolutionError",
            VmcpError::Auth(_) => "AuthError",
            VmcpError::Backend(_) => "BackendError",
            VmcpError::Timeout(_) => "TimeoutError",
            VmcpError::CircuitOpen { .. } => "CircuitOpenError",
            VmcpError::Validation(_) => "ValidationError",
        }
    }

    pub fn into_user_visible(
        self,
        step_id: Option<String>,
        tool_name: Option<String>,
    ) -> UserVisibleFailure {
        let category = self.category();
        UserVisibleFailure { step_id, tool_name, category, reason: self.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_visible_failure_renders_category_and_reason() {
        let err = VmcpError::Backend(BackendError::CallFailed {
            backend: "github".into(),
            tool: "create_issue".into(),
            message: "connection reset".into(),
        });
        let visible = err.into_user_visible(Some("step1".into()), Some("create_issue".into()));
        let rendered = visible.to_string();
        assert!(rendered.contains("BackendError"));
        assert!(rendered.contains("step1"));
        assert!(rendered.contains("create_issue"));
    }

    #[test]
    fn config_error_invalid_builder() {
        let err = ConfigError::invalid("name", "name is required");
        assert_eq!(err.to_string(), "name: name is required");
    }
}
