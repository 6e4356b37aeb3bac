//! Unified configuration model.
//!
//! One Rust type tree serves both the YAML deployment surface (document
//! loader) and the cluster-controlled custom-resource surface (object-store
//! adapter) — the spec's "Unified Config" record. Dynamic/open-shaped
//! fragments (JSON Schema) stay as `serde_json::Value` rather than being
//! reflected into Rust types, per the redesign note to replace the
//! original's runtime reflection with tagged-variant records plus a neutral
//! JSON-object type where the shape is genuinely open.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::duration::{duration_option, Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub group: String,

    pub incoming_auth: IncomingAuth,

    #[serde(default)]
    pub outgoing_auth: OutgoingAuth,

    #[serde(default)]
    pub backends: Vec<StaticBackend>,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub composite_tools: Vec<CompositeTool>,

    #[serde(default)]
    pub composite_tool_refs: Vec<String>,

    #[serde(default)]
    pub operational: OperationalConfig,

    #[serde(default)]
    pub telemetry: Option<serde_json::Value>,

    #[serde(default)]
    pub audit: Option<serde_json::Value>,

    #[serde(default)]
    pub optimizer: Option<serde_json::Value>,

    /// Cluster-native deployment overrides for the object-store surface,
    /// including an embedded pod template (`deployment.podTemplate`).
    /// Left as an open JSON object: the control loop checks only the
    /// shape needed to set `PodTemplateValid`, not full pod schema
    /// conformance.
    #[serde(default)]
    pub deployment: Option<serde_json::Value>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Config {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            incoming_auth: IncomingAuth::Anonymous,
            ..Default::default()
        }
    }
}

impl Default for IncomingAuth {
    fn default() -> Self {
        IncomingAuth::Anonymous
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IncomingAuth {
    Anonymous,
    Local,
    Oidc {
        issuer: String,
        #[serde(default)]
        client_id: Option<String>,
        audience: String,
        #[serde(default)]
        resource: Option<String>,
        #[serde(default)]
        scopes: Vec<String>,
        #[serde(default)]
        client_secret_env: Option<String>,
        #[serde(default)]
        allow_private_ip: bool,
        #[serde(default)]
        allow_http: bool,
        #[serde(default)]
        authz: Option<Authz>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authz {
    #[serde(rename = "type")]
    pub kind: AuthzKind,
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthzKind {
    Cedar,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingAuth {
    #[serde(default)]
    pub source: OutgoingAuthSource,
    #[serde(default)]
    pub default: Option<BackendAuthStrategy>,
    #[serde(default)]
    pub backends: HashMap<String, BackendAuthStrategy>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutgoingAuthSource {
    #[default]
    Inline,
    Discovered,
}

/// Tagged variant: exactly one of header-injection / token-exchange /
/// unauthenticated is populated, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendAuthStrategy {
    Unauthenticated,
    HeaderInjection {
        header_name: String,
        #[serde(default)]
        header_value: Option<String>,
        #[serde(default)]
        header_value_env: Option<String>,
    },
    TokenExchange {
        token_url: String,
        client_id: String,
        #[serde(default)]
        client_secret_env: Option<String>,
        audience: String,
        #[serde(default)]
        scopes: Vec<String>,
        subject_token_type: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    Sse,
    StreamableHttp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticBackend {
    pub name: String,
    pub url: String,
    pub transport: Transport,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default)]
    pub config: ConflictResolutionConfig,
    #[serde(default)]
    pub tools: Vec<WorkloadToolConfig>,
    #[serde(default)]
    pub exclude_all_tools: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    #[default]
    Prefix,
    Priority,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolutionConfig {
    #[serde(default)]
    pub prefix_format: Option<String>,
    #[serde(default)]
    pub priority_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadToolConfig {
    pub workload: String,
    #[serde(default)]
    pub tool_config_ref: Option<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub overrides: HashMap<String, ToolOverride>,
    #[serde(default)]
    pub exclude_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperationalConfig {
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub failure_handling: FailureHandlingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(default = "default_timeout")]
    pub default: Duration,
    #[serde(default)]
    pub per_workload: HashMap<String, Duration>,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self { default: default_timeout(), per_workload: HashMap::new() }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureHandlingConfig {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    #[serde(default, with = "duration_option")]
    pub health_check_timeout: Option<Duration>,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    #[serde(default)]
    pub partial_failure_mode: PartialFailureMode,
    #[serde(default = "default_status_reporting_interval")]
    pub status_reporting_interval: Duration,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for FailureHandlingConfig {
    fn default() -> Self {
        Self {
            health_check_interval: default_health_check_interval(),
            health_check_timeout: None,
            unhealthy_threshold: default_unhealthy_threshold(),
            partial_failure_mode: PartialFailureMode::default(),
            status_reporting_interval: default_status_reporting_interval(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_unhealthy_threshold() -> u32 {
    3
}
fn default_status_reporting_interval() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PartialFailureMode {
    Fail,
    #[default]
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_circuit_timeout")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { enabled: false, failure_threshold: default_failure_threshold(), timeout: default_circuit_timeout() }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_circuit_timeout() -> Duration {
    Duration::from_secs(30)
}

// ---------------------------------------------------------------------
// Composite tools
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: serde_json::Value,
    #[serde(default = "default_composite_timeout")]
    pub timeout: Duration,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

fn default_composite_timeout() -> Duration {
    Duration::from_secs(300)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    #[serde(default)]
    pub r#type: Option<StepType>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub on_decline: Option<ElicitationOutcomeAction>,
    #[serde(default)]
    pub on_cancel: Option<ElicitationOutcomeAction>,
    #[serde(default, with = "duration_option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub default_results: Option<serde_json::Value>,
}

impl WorkflowStep {
    /// Effective step type: `tool` when a tool is named and no explicit
    /// type is present, otherwise the explicit type.
    pub fn effective_type(&self) -> StepType {
        match (&self.r#type, &self.tool) {
            (Some(t), _) => *t,
            (None, Some(_)) => StepType::Tool,
            (None, None) => StepType::Elicitation,
        }
    }

    /// A step is skippable iff it has a `condition` or its `onError.action`
    /// is `continue` — per the spec's definition, used by the validator to
    /// decide whether a downstream `.output.F` reference needs a default.
    pub fn is_skippable(&self) -> bool {
        self.condition.is_some() || self.on_error.action == ErrorAction::Continue
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Tool,
    Elicitation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnError {
    #[serde(default)]
    pub action: ErrorAction,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default, with = "duration_option")]
    pub retry_delay: Option<Duration>,
}

impl Default for OnError {
    fn default() -> Self {
        Self { action: ErrorAction::Abort, retry_count: None, retry_delay: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorAction {
    #[default]
    Abort,
    Continue,
    Retry,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElicitationOutcomeAction {
    Abort,
    Continue,
    SkipRemaining,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub properties: HashMap<String, OutputProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputProperty {
    #[serde(rename = "type")]
    pub kind: OutputPropertyType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub properties: Option<HashMap<String, OutputProperty>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutputPropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}
