//! Config validation: a single accumulating pass that reports every problem
//! it finds rather than stopping at the first one.
//!
//! Grounded on the teacher's `mcp/registry/validation.rs`, whose
//! `ValidationResult` carries `errors` and `warnings` vectors built up
//! across many independent checks, and whose dependency-cycle detector uses
//! a DFS with an explicit recursion stack — reused here for composite-tool
//! `dependsOn` graphs.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::model::{
    BackendAuthStrategy, Config, CompositeTool, ConflictResolution, IncomingAuth, WorkflowStep,
};
use crate::workflow::template;

/// One field-scoped validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Accumulated validation outcome. Errors make the config unusable;
/// warnings flag likely mistakes that don't block loading.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(field, message));
    }

    fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validate a fully-defaulted `Config`. Does not mutate; callers should run
/// `defaults::fill_defaults` first so required-field checks see the same
/// shape the runtime will see.
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.name.trim().is_empty() {
        result.error("name", "name must not be empty");
    }
    if config.group.trim().is_empty() {
        result.error("group", "group must not be empty");
    }

    validate_incoming_auth(config, &mut result);
    validate_outgoing_auth(config, &mut result);
    validate_aggregation(config, &mut result);
    validate_failure_handling(config, &mut result);
    validate_pod_template(config, &mut result);

    let mut seen_tool_names = HashSet::new();
    for tool in &config.composite_tools {
        if !seen_tool_names.insert(tool.name.clone()) {
            result.error("compositeTools", format!("duplicate composite tool name '{}'", tool.name));
        }
        result.merge(validate_composite_tool(tool));
    }

    result
}

fn validate_incoming_auth(config: &Config, result: &mut ValidationResult) {
    if let IncomingAuth::Oidc { issuer, audience, .. } = &config.incoming_auth {
        if issuer.trim().is_empty() {
            result.error("incomingAuth.issuer", "issuer is required for oidc incoming auth");
        }
        if audience.trim().is_empty() {
            result.error("incomingAuth.audience", "audience is required for oidc incoming auth");
        }
    }
}

fn validate_backend_auth_strategy(field: &str, strategy: &BackendAuthStrategy, result: &mut ValidationResult) {
    match strategy {
        BackendAuthStrategy::Unauthenticated => {}
        BackendAuthStrategy::HeaderInjection { header_name, header_value, header_value_env } => {
            if header_name.trim().is_empty() {
                result.error(format!("{field}.headerName"), "headerName is required for headerInjection");
            }
            match (header_value, header_value_env) {
                (Some(_), Some(_)) => {
                    result.error(
                        format!("{field}"),
                        "headerInjection may set headerValue or headerValueEnv, not both",
                    );
                }
                (None, None) => {
                    result.error(
                        format!("{field}"),
                        "headerInjection requires one of headerValue or headerValueEnv",
                    );
                }
                _ => {}
            }
        }
        BackendAuthStrategy::TokenExchange { token_url, client_id, audience, subject_token_type, .. } => {
            if token_url.trim().is_empty() {
                result.error(format!("{field}.tokenUrl"), "tokenUrl is required for tokenExchange");
            }
            if client_id.trim().is_empty() {
                result.error(format!("{field}.clientId"), "clientId is required for tokenExchange");
            }
            if audience.trim().is_empty() {
                result.error(format!("{field}.audience"), "audience is required for tokenExchange");
            }
            if subject_token_type.trim().is_empty() {
                result.error(
                    format!("{field}.subjectTokenType"),
                    "subjectTokenType is required for tokenExchange",
                );
            }
        }
    }
}

fn validate_outgoing_auth(config: &Config, result: &mut ValidationResult) {
    if let Some(default) = &config.outgoing_auth.default {
        validate_backend_auth_strategy("outgoingAuth.default", default, result);
    }
    for (backend, strategy) in &config.outgoing_auth.backends {
        validate_backend_auth_strategy(&format!("outgoingAuth.backends.{backend}"), strategy, result);
    }
}

fn validate_aggregation(config: &Config, result: &mut ValidationResult) {
    let agg = &config.aggregation;

    match agg.conflict_resolution {
        ConflictResolution::Priority => {
            let order = agg.config.priority_order.as_ref();
            if order.map(Vec::is_empty).unwrap_or(true) {
                result.error(
                    "aggregation.config.priorityOrder",
                    "priorityOrder is required and must be non-empty for the priority conflict resolution strategy",
                );
            }
        }
        ConflictResolution::Manual => {
            let any_override =
                agg.tools.iter().any(|t| !t.overrides.is_empty() || t.exclude_all || !t.filter.is_empty());
            if !any_override {
                result.warn(
                    "aggregation.tools",
                    "manual conflict resolution is configured but no workload declares overrides, filters, or excludeAll",
                );
            }
        }
        ConflictResolution::Prefix => {}
    }

    let mut seen_workloads = HashSet::new();
    for tool_config in &agg.tools {
        if !seen_workloads.insert(tool_config.workload.clone()) {
            result.error("aggregation.tools", format!("duplicate workload entry '{}'", tool_config.workload));
        }
        for (tool_name, over) in &tool_config.overrides {
            if over.name.is_none() && over.description.is_none() {
                result.error(
                    format!("aggregation.tools.{}.overrides.{tool_name}", tool_config.workload),
                    "override must set at least one of name or description",
                );
            }
        }
    }
}

fn validate_failure_handling(config: &Config, result: &mut ValidationResult) {
    let fh = &config.operational.failure_handling;

    if let Some(timeout) = fh.health_check_timeout {
        if timeout.as_std() >= fh.health_check_interval.as_std() {
            result.error(
                "operational.failureHandling.healthCheckTimeout",
                "healthCheckTimeout must be less than healthCheckInterval",
            );
        }
    }

    if fh.circuit_breaker.enabled {
        if fh.circuit_breaker.failure_threshold == 0 {
            result.error(
                "operational.failureHandling.circuitBreaker.failureThreshold",
                "failureThreshold must be at least 1 when the circuit breaker is enabled",
            );
        }
        if fh.circuit_breaker.timeout.as_std().is_zero() {
            result.error(
                "operational.failureHandling.circuitBreaker.timeout",
                "timeout must be greater than zero when the circuit breaker is enabled",
            );
        }
    }
}

/// Shallow shape check for the embedded pod template under
/// `deployment.podTemplate`. Deep k8s pod-schema conformance is out of
/// scope; this only catches the shapes that would otherwise surface as an
/// opaque deployment-creation failure downstream. Errors from this
/// function are distinguished by their `deployment.podTemplate` field
/// prefix so the control loop can report them under the dedicated
/// `PodTemplateValid` status condition instead of the generic one.
fn validate_pod_template(config: &Config, result: &mut ValidationResult) {
    let Some(deployment) = &config.deployment else { return };

    let Some(deployment) = deployment.as_object() else {
        result.error("deployment", "deployment must be a JSON object");
        return;
    };

    let Some(pod_template) = deployment.get("podTemplate") else { return };

    let Some(pod_template) = pod_template.as_object() else {
        result.error("deployment.podTemplate", "podTemplate must be a JSON object");
        return;
    };

    let containers = pod_template.get("containers").and_then(Value::as_array);
    match containers {
        None => {
            result.error("deployment.podTemplate.containers", "podTemplate must declare at least one container");
        }
        Some(containers) if containers.is_empty() => {
            result.error("deployment.podTemplate.containers", "podTemplate must declare at least one container");
        }
        Some(containers) => {
            for (i, container) in containers.iter().enumerate() {
                let Some(container) = container.as_object() else {
                    result.error(format!("deployment.podTemplate.containers[{i}]"), "container must be a JSON object");
                    continue;
                };
                let name_ok = container.get("name").and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty());
                if !name_ok {
                    result.error(format!("deployment.podTemplate.containers[{i}].name"), "container must have a non-empty name");
                }
                let image_ok = container.get("image").and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty());
                if !image_ok {
                    result.error(format!("deployment.podTemplate.containers[{i}].image"), "container must have a non-empty image");
                }
            }
        }
    }
}

fn validate_composite_tool(tool: &CompositeTool) -> ValidationResult {
    let mut result = ValidationResult::default();
    let prefix = format!("compositeTools.{}", tool.name);

    if !tool.parameters.is_object() {
        result.error(format!("{prefix}.parameters"), "parameters must be a JSON Schema object");
    } else if tool.parameters.get("type").and_then(Value::as_str) != Some("object") {
        result.warn(format!("{prefix}.parameters"), "parameters schema should declare type: object at its root");
    }

    let mut seen_ids = HashSet::new();
    let mut by_id: HashMap<&str, &WorkflowStep> = HashMap::new();
    for step in &tool.steps {
        if !seen_ids.insert(step.id.clone()) {
            result.error(format!("{prefix}.steps"), format!("duplicate step id '{}'", step.id));
        }
        by_id.insert(step.id.as_str(), step);
    }

    for step in &tool.steps {
        for dep in &step.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                result.error(
                    format!("{prefix}.steps.{}.dependsOn", step.id),
                    format!("dependsOn references unknown step '{dep}'"),
                );
            }
        }
    }

    if let Some(cycle) = find_cycle(&tool.steps) {
        result.error(format!("{prefix}.steps"), format!("dependsOn graph has a cycle: {}", cycle.join(" -> ")));
    }

    for step in &tool.steps {
        validate_step_templates(&prefix, step, &by_id, &mut result);
    }

    result
}

/// DFS with an explicit recursion stack, mirroring the teacher's dependency
/// cycle detector. Returns the cycle path (for the error message) if found.
fn find_cycle(steps: &[WorkflowStep]) -> Option<Vec<String>> {
    let by_id: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.id.as_str(), s)).collect();

    #[derive(PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<String> = Vec::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a WorkflowStep>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                stack.push(id.to_string());
                return Some(stack.clone());
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        stack.push(id.to_string());
        if let Some(step) = by_id.get(id) {
            for dep in &step.depends_on {
                if let Some(cycle) = visit(dep.as_str(), by_id, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }

    for step in steps {
        if let Some(cycle) = visit(step.id.as_str(), &by_id, &mut marks, &mut stack) {
            return Some(cycle);
        }
        stack.clear();
    }
    None
}

/// Collect every string leaf out of a `serde_json::Value` tree, for
/// template-syntax and reference checking inside `arguments`/`schema`.
fn collect_string_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_string_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_string_leaves(v, out)),
        _ => {}
    }
}

fn validate_step_templates(
    prefix: &str,
    step: &WorkflowStep,
    by_id: &HashMap<&str, &WorkflowStep>,
    result: &mut ValidationResult,
) {
    let mut templates = Vec::new();
    if let Some(args) = &step.arguments {
        collect_string_leaves(args, &mut templates);
    }
    if let Some(condition) = &step.condition {
        templates.push(condition.clone());
    }
    if let Some(message) = &step.message {
        templates.push(message.clone());
    }

    let field = format!("{prefix}.steps.{}", step.id);

    for tmpl in &templates {
        if let Err(e) = template::check_syntax(tmpl) {
            result.error(field.clone(), format!("invalid template '{tmpl}': {e}"));
        }

        for (ref_step_id, ref_field) in template::scan_step_output_refs(tmpl) {
            let Some(referenced) = by_id.get(ref_step_id.as_str()) else {
                result.error(field.clone(), format!("references unknown step '{ref_step_id}' in output binding"));
                continue;
            };

            if referenced.is_skippable() {
                let has_default = referenced
                    .default_results
                    .as_ref()
                    .map(|v| if ref_field.is_empty() { true } else { v.get(&ref_field).is_some() })
                    .unwrap_or(false);
                if !has_default {
                    result.error(
                        field.clone(),
                        format!(
                            "references '.steps.{ref_step_id}.output.{ref_field}' but step '{ref_step_id}' is skippable and its defaultResults has no entry for '{ref_field}'"
                        ),
                    );
                }
            }
        }
    }
}
