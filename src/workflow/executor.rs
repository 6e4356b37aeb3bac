//! Composite-tool execution: builds the `dependsOn` DAG, then runs every
//! step that becomes ready concurrently (bounded by a fan-out limit),
//! expanding templates, invoking tool/elicitation steps, and applying each
//! step's `onError` policy.
//!
//! Grounded on the teacher's `saga/executor.rs`: an injected router trait
//! (`ActionRouter` there, `StepExecutor` here) decouples the engine from
//! how a step actually reaches a backend, `StepResult`/`SagaResult`-style
//! records carry timing, and step failures are handled by an explicit
//! per-step policy rather than a single saga-wide compensation pass (this
//! crate's `onError` is per-step, not a saga compensation graph, since the
//! spec's composite tools are not required to be reversible). The
//! scheduler itself mirrors the bounded-concurrency scatter/gather shape
//! used in `aggregator::discover_and_aggregate` (a `FuturesUnordered`
//! playing the role that crate's `tokio::Semaphore`-gated task set plays),
//! generalized here from "one task per backend" to "one task per ready
//! step, re-filled as dependents become ready".

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::model::{CompositeTool, ElicitationOutcomeAction, ErrorAction, StepType, WorkflowStep};
use crate::duration::Duration;
use crate::error::BackendError;
use crate::mcp_client::NormalizedOutput;

use super::dag::topological_order;
use super::output;
use super::template::TemplateContext;

/// Default bound on how many ready steps run concurrently, matching the
/// aggregator's default discovery concurrency.
const DEFAULT_STEP_PARALLELISM: usize = 8;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("dependsOn graph has a cycle")]
    DependencyCycle,

    #[error("step '{0}' timed out")]
    StepTimeout(String),

    #[error("composite tool timed out after {0:?}")]
    ToolTimeout(std::time::Duration),

    #[error("step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("step '{0}' was declined")]
    Declined(String),

    #[error("step '{0}' was cancelled")]
    Cancelled(String),

    #[error("output assembly failed: {0}")]
    OutputAssembly(String),

    #[error("template error in step '{step_id}': {message}")]
    Template { step_id: String, message: String },
}

/// The caller's response to an elicitation step.
#[derive(Debug, Clone)]
pub enum ElicitationOutcome {
    Accepted(Value),
    Declined,
    Cancelled,
}

/// Operations the workflow engine needs from whatever actually reaches
/// backends / the calling agent. Kept deliberately narrow so the engine
/// can be unit tested against a fake.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<NormalizedOutput, BackendError>;
    async fn elicit(&self, message: &str, schema: &Value) -> Result<ElicitationOutcome, WorkflowError>;
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_id: String,
    pub output: Value,
    pub duration: std::time::Duration,
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct CompositeToolResult {
    pub output: Value,
    pub steps: Vec<StepRecord>,
}

/// What a single step's full lifecycle (condition check, run, `onError`
/// policy including retries) resolved to. Built entirely inside one
/// `run_one` future so the scheduler only has to react to a terminal
/// outcome per step.
struct StepOutcome {
    step_id: String,
    record: StepRecord,
    control: StepControl,
}

enum StepControl {
    /// Proceed: the step's dependents may now become ready.
    Proceed,
    /// `onError: abort` (or an unhandled decline/cancel): stop the whole
    /// workflow and surface this error.
    Abort(WorkflowError),
    /// `onDecline`/`onCancel: skip_remaining`: stop dispatching new steps
    /// but let already in-flight siblings finish, then assemble output
    /// from whatever completed.
    SkipRemaining,
}

pub struct WorkflowEngine<'a, E: StepExecutor> {
    executor: &'a E,
    max_parallel: usize,
}

impl<'a, E: StepExecutor> WorkflowEngine<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor, max_parallel: DEFAULT_STEP_PARALLELISM }
    }

    /// Same as `new`, with an explicit bound on how many ready steps run
    /// concurrently (the spec's "configurable fan-out").
    pub fn with_max_parallel(executor: &'a E, max_parallel: usize) -> Self {
        Self { executor, max_parallel: max_parallel.max(1) }
    }

    pub async fn run(&self, tool: &CompositeTool, params: Value) -> Result<CompositeToolResult, WorkflowError> {
        let run = self.run_inner(tool, params);
        match tokio::time::timeout(tool.timeout.as_std(), run).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::ToolTimeout(tool.timeout.as_std())),
        }
    }

    /// Build the `dependsOn` DAG and run every step that becomes ready
    /// concurrently, bounded by `max_parallel`. A step's dependents only
    /// see its output once it has reached a terminal success state (the
    /// `completed` map below is updated only after a step's future
    /// resolves), and sibling steps ready at the same time get an
    /// independent snapshot of `completed` — they share no mutable state.
    async fn run_inner<'s>(&'s self, tool: &'s CompositeTool, params: Value) -> Result<CompositeToolResult, WorkflowError> {
        // Validates acyclicity up front; the actual run order falls out of
        // the readiness scheduler below rather than this fixed ordering.
        topological_order(&tool.steps)?;

        let by_id: HashMap<&str, &WorkflowStep> = tool.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let declared_index: HashMap<&str, usize> =
            tool.steps.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

        let mut in_degree: HashMap<&str, usize> = tool.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &tool.steps {
            for dep in &step.depends_on {
                *in_degree.get_mut(step.id.as_str()).expect("step id present") += 1;
                dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }

        let mut ready: Vec<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        ready.sort_by_key(|id| declared_index[id]);

        let mut completed: HashMap<String, Value> = HashMap::new();
        let mut dispatched: HashSet<&str> = HashSet::new();
        let mut records: Vec<StepRecord> = Vec::with_capacity(tool.steps.len());
        let mut in_flight: FuturesUnordered<Pin<Box<dyn Future<Output = StepOutcome> + 's>>> = FuturesUnordered::new();
        let mut terminal_error: Option<WorkflowError> = None;
        let mut skip_remaining = false;

        loop {
            while !skip_remaining && in_flight.len() < self.max_parallel && !ready.is_empty() {
                let step_id = ready.remove(0);
                dispatched.insert(step_id);
                let step = by_id[step_id];
                let snapshot = TemplateContext { params: params.clone(), steps: completed.clone() };
                in_flight.push(Box::pin(self.run_one(step, snapshot)));
            }

            let Some(outcome) = in_flight.next().await else { break };

            match outcome.control {
                StepControl::Abort(e) => {
                    terminal_error = Some(e);
                    break;
                }
                StepControl::SkipRemaining => {
                    skip_remaining = true;
                    ready.clear();
                    completed.insert(outcome.step_id.clone(), outcome.record.output.clone());
                    records.push(outcome.record);
                }
                StepControl::Proceed => {
                    completed.insert(outcome.step_id.clone(), outcome.record.output.clone());
                    records.push(outcome.record);

                    if let Some(next) = dependents.get(outcome.step_id.as_str()) {
                        for &dependent in next {
                            let degree = in_degree.get_mut(dependent).expect("dependent present");
                            *degree -= 1;
                            if *degree == 0 && !dispatched.contains(dependent) {
                                ready.push(dependent);
                            }
                        }
                        ready.sort_by_key(|id| declared_index[id]);
                    }
                }
            }
        }

        if let Some(e) = terminal_error {
            return Err(e);
        }

        let ctx = TemplateContext { params, steps: completed };
        let output = match &tool.output {
            Some(output_config) => output::assemble(output_config, &ctx)?,
            None => last_non_skipped_output(&records),
        };

        Ok(CompositeToolResult { output, steps: records })
    }

    /// Run one step end-to-end: evaluate its `condition`, execute it
    /// (honoring its own timeout), and apply its `onError`/`onDecline`/
    /// `onCancel` policy (including retries) entirely within this future so
    /// the caller only has to react to a single terminal `StepOutcome`.
    async fn run_one<'s>(&'s self, step: &'s WorkflowStep, ctx: TemplateContext) -> StepOutcome {
        let start = Instant::now();

        if let Some(condition) = &step.condition {
            match self.evaluate_condition(condition, &ctx, &step.id) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step = %step.id, "step skipped: condition false");
                    return StepOutcome {
                        step_id: step.id.clone(),
                        record: StepRecord {
                            step_id: step.id.clone(),
                            output: default_results_for(step),
                            duration: start.elapsed(),
                            skipped: true,
                        },
                        control: StepControl::Proceed,
                    };
                }
                Err(e) => {
                    return StepOutcome {
                        step_id: step.id.clone(),
                        record: StepRecord { step_id: step.id.clone(), output: Value::Null, duration: start.elapsed(), skipped: true },
                        control: StepControl::Abort(e),
                    };
                }
            }
        }

        match self.run_step(step, &ctx).await {
            Ok(output) => StepOutcome {
                step_id: step.id.clone(),
                record: StepRecord { step_id: step.id.clone(), output, duration: start.elapsed(), skipped: false },
                control: StepControl::Proceed,
            },
            Err(e) => self.apply_on_error(step, e, &ctx, start).await,
        }
    }

    async fn run_step(&self, step: &WorkflowStep, ctx: &TemplateContext) -> Result<Value, WorkflowError> {
        match step.timeout {
            Some(timeout) => match tokio::time::timeout(timeout.as_std(), self.run_step_once(step, ctx)).await {
                Ok(result) => result,
                Err(_) => Err(WorkflowError::StepTimeout(step.id.clone())),
            },
            None => self.run_step_once(step, ctx).await,
        }
    }

    async fn run_step_once(&self, step: &WorkflowStep, ctx: &TemplateContext) -> Result<Value, WorkflowError> {
        match step.effective_type() {
            StepType::Tool => {
                let tool_name = step.tool.as_deref().ok_or_else(|| WorkflowError::StepFailed {
                    step_id: step.id.clone(),
                    message: "tool step has no tool name".to_string(),
                })?;
                let arguments = match &step.arguments {
                    Some(args) => self.render_value(args, ctx, &step.id)?,
                    None => Value::Object(Default::default()),
                };
                let output = self
                    .executor
                    .call_tool(tool_name, arguments)
                    .await
                    .map_err(|e| WorkflowError::StepFailed { step_id: step.id.clone(), message: e.to_string() })?;
                Ok(serde_json::to_value(&output).unwrap_or(Value::Null))
            }
            StepType::Elicitation => {
                let message = step.message.as_deref().unwrap_or_default();
                let rendered_message = self.render_value(&Value::String(message.to_string()), ctx, &step.id)?;
                let message = rendered_message.as_str().unwrap_or(message).to_string();
                let schema = step.schema.clone().unwrap_or(Value::Object(Default::default()));

                match self.executor.elicit(&message, &schema).await? {
                    ElicitationOutcome::Accepted(value) => Ok(value),
                    ElicitationOutcome::Declined => Err(WorkflowError::Declined(step.id.clone())),
                    ElicitationOutcome::Cancelled => Err(WorkflowError::Cancelled(step.id.clone())),
                }
            }
        }
    }

    /// Apply `onError` (or the elicitation-specific `onDecline`/`onCancel`)
    /// policy to a failed step, including `retry`'s wait-and-re-run loop.
    async fn apply_on_error(&self, step: &WorkflowStep, error: WorkflowError, ctx: &TemplateContext, start: Instant) -> StepOutcome {
        let step_id = &step.id;

        let outcome_action = match &error {
            WorkflowError::Declined(_) => step.on_decline.unwrap_or(ElicitationOutcomeAction::Abort),
            WorkflowError::Cancelled(_) => step.on_cancel.unwrap_or(ElicitationOutcomeAction::Abort),
            _ => match step.on_error.action {
                ErrorAction::Abort => {
                    return StepOutcome {
                        step_id: step_id.clone(),
                        record: StepRecord { step_id: step_id.clone(), output: Value::Null, duration: start.elapsed(), skipped: true },
                        control: StepControl::Abort(error),
                    };
                }
                ErrorAction::Continue => {
                    warn!(step = %step_id, error = %error, "step failed, continuing per onError.continue");
                    return StepOutcome {
                        step_id: step_id.clone(),
                        record: StepRecord {
                            step_id: step_id.clone(),
                            output: default_results_for(step),
                            duration: start.elapsed(),
                            skipped: true,
                        },
                        control: StepControl::Proceed,
                    };
                }
                ErrorAction::Retry => {
                    let max_attempts = step.on_error.retry_count.unwrap_or(1);
                    let delay = step.on_error.retry_delay.unwrap_or(Duration::from_secs(0));
                    for attempt in 1..=max_attempts {
                        info!(step = %step_id, attempt, "retrying step after failure");
                        tokio::time::sleep(delay.as_std()).await;
                        match self.run_step(step, ctx).await {
                            Ok(output) => {
                                return StepOutcome {
                                    step_id: step_id.clone(),
                                    record: StepRecord { step_id: step_id.clone(), output, duration: start.elapsed(), skipped: false },
                                    control: StepControl::Proceed,
                                };
                            }
                            Err(_) if attempt < max_attempts => continue,
                            Err(e) => {
                                return StepOutcome {
                                    step_id: step_id.clone(),
                                    record: StepRecord { step_id: step_id.clone(), output: Value::Null, duration: start.elapsed(), skipped: true },
                                    control: StepControl::Abort(e),
                                };
                            }
                        }
                    }
                    return StepOutcome {
                        step_id: step_id.clone(),
                        record: StepRecord { step_id: step_id.clone(), output: Value::Null, duration: start.elapsed(), skipped: true },
                        control: StepControl::Abort(error),
                    };
                }
            },
        };

        let record = StepRecord { step_id: step_id.clone(), output: default_results_for(step), duration: start.elapsed(), skipped: true };
        match outcome_action {
            ElicitationOutcomeAction::Abort => StepOutcome { step_id: step_id.clone(), record, control: StepControl::Abort(error) },
            ElicitationOutcomeAction::Continue => StepOutcome { step_id: step_id.clone(), record, control: StepControl::Proceed },
            ElicitationOutcomeAction::SkipRemaining => StepOutcome { step_id: step_id.clone(), record, control: StepControl::SkipRemaining },
        }
    }

    fn render_value(&self, value: &Value, ctx: &TemplateContext, step_id: &str) -> Result<Value, WorkflowError> {
        render_value_recursive(value, ctx).map_err(|e| WorkflowError::Template { step_id: step_id.to_string(), message: e.to_string() })
    }

    fn evaluate_condition(&self, condition: &str, ctx: &TemplateContext, step_id: &str) -> Result<bool, WorkflowError> {
        let rendered = super::template::render(condition, ctx)
            .map_err(|e| WorkflowError::Template { step_id: step_id.to_string(), message: e.to_string() })?;
        Ok(is_truthy(&rendered))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    }
}

fn default_results_for(step: &WorkflowStep) -> Value {
    step.default_results.clone().unwrap_or(Value::Null)
}

fn last_non_skipped_output(records: &[StepRecord]) -> Value {
    records.iter().rev().find(|r| !r.skipped).map(|r| r.output.clone()).unwrap_or(Value::Null)
}

fn render_value_recursive(value: &Value, ctx: &TemplateContext) -> Result<Value, super::template::TemplateError> {
    match value {
        Value::String(s) => super::template::render(s, ctx),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_value_recursive(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value_recursive(v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}
