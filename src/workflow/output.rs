//! Structured output assembly: turns a composite tool's `OutputConfig`
//! plus the accumulated step outputs into the final result value returned
//! to the caller.

use serde_json::Value;

use crate::config::model::{OutputConfig, OutputProperty, OutputPropertyType};

use super::executor::WorkflowError;
use super::template::{self, TemplateContext};

pub fn assemble(config: &OutputConfig, ctx: &TemplateContext) -> Result<Value, WorkflowError> {
    let mut object = serde_json::Map::new();

    for (name, property) in &config.properties {
        let value = assemble_property(name, property, ctx)?;
        if let Some(value) = value {
            object.insert(name.clone(), value);
        }
    }

    for required in &config.required {
        if !object.contains_key(required) {
            return Err(WorkflowError::OutputAssembly(format!("required output property '{required}' was not produced")));
        }
    }

    Ok(Value::Object(object))
}

fn assemble_property(name: &str, property: &OutputProperty, ctx: &TemplateContext) -> Result<Option<Value>, WorkflowError> {
    if property.kind == OutputPropertyType::Object {
        if let Some(nested) = &property.properties {
            let mut object = serde_json::Map::new();
            for (child_name, child) in nested {
                if let Some(value) = assemble_property(child_name, child, ctx)? {
                    object.insert(child_name.clone(), value);
                }
            }
            return Ok(Some(Value::Object(object)));
        }
    }

    let Some(template_str) = &property.value else {
        return Ok(property.default.clone());
    };

    let rendered = template::render(template_str, ctx)
        .map_err(|e| WorkflowError::OutputAssembly(format!("output property '{name}': {e}")))?;

    if rendered.is_null() {
        return Ok(property.default.clone());
    }

    Ok(Some(coerce(name, property.kind, rendered, property.default.as_ref())?))
}

/// Coerce a rendered template value to `kind`. Per spec §4.6 ("if
/// expansion fails or yields an incompatible type, apply default with type
/// coercion to the declared type"), every failure path below falls back to
/// `default` rather than erroring, and only errors if no `default` was
/// declared either.
fn coerce(name: &str, kind: OutputPropertyType, value: Value, default: Option<&Value>) -> Result<Value, WorkflowError> {
    let fallback = |message: String| {
        default.cloned().ok_or_else(|| WorkflowError::OutputAssembly(message))
    };

    match kind {
        OutputPropertyType::String => Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(display(&other)),
        }),
        OutputPropertyType::Integer | OutputPropertyType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => match s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => fallback(format!("output property '{name}' is not numeric: '{s}'")),
            },
            _ => fallback(format!("output property '{name}' is not numeric")),
        },
        OutputPropertyType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => fallback(format!("output property '{name}' is not boolean: '{s}'")),
            },
            _ => fallback(format!("output property '{name}' is not boolean")),
        },
        OutputPropertyType::Object | OutputPropertyType::Array => {
            // The expanded template string is parsed as JSON before
            // coercion when the raw substitution produced a string
            // (e.g. `{{json .steps.x.output}}` round-tripped back out).
            match value {
                Value::Object(_) | Value::Array(_) => Ok(value),
                Value::String(s) => match serde_json::from_str(&s) {
                    Ok(v) => Ok(v),
                    Err(_) => fallback(format!("output property '{name}' is not valid JSON: '{s}'")),
                },
                _ => fallback(format!("output property '{name}' did not resolve to an object or array")),
            }
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
