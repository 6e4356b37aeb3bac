//! The composite-tool template language: `{{ ... }}` over a context of
//! `{params, steps}`, with `json`, `fromJson`, and `quote` helpers.
//!
//! Grounded on the dot-notation field getter in the teacher's
//! `workflow/router.rs` (`get_field_value`), generalized from predicate
//! evaluation to general value substitution, and on the JSONPath-based
//! input/output bindings in `saga/types.rs` for the idea of referencing a
//! prior step's output by id.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated template expression in '{0}'")]
    Unterminated(String),

    #[error("empty template expression")]
    Empty,

    #[error("unknown path root '{0}' (expected 'params' or 'steps')")]
    UnknownRoot(String),

    #[error("path '{0}' did not resolve to a value")]
    Unresolved(String),

    #[error("unknown helper '{0}' (expected json, fromJson, or quote)")]
    UnknownHelper(String),

    #[error("fromJson could not parse referenced value as JSON: {0}")]
    InvalidJson(String),
}

/// Evaluation context: composite-tool `params` and the accumulated output
/// of previously-completed steps, keyed by step id.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub params: Value,
    pub steps: HashMap<String, Value>,
}

impl TemplateContext {
    pub fn new(params: Value) -> Self {
        Self { params, steps: HashMap::new() }
    }

    pub fn record_step_output(&mut self, step_id: impl Into<String>, output: Value) {
        self.steps.insert(step_id.into(), output);
    }

    fn root(&self, name: &str) -> Result<Value, TemplateError> {
        match name {
            "params" => Ok(self.params.clone()),
            "steps" => {
                let map: serde_json::Map<String, Value> =
                    self.steps.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Ok(Value::Object(map))
            }
            other => Err(TemplateError::UnknownRoot(other.to_string())),
        }
    }
}

/// A single `{{ ... }}` expression: either a bare dot-path, or a helper
/// call `helper .path`.
#[derive(Debug, Clone)]
enum Expr {
    Path(Vec<String>),
    Helper(Helper, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    Json,
    FromJson,
    Quote,
}

impl fmt::Display for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Helper::Json => write!(f, "json"),
            Helper::FromJson => write!(f, "fromJson"),
            Helper::Quote => write!(f, "quote"),
        }
    }
}

fn parse_path(path: &str) -> Vec<String> {
    path.trim_start_matches('.').split('.').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn parse_expr(raw: &str) -> Result<Expr, TemplateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = raw.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim);

    let helper = match first {
        "json" => Some(Helper::Json),
        "fromJson" => Some(Helper::FromJson),
        "quote" => Some(Helper::Quote),
        _ => None,
    };

    match (helper, rest) {
        (Some(h), Some(arg)) => Ok(Expr::Helper(h, Box::new(parse_expr(arg)?))),
        (Some(h), None) => Err(TemplateError::UnknownHelper(format!("{h} requires an argument"))),
        (None, _) if raw.starts_with('.') => Ok(Expr::Path(parse_path(raw))),
        (None, _) => Err(TemplateError::UnknownHelper(first.to_string())),
    }
}

fn resolve_path(ctx: &TemplateContext, segments: &[String]) -> Result<Value, TemplateError> {
    if segments.is_empty() {
        return Err(TemplateError::Unresolved(".".to_string()));
    }
    let mut current = ctx.root(&segments[0])?;
    for seg in &segments[1..] {
        current = match current {
            Value::Object(ref map) => map.get(seg).cloned().unwrap_or(Value::Null),
            Value::Array(ref arr) => {
                let idx: Option<usize> = seg.parse().ok();
                idx.and_then(|i| arr.get(i).cloned()).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };
    }
    Ok(current)
}

fn eval_expr(ctx: &TemplateContext, expr: &Expr) -> Result<Value, TemplateError> {
    match expr {
        Expr::Path(segments) => resolve_path(ctx, segments),
        Expr::Helper(Helper::Json, inner) => {
            let value = eval_expr(ctx, inner)?;
            Ok(Value::String(serde_json::to_string(&value).unwrap_or_default()))
        }
        Expr::Helper(Helper::Quote, inner) => {
            let value = eval_expr(ctx, inner)?;
            let s = value_to_display_string(&value);
            Ok(Value::String(serde_json::to_string(&s).unwrap_or_default()))
        }
        Expr::Helper(Helper::FromJson, inner) => {
            let value = eval_expr(ctx, inner)?;
            let s = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            serde_json::from_str(&s).map_err(|e| TemplateError::InvalidJson(e.to_string()))
        }
    }
}

fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Find all `{{ ... }}` spans in `s`, returning `(start, end, raw_expr)`.
fn find_expressions(s: &str) -> Result<Vec<(usize, usize, &str)>, TemplateError> {
    let mut spans = Vec::new();
    let mut rest = s;
    let mut offset = 0usize;
    while let Some(open) = rest.find("{{") {
        let after_open = open + 2;
        let Some(close_rel) = rest[after_open..].find("}}") else {
            return Err(TemplateError::Unterminated(s.to_string()));
        };
        let close = after_open + close_rel;
        let raw = &rest[after_open..close];
        spans.push((offset + open, offset + close + 2, raw));
        offset += close + 2;
        rest = &rest[close + 2..];
    }
    Ok(spans)
}

/// Render a template string. If the entire (trimmed) string is a single
/// `{{ expr }}` expression, the native JSON type of the result is returned
/// unchanged (so a numeric or object param substitutes as a number/object,
/// not a stringified fragment). Otherwise every expression's result is
/// coerced to its display string and spliced into the surrounding text.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<Value, TemplateError> {
    let spans = find_expressions(template)?;
    if spans.is_empty() {
        return Ok(Value::String(template.to_string()));
    }

    let trimmed = template.trim();
    if spans.len() == 1 && spans[0].0 == 0 && spans[0].1 == template.len() && trimmed == template {
        let expr = parse_expr(spans[0].2)?;
        return eval_expr(ctx, &expr);
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0usize;
    for (start, end, raw) in spans {
        out.push_str(&template[last..start]);
        let expr = parse_expr(raw)?;
        let value = eval_expr(ctx, &expr)?;
        out.push_str(&value_to_display_string(&value));
        last = end;
    }
    out.push_str(&template[last..]);
    Ok(Value::String(out))
}

/// Scan a template string for `.steps.<id>.output.<field>` references,
/// without evaluating anything. Used by the validator to check that every
/// such reference is satisfied by a non-skippable step or a
/// `defaultResults` entry.
pub fn scan_step_output_refs(template: &str) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    let Ok(spans) = find_expressions(template) else { return refs };
    for (_, _, raw) in spans {
        for token in raw.split_whitespace() {
            let path = parse_path(token);
            if path.len() >= 3 && path[0] == "steps" && path[2] == "output" {
                let step_id = path[1].clone();
                let field = path.get(3).cloned().unwrap_or_default();
                refs.push((step_id, field));
            }
        }
    }
    refs
}

/// Check that a template string parses under the same grammar the runtime
/// expander uses, without evaluating it against a context. Used by the
/// validator.
pub fn check_syntax(template: &str) -> Result<(), TemplateError> {
    let spans = find_expressions(template)?;
    for (_, _, raw) in spans {
        parse_expr(raw)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_string_with_embedded_param() {
        let mut ctx = TemplateContext::new(json!({"pr_number": 42}));
        ctx.record_step_output("merge", json!({"text": "merged"}));
        let result = render("Deployed PR {{.params.pr_number}}", &ctx).unwrap();
        assert_eq!(result, json!("Deployed PR 42"));
    }

    #[test]
    fn whole_string_expression_preserves_native_type() {
        let ctx = TemplateContext::new(json!({"count": 7}));
        let result = render("{{.params.count}}", &ctx).unwrap();
        assert_eq!(result, json!(7));
    }

    #[test]
    fn references_prior_step_output() {
        let mut ctx = TemplateContext::new(json!({}));
        ctx.record_step_output("fetch", json!({"text": "skipped"}));
        let result = render("{{.steps.fetch.output.text}}", &ctx).unwrap();
        assert_eq!(result, json!("skipped"));
    }

    #[test]
    fn json_helper_serializes_value() {
        let mut ctx = TemplateContext::new(json!({}));
        ctx.record_step_output("fetch", json!({"text": "hi", "n": 1}));
        let result = render("{{json .steps.fetch.output}}", &ctx).unwrap();
        assert_eq!(result, json!("{\"text\":\"hi\",\"n\":1}"));
    }

    #[test]
    fn from_json_helper_parses_string() {
        let ctx = TemplateContext::new(json!({"payload": "{\"a\":1}"}));
        let result = render("{{fromJson .params.payload}}", &ctx).unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[test]
    fn quote_helper_escapes_value() {
        let ctx = TemplateContext::new(json!({"name": "a \"quoted\" name"}));
        let result = render("{{quote .params.name}}", &ctx).unwrap();
        assert_eq!(result, json!("\"a \\\"quoted\\\" name\""));
    }

    #[test]
    fn unterminated_expression_is_an_error() {
        let ctx = TemplateContext::new(json!({}));
        assert!(render("hello {{.params.x", &ctx).is_err());
    }

    #[test]
    fn scan_step_output_refs_finds_field_references() {
        let refs = scan_step_output_refs("{{.steps.fetch.output.text}} and {{.steps.other.output.val}}");
        assert_eq!(refs, vec![("fetch".to_string(), "text".to_string()), ("other".to_string(), "val".to_string())]);
    }

    #[test]
    fn missing_path_resolves_to_null() {
        let ctx = TemplateContext::new(json!({"a": 1}));
        let result = render("{{.params.missing}}", &ctx).unwrap();
        assert_eq!(result, Value::Null);
    }
}
