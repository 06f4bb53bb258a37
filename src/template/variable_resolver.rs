use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::StepError;
use crate::evaluator::type_coercion::to_display_string;

/// Name under which the in-flight response is visible to request branches.
pub const RESPONSE_VARIABLE: &str = "response";

/// Source of values for `${...}` references.
pub trait VariableLookup {
    /// Run parameter or loop variable.
    fn param(&self, name: &str) -> Option<&Value>;
    /// Response saved under `alias`.
    fn saved_response(&self, alias: &str) -> Option<&Value>;
}

/// Scope that additionally exposes the just-received response as `response`.
pub struct WithResponse<'a> {
    inner: &'a dyn VariableLookup,
    response: &'a Value,
}

impl<'a> WithResponse<'a> {
    pub fn new(inner: &'a dyn VariableLookup, response: &'a Value) -> Self {
        Self { inner, response }
    }
}

impl VariableLookup for WithResponse<'_> {
    fn param(&self, name: &str) -> Option<&Value> {
        self.inner.param(name)
    }

    fn saved_response(&self, alias: &str) -> Option<&Value> {
        if alias == RESPONSE_VARIABLE {
            Some(self.response)
        } else {
            self.inner.saved_response(alias)
        }
    }
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\$\{|\$\{([^}]*)\}").expect("valid reference pattern"))
}

fn whole_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{([^}]*)\}$").expect("valid reference pattern"))
}

/// Resolve a dotted reference (`x`, `params.x`, `login.body.token`,
/// `responses.login.status`) to a value. A bare `${...}` wrapper is accepted.
///
/// Params (and loop variables) win over response aliases of the same name.
pub fn lookup_reference<'a>(reference: &str, scope: &'a dyn VariableLookup) -> Option<&'a Value> {
    let reference = reference.trim();
    let reference = reference
        .strip_prefix("${")
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(reference)
        .trim();

    let mut parts = reference.split('.').map(str::trim);
    let head = parts.next().filter(|h| !h.is_empty())?;
    let rest: Vec<&str> = parts.collect();

    match head {
        "params" if !rest.is_empty() => walk_path(scope.param(rest[0])?, &rest[1..]),
        "responses" if !rest.is_empty() => walk_path(scope.saved_response(rest[0])?, &rest[1..]),
        _ => match scope.param(head) {
            Some(value) => walk_path(value, &rest),
            None => walk_path(scope.saved_response(head)?, &rest),
        },
    }
}

fn walk_path<'a>(mut value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    for segment in path {
        value = match value {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Interpolate every `${...}` in `text`. `$${` yields a literal `${`.
pub fn resolve_string(text: &str, scope: &dyn VariableLookup) -> Result<String, StepError> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in reference_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        match caps.get(1) {
            None => out.push_str("${"),
            Some(reference) => {
                let value = lookup_reference(reference.as_str(), scope).ok_or_else(|| {
                    StepError::VariableResolution(format!(
                        "unresolved reference ${{{}}}",
                        reference.as_str()
                    ))
                })?;
                out.push_str(&to_display_string(value));
            }
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Resolve references inside a JSON value. A string that is exactly one
/// reference keeps the referenced value's type.
pub fn resolve_value(value: &Value, scope: &dyn VariableLookup) -> Result<Value, StepError> {
    match value {
        Value::String(s) => {
            if let Some(caps) = whole_reference_regex().captures(s) {
                let reference = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                return lookup_reference(reference, scope).cloned().ok_or_else(|| {
                    StepError::VariableResolution(format!("unresolved reference {}", s))
                });
            }
            resolve_string(s, scope).map(Value::String)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Every reference in `text`, in order of appearance.
pub fn extract_references(text: &str) -> Vec<String> {
    reference_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}
