use serde_json::Value;

use super::type_coercion::{to_display_string, to_f64};

/// String containment, or array membership by display form.
pub fn contains(actual: &Value, expected: &Value) -> bool {
    let needle = to_display_string(expected);
    match actual {
        Value::String(s) => s.contains(&needle),
        Value::Array(items) => items.iter().any(|item| to_display_string(item) == needle),
        Value::Object(map) => map.contains_key(&needle),
        _ => false,
    }
}

pub fn starts_with(actual: &Value, expected: &Value) -> bool {
    to_display_string(actual).starts_with(&to_display_string(expected))
}

pub fn ends_with(actual: &Value, expected: &Value) -> bool {
    to_display_string(actual).ends_with(&to_display_string(expected))
}

/// `actual` is one of the listed values. A scalar `expected` is a one-item list.
pub fn is_in(actual: &Value, expected: &Value) -> bool {
    let actual = to_display_string(actual);
    match expected {
        Value::Array(items) => items.iter().any(|item| to_display_string(item) == actual),
        other => to_display_string(other) == actual,
    }
}

/// Numeric equality when both sides are numeric, otherwise display equality.
pub fn equals(actual: &Value, expected: &Value) -> bool {
    match (to_f64(actual), to_f64(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => to_display_string(actual) == to_display_string(expected),
    }
}

/// Numeric ordering; non-numeric operands never compare.
pub fn compare_numeric<F>(actual: &Value, expected: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (to_f64(actual), to_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
