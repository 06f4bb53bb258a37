use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators used by branch evaluation.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Contains,
    NotContains,
    #[serde(alias = "starts_with")]
    StartWith,
    #[serde(alias = "ends_with")]
    EndWith,
    Is,
    IsNot,
    Empty,
    NotEmpty,
    In,
    NotIn,
    #[serde(alias = "=", alias = "==", alias = "eq")]
    Equal,
    #[serde(alias = "≠", alias = "!=", alias = "ne")]
    NotEqual,
    #[serde(alias = ">", alias = "gt")]
    GreaterThan,
    #[serde(alias = "<", alias = "lt")]
    LessThan,
    #[serde(alias = "≥", alias = ">=", alias = "gte", alias = "greater_than_or_equal")]
    GreaterOrEqual,
    #[serde(alias = "≤", alias = "<=", alias = "lte", alias = "less_than_or_equal")]
    LessOrEqual,
    Null,
    NotNull,
}

/// A single `variable <operator> value` test.
///
/// `variable` is a reference path (`x`, `login.body.token`, optionally wrapped
/// as `${...}`); string values are variable-resolved before comparison.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Comparison {
    pub variable: String,
    pub operator: ComparisonOperator,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Condition attached to a branch or a `while` loop.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum BranchCondition {
    All { all: Vec<BranchCondition> },
    Any { any: Vec<BranchCondition> },
    Compare(Comparison),
}

impl BranchCondition {
    pub fn compare(
        variable: impl Into<String>,
        operator: ComparisonOperator,
        value: Value,
    ) -> Self {
        BranchCondition::Compare(Comparison {
            variable: variable.into(),
            operator,
            value,
        })
    }
}
