use serde_json::Value;

use super::operators;
use super::type_coercion::{is_empty, to_display_string};
use crate::domain::model::{Branch, BranchCondition, Comparison, ComparisonOperator};
use crate::error::StepError;
use crate::template::{lookup_reference, resolve_value, VariableLookup};

/// Outcome of evaluating a step's branches.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchSelection {
    /// A conditional branch matched.
    Matched(usize),
    /// Nothing matched; the step's default branch was taken.
    Default(usize),
    /// Nothing matched and there is no default branch.
    NoMatch,
}

impl BranchSelection {
    pub fn index(&self) -> Option<usize> {
        match self {
            BranchSelection::Matched(i) | BranchSelection::Default(i) => Some(*i),
            BranchSelection::NoMatch => None,
        }
    }
}

/// Evaluate branches in declared order: the first non-default branch whose
/// condition holds wins; otherwise the default branch, if any.
pub fn evaluate_branches(
    branches: &[Branch],
    scope: &dyn VariableLookup,
) -> Result<BranchSelection, StepError> {
    for (index, branch) in branches.iter().enumerate() {
        if branch.is_default {
            continue;
        }
        let Some(condition) = &branch.condition else {
            continue;
        };
        if evaluate_condition(condition, scope)? {
            return Ok(BranchSelection::Matched(index));
        }
    }

    Ok(branches
        .iter()
        .position(|b| b.is_default)
        .map(BranchSelection::Default)
        .unwrap_or(BranchSelection::NoMatch))
}

/// Evaluate a condition tree. A missing left-hand variable reads as `null`;
/// an unresolved reference inside the right-hand value is an error.
pub fn evaluate_condition(
    condition: &BranchCondition,
    scope: &dyn VariableLookup,
) -> Result<bool, StepError> {
    match condition {
        BranchCondition::All { all } => {
            for c in all {
                if !evaluate_condition(c, scope)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        BranchCondition::Any { any } => {
            for c in any {
                if evaluate_condition(c, scope)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        BranchCondition::Compare(cmp) => evaluate_comparison(cmp, scope),
    }
}

fn evaluate_comparison(cmp: &Comparison, scope: &dyn VariableLookup) -> Result<bool, StepError> {
    let actual = lookup_reference(&cmp.variable, scope)
        .cloned()
        .unwrap_or(Value::Null);
    let expected = resolve_value(&cmp.value, scope)?;

    let result = match cmp.operator {
        ComparisonOperator::Contains => operators::contains(&actual, &expected),
        ComparisonOperator::NotContains => !operators::contains(&actual, &expected),
        ComparisonOperator::StartWith => operators::starts_with(&actual, &expected),
        ComparisonOperator::EndWith => operators::ends_with(&actual, &expected),
        ComparisonOperator::Is => to_display_string(&actual) == to_display_string(&expected),
        ComparisonOperator::IsNot => to_display_string(&actual) != to_display_string(&expected),
        ComparisonOperator::Empty => is_empty(&actual),
        ComparisonOperator::NotEmpty => !is_empty(&actual),
        ComparisonOperator::In => operators::is_in(&actual, &expected),
        ComparisonOperator::NotIn => !operators::is_in(&actual, &expected),
        ComparisonOperator::Equal => operators::equals(&actual, &expected),
        ComparisonOperator::NotEqual => !operators::equals(&actual, &expected),
        ComparisonOperator::GreaterThan => operators::compare_numeric(&actual, &expected, |a, b| a > b),
        ComparisonOperator::LessThan => operators::compare_numeric(&actual, &expected, |a, b| a < b),
        ComparisonOperator::GreaterOrEqual => {
            operators::compare_numeric(&actual, &expected, |a, b| a >= b)
        }
        ComparisonOperator::LessOrEqual => {
            operators::compare_numeric(&actual, &expected, |a, b| a <= b)
        }
        ComparisonOperator::Null => actual.is_null(),
        ComparisonOperator::NotNull => !actual.is_null(),
    };
    Ok(result)
}
