use std::collections::HashSet;

use serde_json::Value;

use crate::domain::model::{BranchCondition, LoopConfig, LoopCount, Scenario, StepKind};
use crate::template::extract_references;
use crate::template::variable_resolver::RESPONSE_VARIABLE;

use super::types::Diagnostic;

/// Parameter, server, and variable-reference checks.
pub fn validate(scenario: &Scenario) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    let mut params = HashSet::new();
    for (idx, param) in scenario.parameter_schema.iter().enumerate() {
        if !params.insert(param.name.as_str()) {
            diags.push(
                Diagnostic::error("E201", format!("Duplicate parameter: {}", param.name))
                    .at_field(format!("parameterSchema[{}].name", idx)),
            );
        }
    }

    let mut known: HashSet<String> = params.iter().map(|p| p.to_string()).collect();
    known.extend(["params", "responses"].map(String::from));
    let mut aliases = HashSet::new();
    for step in &scenario.steps {
        match &step.kind {
            StepKind::Request(req) if req.save_response => {
                let alias = req.response_alias.clone().unwrap_or_else(|| step.id.clone());
                if !aliases.insert(alias.clone()) {
                    diags.push(
                        Diagnostic::warning("W207", format!("Response alias saved by more than one step: {}", alias))
                            .at_step(step.id.clone()),
                    );
                }
                known.insert(alias);
            }
            StepKind::Loop(l) if !l.variable_name.is_empty() => {
                known.insert(l.variable_name.clone());
                known.insert(format!("{}_index", l.variable_name));
            }
            _ => {}
        }
    }

    let listed: HashSet<&str> = scenario.server_ids.iter().map(String::as_str).collect();

    for step in &scenario.steps {
        let mut refs = Vec::new();
        match &step.kind {
            StepKind::Request(req) => {
                if !listed.is_empty() && !listed.contains(req.server_id.as_str()) {
                    diags.push(
                        Diagnostic::warning(
                            "W202",
                            format!("Server {} is not listed in serverIds", req.server_id),
                        )
                        .at_step(step.id.clone())
                        .at_field("serverId"),
                    );
                }
                if !req.wait_for_response && !req.branches.is_empty() {
                    diags.push(
                        Diagnostic::warning("W205", "Branches of a fire-and-forget request are never evaluated")
                            .at_step(step.id.clone()),
                    );
                }
                if !req.wait_for_response && req.save_response {
                    diags.push(
                        Diagnostic::warning("W206", "saveResponse has no effect without waitForResponse")
                            .at_step(step.id.clone()),
                    );
                }
                refs.extend(extract_references(&req.endpoint));
                for header in &req.headers {
                    refs.extend(extract_references(&header.value));
                }
                if let Some(body) = &req.body {
                    collect_value_refs(body, &mut refs);
                }
            }
            StepKind::Loop(l) => match &l.config {
                LoopConfig::Count { count: LoopCount::Reference(r) } => refs.push(strip_wrapper(r)),
                LoopConfig::ForEach { source } => refs.push(strip_wrapper(source)),
                LoopConfig::While { condition } => collect_condition_refs(condition, &mut refs),
                LoopConfig::Count { .. } => {}
            },
            _ => {}
        }
        for branch in step.branches() {
            if let Some(condition) = &branch.condition {
                collect_condition_refs(condition, &mut refs);
            }
        }

        for reference in refs {
            let root = reference.split('.').next().unwrap_or_default().trim();
            if root.is_empty() || known.contains(root) || root == RESPONSE_VARIABLE {
                continue;
            }
            diags.push(
                Diagnostic::warning(
                    "W203",
                    format!("Reference ${{{}}} does not match a parameter, loop variable, or saved response", reference),
                )
                .at_step(step.id.clone()),
            );
        }
    }

    diags
}

fn strip_wrapper(reference: &str) -> String {
    let trimmed = reference.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn collect_value_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(extract_references(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_value_refs(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_value_refs(v, out)),
        _ => {}
    }
}

fn collect_condition_refs(condition: &BranchCondition, out: &mut Vec<String>) {
    match condition {
        BranchCondition::All { all } => all.iter().for_each(|c| collect_condition_refs(c, out)),
        BranchCondition::Any { any } => any.iter().for_each(|c| collect_condition_refs(c, out)),
        BranchCondition::Compare(cmp) => {
            out.push(strip_wrapper(&cmp.variable));
            collect_value_refs(&cmp.value, out);
        }
    }
}
