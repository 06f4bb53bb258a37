use crate::domain::model::Scenario;
use crate::graph::{container_depth, verify_topology, FlowGraph, TopologyViolation, DEFAULT_MAX_NESTING_DEPTH};

use super::types::Diagnostic;

/// Reference and containment checks on the bound scenario.
///
/// Dangling references are warnings: import sanitization drops them.
pub fn validate(scenario: &Scenario) -> Vec<Diagnostic> {
    let mut diags: Vec<Diagnostic> = verify_topology(scenario)
        .into_iter()
        .map(violation_to_diagnostic)
        .collect();

    if scenario.steps.is_empty() {
        diags.push(Diagnostic::warning("W110", "Scenario has no steps"));
        return diags;
    }

    if scenario.start_step_id.is_empty() {
        diags.push(Diagnostic::warning("W104", "No start step; the first root step will be used"));
    }

    let flow = FlowGraph::build(scenario);
    if scenario.contains_step(&scenario.start_step_id) {
        for step in &scenario.steps {
            if !flow.reachable(&scenario.start_step_id, &step.id) {
                diags.push(
                    Diagnostic::warning("W108", format!("Step is unreachable from start: {}", step.id))
                        .at_step(step.id.clone()),
                );
            }
        }
    }

    for step in scenario.steps.iter().filter(|s| s.is_container()) {
        if container_depth(&step.id, &scenario.steps).is_some_and(|d| d >= DEFAULT_MAX_NESTING_DEPTH) {
            diags.push(
                Diagnostic::warning(
                    "W109",
                    format!(
                        "Container {} is nested deeper than {} levels",
                        step.id, DEFAULT_MAX_NESTING_DEPTH
                    ),
                )
                .at_step(step.id.clone()),
            );
        }
    }

    diags
}

fn violation_to_diagnostic(violation: TopologyViolation) -> Diagnostic {
    let message = violation.to_string();
    match violation {
        TopologyViolation::DanglingEdge { edge_id, .. } => {
            Diagnostic::warning("W101", message).at_edge(edge_id)
        }
        TopologyViolation::DanglingBranch { step_id, .. } => {
            Diagnostic::warning("W102", message).at_step(step_id)
        }
        TopologyViolation::DanglingChild { container_id, .. } => {
            Diagnostic::warning("W103", message).at_step(container_id)
        }
        TopologyViolation::InvalidStartStep(_) => {
            Diagnostic::warning("W104", message).at_field("startStepId")
        }
        TopologyViolation::ContainmentCycle => Diagnostic::error("E105", message),
        TopologyViolation::DuplicateMembership { step_id, .. } => {
            Diagnostic::warning("W106", message).at_step(step_id)
        }
        TopologyViolation::UnknownHandle { edge_id, .. }
        | TopologyViolation::EdgeWithoutBranch { edge_id, .. } => {
            Diagnostic::warning("W107", message).at_edge(edge_id)
        }
        TopologyViolation::BranchWithoutEdge { step_id, .. } => {
            Diagnostic::warning("W107", message).at_step(step_id)
        }
    }
}
