//! Structural edits that keep the edge list and branch/container references
//! in agreement.
//!
//! Each operation works on a clone and returns the edited scenario only on
//! success, so a rejected edit leaves the caller's copy untouched.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::flow::FlowGraph;
use super::nesting::{is_within, placement_exceeds_limit, subtree_height};
use crate::domain::model::{Edge, Scenario, Step};
use crate::error::{ScenarioError, ScenarioResult};

/// A place where the two topology representations, or container membership,
/// are inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyViolation {
    #[error("edge {edge_id} references missing step {step_id}")]
    DanglingEdge { edge_id: String, step_id: String },
    #[error("edge {edge_id} names unknown branch {handle} on step {step_id}")]
    UnknownHandle {
        edge_id: String,
        step_id: String,
        handle: String,
    },
    #[error("edge {edge_id} targets {edge_target} but branch {step_id}.{branch_id} points to '{branch_target}'")]
    EdgeWithoutBranch {
        edge_id: String,
        step_id: String,
        branch_id: String,
        edge_target: String,
        branch_target: String,
    },
    #[error("branch {step_id}.{branch_id} points to {next_step_id} with no matching edge")]
    BranchWithoutEdge {
        step_id: String,
        branch_id: String,
        next_step_id: String,
    },
    #[error("branch {step_id}.{branch_id} points to missing step {next_step_id}")]
    DanglingBranch {
        step_id: String,
        branch_id: String,
        next_step_id: String,
    },
    #[error("container {container_id} lists missing step {child_id}")]
    DanglingChild {
        container_id: String,
        child_id: String,
    },
    #[error("step {step_id} is listed by more than one container: {}", containers.join(", "))]
    DuplicateMembership {
        step_id: String,
        containers: Vec<String>,
    },
    #[error("container membership forms a cycle")]
    ContainmentCycle,
    #[error("start step {0} does not exist")]
    InvalidStartStep(String),
}

/// Check both topology representations against each other.
pub fn verify_topology(scenario: &Scenario) -> Vec<TopologyViolation> {
    let ids: HashSet<&str> = scenario.steps.iter().map(|s| s.id.as_str()).collect();
    let mut violations = Vec::new();

    if !scenario.start_step_id.is_empty() && !ids.contains(scenario.start_step_id.as_str()) {
        violations.push(TopologyViolation::InvalidStartStep(
            scenario.start_step_id.clone(),
        ));
    }

    for edge in &scenario.edges {
        for endpoint in [&edge.source_step_id, &edge.target_step_id] {
            if !ids.contains(endpoint.as_str()) {
                violations.push(TopologyViolation::DanglingEdge {
                    edge_id: edge.id.clone(),
                    step_id: endpoint.clone(),
                });
            }
        }
        let (Some(handle), Some(source)) = (&edge.source_handle, scenario.step(&edge.source_step_id))
        else {
            continue;
        };
        match source.branch(handle) {
            None => violations.push(TopologyViolation::UnknownHandle {
                edge_id: edge.id.clone(),
                step_id: source.id.clone(),
                handle: handle.clone(),
            }),
            Some(branch) if branch.next_step_id != edge.target_step_id => {
                violations.push(TopologyViolation::EdgeWithoutBranch {
                    edge_id: edge.id.clone(),
                    step_id: source.id.clone(),
                    branch_id: branch.id.clone(),
                    edge_target: edge.target_step_id.clone(),
                    branch_target: branch.next_step_id.clone(),
                })
            }
            Some(_) => {}
        }
    }

    let mut members: HashMap<&str, Vec<String>> = HashMap::new();
    for step in &scenario.steps {
        for branch in step.branches().iter().filter(|b| b.has_target()) {
            if !ids.contains(branch.next_step_id.as_str()) {
                violations.push(TopologyViolation::DanglingBranch {
                    step_id: step.id.clone(),
                    branch_id: branch.id.clone(),
                    next_step_id: branch.next_step_id.clone(),
                });
            }
            let wired = scenario.edges.iter().any(|e| {
                e.source_step_id == step.id
                    && e.source_handle.as_deref() == Some(branch.id.as_str())
                    && e.target_step_id == branch.next_step_id
            });
            if !wired {
                violations.push(TopologyViolation::BranchWithoutEdge {
                    step_id: step.id.clone(),
                    branch_id: branch.id.clone(),
                    next_step_id: branch.next_step_id.clone(),
                });
            }
        }
        for child in step.child_ids().unwrap_or_default() {
            if !ids.contains(child.as_str()) {
                violations.push(TopologyViolation::DanglingChild {
                    container_id: step.id.clone(),
                    child_id: child.clone(),
                });
            }
            members.entry(child.as_str()).or_default().push(step.id.clone());
        }
    }

    let mut duplicated: Vec<_> = members
        .into_iter()
        .filter(|(_, containers)| containers.len() > 1)
        .collect();
    duplicated.sort();
    for (step_id, containers) in duplicated {
        violations.push(TopologyViolation::DuplicateMembership {
            step_id: step_id.to_string(),
            containers,
        });
    }

    if FlowGraph::build(scenario).has_containment_cycle() {
        violations.push(TopologyViolation::ContainmentCycle);
    }

    violations
}

/// Append an edge. When `source_handle` names a branch of the source step,
/// that branch is pointed at the target and any earlier edge for the same
/// branch is replaced.
pub fn add_edge(scenario: &Scenario, edge: Edge) -> ScenarioResult<Scenario> {
    if edge.id.is_empty() {
        return Err(ScenarioError::InvalidEdge("edge id is empty".into()));
    }
    if scenario.edge(&edge.id).is_some() {
        return Err(ScenarioError::InvalidEdge(format!(
            "edge {} already exists",
            edge.id
        )));
    }
    let source = scenario.step(&edge.source_step_id).ok_or_else(|| {
        ScenarioError::InvalidEdge(format!("source step {} not found", edge.source_step_id))
    })?;
    if !scenario.contains_step(&edge.target_step_id) {
        return Err(ScenarioError::InvalidEdge(format!(
            "target step {} not found",
            edge.target_step_id
        )));
    }
    if edge.source_step_id == edge.target_step_id {
        return Err(ScenarioError::InvalidEdge(format!(
            "edge {} connects step {} to itself",
            edge.id, edge.source_step_id
        )));
    }
    if let Some(handle) = &edge.source_handle {
        if source.branch(handle).is_none() {
            return Err(ScenarioError::InvalidEdge(format!(
                "step {} has no branch {}",
                edge.source_step_id, handle
            )));
        }
    }

    let mut next = scenario.clone();
    if let Some(handle) = &edge.source_handle {
        next.edges.retain(|e| {
            !(e.source_step_id == edge.source_step_id && e.source_handle.as_ref() == Some(handle))
        });
        if let Some(branch) = next
            .step_mut(&edge.source_step_id)
            .and_then(|s| s.branch_mut(handle))
        {
            branch.next_step_id = edge.target_step_id.clone();
        }
    }
    debug!(
        edge_id = %edge.id,
        source = %edge.source_step_id,
        target = %edge.target_step_id,
        handle = ?edge.source_handle,
        "Edge added"
    );
    next.edges.push(edge);
    next.touch();
    debug_check_consistent(scenario, &next);
    Ok(next)
}

/// Remove an edge and clear the branch it wired, as one edit.
pub fn delete_edge(scenario: &Scenario, edge_id: &str) -> ScenarioResult<Scenario> {
    let edge = scenario
        .edge(edge_id)
        .cloned()
        .ok_or_else(|| ScenarioError::EdgeNotFound(edge_id.to_string()))?;

    let mut next = scenario.clone();
    if let Some(handle) = &edge.source_handle {
        if let Some(branch) = next
            .step_mut(&edge.source_step_id)
            .and_then(|s| s.branch_mut(handle))
        {
            branch.next_step_id.clear();
        }
    }
    next.edges.retain(|e| e.id != edge_id);
    next.touch();
    debug!(edge_id, "Edge deleted");
    debug_check_consistent(scenario, &next);
    Ok(next)
}

/// Remove a step with every edge, branch target, and membership that
/// references it. A deleted container's children take its place in its
/// parent (or at root level).
pub fn delete_step(scenario: &Scenario, step_id: &str) -> ScenarioResult<Scenario> {
    let removed = scenario
        .step(step_id)
        .cloned()
        .ok_or_else(|| ScenarioError::StepNotFound(step_id.to_string()))?;
    let promoted: Vec<String> = removed
        .child_ids()
        .unwrap_or_default()
        .iter()
        .filter(|c| c.as_str() != step_id)
        .cloned()
        .collect();

    let mut next = scenario.clone();
    next.steps.retain(|s| s.id != step_id);
    next.edges.retain(|e| !e.touches(step_id));

    for step in &mut next.steps {
        if let Some(branches) = step.branches_mut() {
            for branch in branches.iter_mut().filter(|b| b.next_step_id == step_id) {
                branch.next_step_id.clear();
            }
        }
        if let Some(children) = step.child_ids_mut() {
            if let Some(pos) = children.iter().position(|c| c == step_id) {
                children.remove(pos);
                for (offset, child) in promoted.iter().enumerate() {
                    children.insert(pos + offset, child.clone());
                }
            }
            children.retain(|c| c != step_id);
        }
    }

    if next.start_step_id == step_id || !next.contains_step(&next.start_step_id) {
        next.start_step_id = next
            .root_step_ids()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default();
    }
    next.touch();
    debug!(step_id, promoted = promoted.len(), "Step deleted");
    debug_check_consistent(scenario, &next);
    Ok(next)
}

/// Insert a new step at root level or inside `container_id`.
///
/// A container step may list existing root-level steps as children; they
/// move into it.
pub fn add_step(
    scenario: &Scenario,
    step: Step,
    container_id: Option<&str>,
    max_depth: usize,
) -> ScenarioResult<Scenario> {
    if step.id.is_empty() {
        return Err(ScenarioError::InvalidMembership("step id is empty".into()));
    }
    if scenario.contains_step(&step.id) {
        return Err(ScenarioError::DuplicateStep(step.id.clone()));
    }
    if let Some(cid) = container_id {
        let container = scenario
            .step(cid)
            .ok_or_else(|| ScenarioError::StepNotFound(cid.to_string()))?;
        if !container.is_container() {
            return Err(ScenarioError::NotAContainer(cid.to_string()));
        }
    }
    for child in step.child_ids().unwrap_or_default() {
        if child == &step.id {
            return Err(ScenarioError::ContainmentCycle(step.id.clone()));
        }
        if !scenario.contains_step(child) {
            return Err(ScenarioError::StepNotFound(child.clone()));
        }
        if let Some(parent) = scenario.parent_of(child) {
            return Err(ScenarioError::InvalidMembership(format!(
                "step {} already belongs to {}",
                child, parent.id
            )));
        }
        if container_id.is_some_and(|cid| is_within(cid, child, &scenario.steps)) {
            return Err(ScenarioError::ContainmentCycle(step.id.clone()));
        }
    }

    let mut next = scenario.clone();
    next.steps.push(step.clone());
    let height = subtree_height(&step.id, &next.steps);
    if placement_exceeds_limit(container_id, height, &scenario.steps, max_depth) {
        return Err(ScenarioError::NestingLimitExceeded {
            container_id: container_id.unwrap_or(&step.id).to_string(),
            max_depth,
        });
    }
    if let Some(cid) = container_id {
        if let Some(children) = next.step_mut(cid).and_then(|s| s.child_ids_mut()) {
            children.push(step.id.clone());
        }
    }
    if !next.contains_step(&next.start_step_id) {
        next.start_step_id = next
            .root_step_ids()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default();
    }
    next.touch();
    debug!(step_id = %step.id, container = ?container_id, "Step added");
    debug_check_consistent(scenario, &next);
    Ok(next)
}

/// Debug builds assert that an edit introduced no new violation.
pub(crate) fn debug_check_consistent(before: &Scenario, after: &Scenario) {
    if cfg!(debug_assertions) {
        let known: HashSet<String> = verify_topology(before)
            .iter()
            .map(ToString::to_string)
            .collect();
        let introduced: Vec<TopologyViolation> = verify_topology(after)
            .into_iter()
            .filter(|v| !known.contains(&v.to_string()))
            .collect();
        debug_assert!(
            introduced.is_empty(),
            "topology edit introduced violations: {introduced:?}"
        );
    }
}
