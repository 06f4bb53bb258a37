//! Edge conflicts raised by cutting or moving a selection of steps.
//!
//! Detection is read-only. Committing a cut or move requires the caller to
//! hand back the conflicts it confirmed; the crossing edges are then removed
//! through [`delete_edge`] so the branch side stays in step.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::nesting::{is_within, placement_exceeds_limit, subtree_height};
use super::topology::{debug_check_consistent, delete_edge};
use crate::domain::model::{Edge, Scenario, Step};
use crate::error::{ScenarioError, ScenarioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralOperation {
    Cut,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Source inside the selection, target outside.
    Outgoing,
    /// Source outside the selection, target inside.
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConflict {
    pub operation: StructuralOperation,
    pub edge: Edge,
    pub source_step: Step,
    pub target_step: Step,
    pub conflict_type: ConflictType,
}

/// Steps and their internal edges removed by [`cut_steps`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clipboard {
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
}

/// Selection plus every step nested under a selected container.
fn expand_selection(scenario: &Scenario, selected: &[String]) -> ScenarioResult<HashSet<String>> {
    let mut expanded = HashSet::new();
    for id in selected {
        if !scenario.contains_step(id) {
            return Err(ScenarioError::StepNotFound(id.clone()));
        }
        expanded.insert(id.clone());
        expanded.extend(scenario.descendants_of(id));
    }
    Ok(expanded)
}

/// Every edge crossing the selection boundary. Edges fully inside or fully
/// outside are not conflicts.
pub fn detect_conflicts(
    operation: StructuralOperation,
    selected: &[String],
    scenario: &Scenario,
) -> ScenarioResult<Vec<EdgeConflict>> {
    let selection = expand_selection(scenario, selected)?;
    Ok(crossing_edges(operation, &selection, scenario))
}

fn crossing_edges(
    operation: StructuralOperation,
    selection: &HashSet<String>,
    scenario: &Scenario,
) -> Vec<EdgeConflict> {
    scenario
        .edges
        .iter()
        .filter_map(|edge| {
            let source_in = selection.contains(&edge.source_step_id);
            let target_in = selection.contains(&edge.target_step_id);
            let conflict_type = match (source_in, target_in) {
                (true, false) => ConflictType::Outgoing,
                (false, true) => ConflictType::Incoming,
                _ => return None,
            };
            Some(EdgeConflict {
                operation,
                edge: edge.clone(),
                source_step: scenario.step(&edge.source_step_id)?.clone(),
                target_step: scenario.step(&edge.target_step_id)?.clone(),
                conflict_type,
            })
        })
        .collect()
}

/// Delete the conflicting edges one by one through [`delete_edge`].
pub fn resolve_conflicts(scenario: &Scenario, conflicts: &[EdgeConflict]) -> ScenarioResult<Scenario> {
    let mut next = scenario.clone();
    for conflict in conflicts {
        next = delete_edge(&next, &conflict.edge.id)?;
    }
    Ok(next)
}

fn ensure_confirmed(detected: &[EdgeConflict], confirmed: &[String]) -> ScenarioResult<()> {
    let detected: BTreeSet<&str> = detected.iter().map(|c| c.edge.id.as_str()).collect();
    let confirmed: BTreeSet<&str> = confirmed.iter().map(String::as_str).collect();
    if detected == confirmed {
        return Ok(());
    }
    Err(ScenarioError::UnconfirmedConflicts {
        edge_ids: detected
            .symmetric_difference(&confirmed)
            .map(|s| s.to_string())
            .collect(),
    })
}

/// Move the selection into `target` (`None` for root level).
///
/// `confirmed_edge_ids` must be exactly the ids of the detected conflicts.
pub fn move_steps(
    scenario: &Scenario,
    selected: &[String],
    target: Option<&str>,
    confirmed_edge_ids: &[String],
    max_depth: usize,
) -> ScenarioResult<Scenario> {
    let selection = expand_selection(scenario, selected)?;
    if let Some(tid) = target {
        let container = scenario
            .step(tid)
            .ok_or_else(|| ScenarioError::StepNotFound(tid.to_string()))?;
        if !container.is_container() {
            return Err(ScenarioError::NotAContainer(tid.to_string()));
        }
        if selection.contains(tid) {
            return Err(ScenarioError::ContainmentCycle(tid.to_string()));
        }
    }

    // Only the outermost selected steps change parent; nested ones ride along.
    let movers: Vec<String> = scenario
        .steps
        .iter()
        .filter(|s| selection.contains(&s.id))
        .filter(|s| {
            scenario
                .parent_of(&s.id)
                .map_or(true, |p| !selection.contains(&p.id))
        })
        .map(|s| s.id.clone())
        .collect();

    for id in &movers {
        if target.is_some_and(|tid| is_within(tid, id, &scenario.steps)) {
            return Err(ScenarioError::ContainmentCycle(id.clone()));
        }
        let height = subtree_height(id, &scenario.steps);
        if placement_exceeds_limit(target, height, &scenario.steps, max_depth) {
            return Err(ScenarioError::NestingLimitExceeded {
                container_id: target.unwrap_or(id).to_string(),
                max_depth,
            });
        }
    }

    let conflicts = crossing_edges(StructuralOperation::Move, &selection, scenario);
    ensure_confirmed(&conflicts, confirmed_edge_ids)?;
    let mut next = resolve_conflicts(scenario, &conflicts)?;

    for step in &mut next.steps {
        if let Some(children) = step.child_ids_mut() {
            children.retain(|c| !movers.contains(c));
        }
    }
    if let Some(tid) = target {
        if let Some(children) = next.step_mut(tid).and_then(|s| s.child_ids_mut()) {
            children.extend(movers.iter().cloned());
        }
    }
    next.touch();
    info!(
        steps = movers.len(),
        target = ?target,
        removed_edges = conflicts.len(),
        "Steps moved"
    );
    debug_check_consistent(scenario, &next);
    Ok(next)
}

/// Remove the selection (with nested steps) and return it as a [`Clipboard`].
///
/// `confirmed_edge_ids` must be exactly the ids of the detected conflicts.
pub fn cut_steps(
    scenario: &Scenario,
    selected: &[String],
    confirmed_edge_ids: &[String],
) -> ScenarioResult<(Scenario, Clipboard)> {
    let selection = expand_selection(scenario, selected)?;
    let conflicts = crossing_edges(StructuralOperation::Cut, &selection, scenario);
    ensure_confirmed(&conflicts, confirmed_edge_ids)?;
    let mut next = resolve_conflicts(scenario, &conflicts)?;

    let clipboard = Clipboard {
        steps: next
            .steps
            .iter()
            .filter(|s| selection.contains(&s.id))
            .cloned()
            .collect(),
        edges: next
            .edges
            .iter()
            .filter(|e| selection.contains(&e.source_step_id) && selection.contains(&e.target_step_id))
            .cloned()
            .collect(),
    };

    next.steps.retain(|s| !selection.contains(&s.id));
    next.edges
        .retain(|e| !selection.contains(&e.source_step_id) && !selection.contains(&e.target_step_id));
    for step in &mut next.steps {
        if let Some(children) = step.child_ids_mut() {
            children.retain(|c| !selection.contains(c));
        }
        if let Some(branches) = step.branches_mut() {
            for branch in branches.iter_mut().filter(|b| selection.contains(&b.next_step_id)) {
                branch.next_step_id.clear();
            }
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
    info!(
        steps = clipboard.steps.len(),
        removed_edges = conflicts.len(),
        "Steps cut"
    );
    debug_check_consistent(scenario, &next);
    Ok((next, clipboard))
}
