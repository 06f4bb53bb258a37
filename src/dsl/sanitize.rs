//! Import-time cleanup of dangling references.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::domain::model::Scenario;

/// What [`sanitize_scenario`] dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub dropped_edges: Vec<String>,
    /// `(step_id, branch_id)` pairs whose target was cleared.
    pub cleared_branches: Vec<(String, String)>,
    /// `(container_id, child_id)` memberships removed.
    pub dropped_children: Vec<(String, String)>,
    /// Previous start step id, when it had to be replaced.
    pub replaced_start: Option<String>,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_edges.is_empty()
            && self.cleared_branches.is_empty()
            && self.dropped_children.is_empty()
            && self.replaced_start.is_none()
    }
}

/// Drop every reference to a step that does not exist.
///
/// Container children that are missing, the container itself, already
/// claimed by another container, or that would close a containment cycle are
/// removed. Branch targets and edges pointing at missing steps go too, and an
/// invalid `startStepId` falls back to the first remaining root step.
/// Applying it twice changes nothing the second time.
pub fn sanitize_scenario(scenario: &Scenario) -> (Scenario, SanitizeReport) {
    let mut next = scenario.clone();
    let mut report = SanitizeReport::default();
    let ids: HashSet<String> = next.steps.iter().map(|s| s.id.clone()).collect();

    let mut parent: HashMap<String, String> = HashMap::new();
    for step in &mut next.steps {
        let container_id = step.id.clone();
        let Some(children) = step.child_ids_mut() else {
            continue;
        };
        let mut kept = Vec::with_capacity(children.len());
        for child in children.drain(..) {
            let closes_cycle = is_ancestor(&child, &container_id, &parent);
            if !ids.contains(&child) || child == container_id || parent.contains_key(&child) || closes_cycle {
                report.dropped_children.push((container_id.clone(), child));
                continue;
            }
            parent.insert(child.clone(), container_id.clone());
            kept.push(child);
        }
        *children = kept;
    }

    for step in &mut next.steps {
        let step_id = step.id.clone();
        if let Some(branches) = step.branches_mut() {
            for branch in branches.iter_mut() {
                if branch.has_target() && !ids.contains(&branch.next_step_id) {
                    report.cleared_branches.push((step_id.clone(), branch.id.clone()));
                    branch.next_step_id.clear();
                }
            }
        }
    }

    next.edges.retain(|e| {
        let keep = ids.contains(&e.source_step_id) && ids.contains(&e.target_step_id);
        if !keep {
            report.dropped_edges.push(e.id.clone());
        }
        keep
    });

    if !ids.contains(&next.start_step_id) {
        let fallback = next
            .root_step_ids()
            .first()
            .map(|s| s.to_string())
            .or_else(|| next.steps.first().map(|s| s.id.clone()))
            .unwrap_or_default();
        if fallback != next.start_step_id {
            report.replaced_start = Some(std::mem::replace(&mut next.start_step_id, fallback));
        }
    }

    if !report.is_clean() {
        warn!(
            scenario_id = %next.id,
            edges = report.dropped_edges.len(),
            branches = report.cleared_branches.len(),
            children = report.dropped_children.len(),
            start_replaced = report.replaced_start.is_some(),
            "Dropped dangling references on import"
        );
    }
    (next, report)
}

/// Whether `candidate` already encloses `step_id` in the partial parent map.
fn is_ancestor(candidate: &str, step_id: &str, parent: &HashMap<String, String>) -> bool {
    let mut current = step_id;
    for _ in 0..=parent.len() {
        if current == candidate {
            return true;
        }
        match parent.get(current) {
            Some(p) => current = p,
            None => return false,
        }
    }
    false
}
