use std::collections::HashMap;

use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::stable_graph::{EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use petgraph::Direction;

use crate::domain::model::Scenario;

/// Why one step can lead to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowLink {
    /// Diagram edge.
    Edge,
    /// Branch `nextStepId`.
    Branch,
    /// Container to direct child.
    Contains,
    /// Child back to its container; the container's successor runs after the body.
    Resumes,
}

/// Directed view of every way control can move between steps.
///
/// Built from both topology representations so reachability stays
/// conservative even when they disagree.
#[derive(Debug)]
pub struct FlowGraph {
    graph: StableDiGraph<String, FlowLink>,
    index: HashMap<String, NodeIndex>,
}

impl FlowGraph {
    pub fn build(scenario: &Scenario) -> Self {
        let mut graph = StableDiGraph::new();
        let mut index = HashMap::new();
        for step in &scenario.steps {
            let idx = graph.add_node(step.id.clone());
            index.insert(step.id.clone(), idx);
        }

        let mut link = |from: &str, to: &str, kind: FlowLink| {
            if let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) {
                graph.add_edge(a, b, kind);
            }
        };

        for edge in &scenario.edges {
            link(&edge.source_step_id, &edge.target_step_id, FlowLink::Edge);
        }
        for step in &scenario.steps {
            for branch in step.branches().iter().filter(|b| b.has_target()) {
                link(&step.id, &branch.next_step_id, FlowLink::Branch);
            }
            if let Some(children) = step.child_ids() {
                for child in children {
                    link(&step.id, child, FlowLink::Contains);
                    link(child, &step.id, FlowLink::Resumes);
                }
            }
        }

        Self { graph, index }
    }

    /// Whether control can get from `from` to `to` (a step reaches itself).
    pub fn reachable(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    pub fn successors(&self, step_id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(step_id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// True when container membership alone forms a cycle.
    pub fn has_containment_cycle(&self) -> bool {
        let containment = EdgeFiltered::from_fn(&self.graph, |e: EdgeReference<'_, FlowLink>| {
            *e.weight() == FlowLink::Contains
        });
        is_cyclic_directed(&containment)
    }
}
