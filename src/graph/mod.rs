//! Scenario topology: structural edits, nesting limits, and edge conflicts.
//!
//! Topology is stored twice, as the edge list and as branch `nextStepId` /
//! container `stepIds` references. Every mutator in [`topology`] and
//! [`conflict`] updates both in one step; [`verify_topology`] reports where
//! they disagree.

pub mod conflict;
pub mod flow;
pub mod nesting;
pub mod topology;

pub use conflict::{
    cut_steps, detect_conflicts, move_steps, resolve_conflicts, Clipboard, ConflictType,
    EdgeConflict, StructuralOperation,
};
pub use flow::{FlowGraph, FlowLink};
pub use nesting::{
    container_depth, subtree_height, would_exceed_limit, DEFAULT_MAX_NESTING_DEPTH,
};
pub use topology::{add_edge, add_step, delete_edge, delete_step, verify_topology, TopologyViolation};
