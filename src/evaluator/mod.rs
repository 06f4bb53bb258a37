//! Branch condition evaluation.

pub mod condition;
pub mod operators;
pub mod type_coercion;

pub use condition::{evaluate_branches, evaluate_condition, BranchSelection};
