//! Domain layer: pure data model shared across the crate.
//!
//! Submodules:
//! - [`model`]: The authored scenario graph: steps, branches, edges,
//!   containers, and backend definitions. Pure data, no behaviour beyond
//!   lookups.
//! - [`execution`]: Per-run state: the execution context, step results, and
//!   statuses.

pub mod execution;
pub mod model;
