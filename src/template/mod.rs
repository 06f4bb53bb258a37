//! `${...}` variable references.

pub mod variable_resolver;

pub use variable_resolver::{
    extract_references, lookup_reference, resolve_string, resolve_value, VariableLookup,
    WithResponse,
};
