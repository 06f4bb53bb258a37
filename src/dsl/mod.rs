//! Scenario documents: parsing, validation, sanitization, and backend maps.

pub mod parser;
pub mod sanitize;
pub mod servers;
pub mod validation;

pub use parser::{load_scenario, parse_scenario, parse_value, serialize_scenario, DslFormat};
pub use sanitize::{sanitize_scenario, SanitizeReport};
pub use servers::{parse_servers, servers_from_value};
pub use validation::{
    validate_scenario, validate_scenario_value, Diagnostic, DiagnosticLevel, ValidationReport,
};
