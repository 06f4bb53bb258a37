mod known_types;
mod layer1_structure;
mod layer2_topology;
mod layer3_semantic;
mod types;

use serde_json::Value;

use crate::domain::model::Scenario;

pub use known_types::{is_known_method, is_known_step_type, STEP_TYPES};
pub use types::{Diagnostic, DiagnosticLevel, ValidationReport};

/// Validate a raw scenario document.
///
/// Shape errors stop validation before the document is bound; otherwise the
/// bound scenario goes through the topology and semantic layers too.
pub fn validate_scenario_value(doc: &Value) -> ValidationReport {
    let diagnostics = layer1_structure::validate(doc);
    if diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error) {
        return ValidationReport::from_diagnostics(diagnostics);
    }

    match serde_json::from_value::<Scenario>(doc.clone()) {
        Ok(scenario) => {
            let mut diagnostics = diagnostics;
            diagnostics.extend(validate_scenario(&scenario).diagnostics);
            ValidationReport::from_diagnostics(diagnostics)
        }
        Err(err) => {
            let mut diagnostics = diagnostics;
            diagnostics.push(Diagnostic::error(
                "E007",
                format!("Scenario does not match the schema: {}", err),
            ));
            ValidationReport::from_diagnostics(diagnostics)
        }
    }
}

/// Topology and semantic checks on an already-bound scenario.
pub fn validate_scenario(scenario: &Scenario) -> ValidationReport {
    let mut diagnostics = layer2_topology::validate(scenario);
    diagnostics.extend(layer3_semantic::validate(scenario));
    ValidationReport::from_diagnostics(diagnostics)
}
