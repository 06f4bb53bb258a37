use std::collections::HashSet;

use serde_json::{Map, Value};

use super::known_types::{
    is_known_method, is_known_step_type, ARRAY_SCENARIO_FIELDS, LOOP_TYPES,
    REQUIRED_SCENARIO_FIELDS,
};
use super::types::Diagnostic;

/// Shape checks on the raw document, before it is bound to typed structs.
pub fn validate(doc: &Value) -> Vec<Diagnostic> {
    let mut diags = Vec::new();

    let Some(root) = doc.as_object() else {
        diags.push(Diagnostic::error("E003", "Scenario document must be an object"));
        return diags;
    };

    for field in REQUIRED_SCENARIO_FIELDS {
        if !root.contains_key(*field) {
            diags.push(
                Diagnostic::error("E004", format!("Missing required field: {}", field))
                    .at_field(*field),
            );
        }
    }
    for field in ARRAY_SCENARIO_FIELDS {
        if root.get(*field).is_some_and(|v| !v.is_array()) {
            diags.push(
                Diagnostic::error("E005", format!("Field must be an array: {}", field))
                    .at_field(*field),
            );
        }
    }

    if let Some(steps) = root.get("steps").and_then(Value::as_array) {
        let mut ids = HashSet::new();
        for (idx, step) in steps.iter().enumerate() {
            validate_step(step, idx, &mut ids, &mut diags);
        }
    }

    if let Some(edges) = root.get("edges").and_then(Value::as_array) {
        let mut ids = HashSet::new();
        for (idx, edge) in edges.iter().enumerate() {
            validate_edge(edge, idx, &mut ids, &mut diags);
        }
    }

    diags
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn validate_step(step: &Value, idx: usize, ids: &mut HashSet<String>, diags: &mut Vec<Diagnostic>) {
    let path = format!("steps[{}]", idx);
    let Some(obj) = step.as_object() else {
        diags.push(Diagnostic::error("E006", "Step must be an object").at_field(path));
        return;
    };

    let id = str_field(obj, "id").unwrap_or_default().trim().to_string();
    if id.is_empty() {
        diags.push(Diagnostic::error("E008", "Step id is empty").at_field(format!("{}.id", path)));
    } else if !ids.insert(id.clone()) {
        diags.push(
            Diagnostic::error("E010", format!("Duplicate step id: {}", id)).at_step(id.clone()),
        );
    }

    let located = |d: Diagnostic| if id.is_empty() { d } else { d.at_step(id.clone()) };

    if str_field(obj, "name").map_or(true, |n| n.trim().is_empty()) {
        diags.push(located(
            Diagnostic::warning("W001", "Step name is empty").at_field(format!("{}.name", path)),
        ));
    }

    let step_type = str_field(obj, "type").unwrap_or_default();
    if !is_known_step_type(step_type) {
        diags.push(located(
            Diagnostic::error("E009", format!("Unknown step type: {}", step_type))
                .at_field(format!("{}.type", path)),
        ));
        return;
    }

    let require = |key: &str, diags: &mut Vec<Diagnostic>| {
        if !obj.contains_key(key) {
            diags.push(located(
                Diagnostic::error("E011", format!("{} step requires field: {}", step_type, key))
                    .at_field(format!("{}.{}", path, key)),
            ));
            false
        } else {
            true
        }
    };
    let require_array = |key: &str, diags: &mut Vec<Diagnostic>| {
        if obj.get(key).is_some_and(|v| !v.is_array()) {
            diags.push(located(
                Diagnostic::error("E005", format!("Field must be an array: {}", key))
                    .at_field(format!("{}.{}", path, key)),
            ));
        }
    };

    match step_type {
        "request" => {
            require("serverId", diags);
            require("endpoint", diags);
            if require("method", diags) {
                let method = str_field(obj, "method").unwrap_or_default();
                if !is_known_method(method) {
                    diags.push(located(
                        Diagnostic::error("E016", format!("Unsupported HTTP method: {}", method))
                            .at_field(format!("{}.method", path)),
                    ));
                }
            }
            require_array("headers", diags);
            require_array("branches", diags);
        }
        "condition" => {
            if require("branches", diags) {
                require_array("branches", diags);
            }
        }
        "loop" => {
            require_array("stepIds", diags);
            if require("loop", diags) {
                validate_loop_config(obj.get("loop"), &path, diags, &located);
            }
        }
        _ => require_array("stepIds", diags),
    }

    if let Some(branches) = obj.get("branches").and_then(Value::as_array) {
        let defaults = branches
            .iter()
            .filter(|b| b.get("isDefault").and_then(Value::as_bool).unwrap_or(false))
            .count();
        if defaults > 1 {
            diags.push(located(
                Diagnostic::error("E013", format!("{} branches are marked default", defaults))
                    .at_field(format!("{}.branches", path)),
            ));
        }
        for (bidx, branch) in branches.iter().enumerate() {
            if branch.get("id").and_then(Value::as_str).map_or(true, str::is_empty) {
                diags.push(located(
                    Diagnostic::error("E014", "Branch id is empty")
                        .at_field(format!("{}.branches[{}].id", path, bidx)),
                ));
            }
        }
    }
}

fn validate_loop_config(
    config: Option<&Value>,
    path: &str,
    diags: &mut Vec<Diagnostic>,
    located: &dyn Fn(Diagnostic) -> Diagnostic,
) {
    let field = format!("{}.loop", path);
    let Some(config) = config.and_then(Value::as_object) else {
        diags.push(located(Diagnostic::error("E012", "Loop config must be an object").at_field(field)));
        return;
    };
    let loop_type = str_field(config, "type").unwrap_or_default();
    let needed = match loop_type {
        "count" => "count",
        "forEach" => "source",
        "while" => "condition",
        other => {
            diags.push(located(
                Diagnostic::error(
                    "E012",
                    format!("Unknown loop type: {} (expected one of {})", other, LOOP_TYPES.join(", ")),
                )
                .at_field(format!("{}.type", field)),
            ));
            return;
        }
    };
    if !config.contains_key(needed) {
        diags.push(located(
            Diagnostic::error("E012", format!("{} loop requires field: {}", loop_type, needed))
                .at_field(format!("{}.{}", field, needed)),
        ));
    }
}

fn validate_edge(edge: &Value, idx: usize, ids: &mut HashSet<String>, diags: &mut Vec<Diagnostic>) {
    let path = format!("edges[{}]", idx);
    let Some(obj) = edge.as_object() else {
        diags.push(Diagnostic::error("E006", "Edge must be an object").at_field(path));
        return;
    };
    let id = str_field(obj, "id").unwrap_or_default();
    for key in ["id", "sourceStepId", "targetStepId"] {
        if str_field(obj, key).map_or(true, str::is_empty) {
            let d = Diagnostic::error("E014", format!("Edge requires field: {}", key))
                .at_field(format!("{}.{}", path, key));
            diags.push(if id.is_empty() { d } else { d.at_edge(id) });
        }
    }
    if !id.is_empty() && !ids.insert(id.to_string()) {
        diags.push(Diagnostic::error("E015", format!("Duplicate edge id: {}", id)).at_edge(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes(doc: Value) -> Vec<String> {
        validate(&doc).into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_non_object_root() {
        assert_eq!(codes(json!([1, 2])), vec!["E003"]);
    }

    #[test]
    fn test_missing_and_non_array_fields() {
        let found = codes(json!({"id": "s", "steps": {}, "edges": []}));
        assert!(found.contains(&"E004".to_string()));
        assert!(found.contains(&"E005".to_string()));
    }

    #[test]
    fn test_step_checks() {
        let found = codes(json!({
            "id": "s", "name": "S", "edges": [],
            "steps": [
                {"id": "a", "name": "A", "type": "request", "serverId": "api", "method": "FETCH", "endpoint": "/"},
                {"id": "a", "name": "A2", "type": "condition", "branches": [
                    {"id": "b1", "isDefault": true}, {"id": "b2", "isDefault": true}
                ]},
                {"id": "l", "name": "L", "type": "loop", "loop": {"type": "until"}, "stepIds": []},
                {"id": "x", "name": "X", "type": "teleport"}
            ]
        }));
        for code in ["E016", "E010", "E013", "E012", "E009"] {
            assert!(found.contains(&code.to_string()), "missing {code} in {found:?}");
        }
    }

    #[test]
    fn test_edge_checks() {
        let found = codes(json!({
            "id": "s", "name": "S", "steps": [],
            "edges": [
                {"id": "e1", "sourceStepId": "a"},
                {"id": "e1", "sourceStepId": "a", "targetStepId": "b"}
            ]
        }));
        assert_eq!(found, vec!["E014", "E015"]);
    }

    #[test]
    fn test_well_formed_document_is_clean() {
        let found = codes(json!({
            "id": "s", "name": "S", "edges": [], "serverIds": ["api"],
            "steps": [
                {"id": "a", "name": "A", "type": "request", "serverId": "api", "method": "get", "endpoint": "/"},
                {"id": "l", "name": "L", "type": "loop", "loop": {"type": "count", "count": 2}, "stepIds": ["a"]}
            ]
        }));
        assert!(found.is_empty(), "{found:?}");
    }
}
