pub const STEP_TYPES: &[&str] = &["request", "condition", "loop", "group"];

pub const LOOP_TYPES: &[&str] = &["count", "forEach", "while"];

pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Top-level fields every scenario document must carry.
pub const REQUIRED_SCENARIO_FIELDS: &[&str] = &["id", "name", "steps", "edges"];

/// Top-level fields that must be arrays when present.
pub const ARRAY_SCENARIO_FIELDS: &[&str] = &["steps", "edges", "parameterSchema", "serverIds"];

pub fn is_known_step_type(step_type: &str) -> bool {
    STEP_TYPES.contains(&step_type)
}

pub fn is_known_method(method: &str) -> bool {
    HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str())
}
