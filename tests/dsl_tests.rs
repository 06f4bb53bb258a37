use std::io::Write;

use xscenario::dsl::{
    load_scenario, parse_scenario, parse_servers, sanitize_scenario, serialize_scenario,
    validate_scenario_value, DslFormat,
};
use xscenario::graph::verify_topology;
use xscenario::ScenarioError;

const LOGIN_FLOW: &str = r#"{
  "id": "login-flow",
  "name": "Login flow",
  "version": "1.0.0",
  "serverIds": ["auth"],
  "startStepId": "login",
  "parameterSchema": [
    {"name": "user", "type": "string", "required": true},
    {"name": "retries", "type": "number", "defaultValue": 2}
  ],
  "steps": [
    {
      "id": "login",
      "name": "Login",
      "type": "request",
      "serverId": "auth",
      "method": "POST",
      "endpoint": "/login",
      "headers": [{"key": "X-Trace", "value": "${user}"}],
      "body": {"user": "${user}"},
      "saveResponse": true,
      "responseAlias": "session"
    },
    {
      "id": "check",
      "name": "Logged in?",
      "type": "condition",
      "branches": [
        {
          "id": "ok",
          "condition": {"variable": "session.status", "operator": "==", "value": 200},
          "nextStepId": "poll"
        },
        {"id": "fallback", "isDefault": true, "nextStepId": ""}
      ]
    },
    {
      "id": "poll",
      "name": "Poll",
      "type": "loop",
      "loop": {"type": "count", "count": "${retries}"},
      "stepIds": ["status"],
      "variableName": "attempt"
    },
    {
      "id": "status",
      "name": "Status",
      "type": "request",
      "serverId": "auth",
      "method": "get",
      "endpoint": "/status"
    }
  ],
  "edges": [
    {"id": "e1", "sourceStepId": "login", "targetStepId": "check"},
    {"id": "e2", "sourceStepId": "check", "targetStepId": "poll", "sourceHandle": "ok"}
  ]
}"#;

#[test]
fn test_json_round_trip_is_lossless() {
    let scenario = parse_scenario(LOGIN_FLOW, DslFormat::Json).unwrap();
    let text = serialize_scenario(&scenario, DslFormat::Json).unwrap();
    let reparsed = parse_scenario(&text, DslFormat::Json).unwrap();
    assert_eq!(scenario, reparsed);
    assert!(verify_topology(&scenario).is_empty());
}

#[test]
fn test_yaml_output_reads_back() {
    let scenario = parse_scenario(LOGIN_FLOW, DslFormat::Json).unwrap();
    let text = serialize_scenario(&scenario, DslFormat::Yaml).unwrap();
    let reparsed = parse_scenario(&text, DslFormat::Yaml).unwrap();
    assert_eq!(scenario, reparsed);
}

#[test]
fn test_yaml_output_is_not_json() {
    let scenario = parse_scenario(LOGIN_FLOW, DslFormat::Json).unwrap();
    let text = serialize_scenario(&scenario, DslFormat::Yaml).unwrap();
    assert!(!text.trim_start().starts_with('{'));
    assert!(text.contains("startStepId: login"));
}

#[test]
fn test_toml_round_trip_with_operand_free_conditions() {
    let doc = r#"{
      "id": "token-check",
      "name": "Token check",
      "startStepId": "check",
      "steps": [
        {"id": "check", "name": "Check", "type": "condition", "branches": [
          {"id": "has", "condition": {"variable": "token", "operator": "not_empty"}, "nextStepId": "use"},
          {"id": "none", "condition": {"variable": "token", "operator": "null"}}
        ]},
        {"id": "use", "name": "Use", "type": "request", "serverId": "api", "method": "GET", "endpoint": "/me"}
      ],
      "edges": [{"id": "e1", "sourceStepId": "check", "targetStepId": "use", "sourceHandle": "has"}]
    }"#;
    let scenario = parse_scenario(doc, DslFormat::Json).unwrap();
    let text = serialize_scenario(&scenario, DslFormat::Toml).unwrap();
    assert!(!text.contains("value ="));
    let reparsed = parse_scenario(&text, DslFormat::Toml).unwrap();
    assert_eq!(scenario, reparsed);
}

#[test]
fn test_yaml_document_parses() {
    let yaml = r#"
id: health
name: Health check
startStepId: ping
steps:
  - id: ping
    name: Ping
    type: request
    serverId: api
    method: GET
    endpoint: /health
    timeoutMs: 500
edges: []
"#;
    let scenario = parse_scenario(yaml, DslFormat::Yaml).unwrap();
    assert_eq!(scenario.steps.len(), 1);
    assert_eq!(scenario.start_step_id, "ping");
}

#[test]
fn test_toml_document_parses() {
    let toml = r#"
id = "health"
name = "Health check"
startStepId = "ping"
edges = []

[[steps]]
id = "ping"
name = "Ping"
type = "request"
serverId = "api"
method = "GET"
endpoint = "/health"
"#;
    let scenario = parse_scenario(toml, DslFormat::Toml).unwrap();
    assert_eq!(scenario.steps[0].type_name(), "request");
}

#[test]
fn test_dangling_references_converge_to_fixed_point() {
    let dirty = r#"{
      "id": "dirty",
      "name": "Dirty",
      "startStepId": "gone",
      "steps": [
        {"id": "g", "name": "G", "type": "group", "stepIds": ["a", "ghost"]},
        {"id": "a", "name": "A", "type": "condition", "branches": [
          {"id": "b1", "condition": {"variable": "x", "operator": "not_empty"}, "nextStepId": "ghost"}
        ]}
      ],
      "edges": [
        {"id": "e1", "sourceStepId": "a", "targetStepId": "ghost", "sourceHandle": "b1"}
      ]
    }"#;

    let first = parse_scenario(dirty, DslFormat::Json).unwrap();
    assert_eq!(first.start_step_id, "g");
    assert!(first.edges.is_empty());
    assert_eq!(first.step("g").unwrap().child_ids().unwrap(), ["a".to_string()]);
    assert!(!first.step("a").unwrap().branch("b1").unwrap().has_target());

    let text = serialize_scenario(&first, DslFormat::Json).unwrap();
    let second = parse_scenario(&text, DslFormat::Json).unwrap();
    assert_eq!(first, second);
    let (third, report) = sanitize_scenario(&second);
    assert!(report.is_clean());
    assert_eq!(second, third);
}

#[test]
fn test_missing_fields_and_non_arrays_rejected() {
    let err = parse_scenario(r#"{"id": "x", "steps": {}, "edges": []}"#, DslFormat::Json)
        .unwrap_err();
    match err {
        ScenarioError::ValidationFailed(report) => {
            assert!(report.has_code("E004"));
            assert!(report.has_code("E005"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_validation_flags_unknown_step_type() {
    let value = serde_json::json!({
        "id": "x",
        "name": "X",
        "steps": [{"id": "s", "name": "S", "type": "teleport"}],
        "edges": []
    });
    let report = validate_scenario_value(&value);
    assert!(!report.is_valid);
    assert!(report.has_code("E009"));
}

#[test]
fn test_load_scenario_uses_extension() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(LOGIN_FLOW.as_bytes()).unwrap();
    let scenario = load_scenario(file.path()).unwrap();
    assert_eq!(scenario.id, "login-flow");
}

#[test]
fn test_servers_from_map_and_list() {
    let map = parse_servers(
        r#"
auth:
  baseUrl: https://auth.example
  headers:
    X-Env: test
  timeout: 1500
"#,
        DslFormat::Yaml,
    )
    .unwrap();
    assert_eq!(map["auth"].id, "auth");
    assert_eq!(map["auth"].timeout, 1500);

    let list = parse_servers(
        r#"[{"id": "api", "baseUrl": "http://localhost:8080"}]"#,
        DslFormat::Json,
    )
    .unwrap();
    assert_eq!(list["api"].base_url, "http://localhost:8080");
}

#[test]
fn test_servers_reject_bad_url() {
    let err = parse_servers(r#"[{"id": "api", "baseUrl": "ftp://x"}]"#, DslFormat::Json)
        .unwrap_err();
    assert!(matches!(err, ScenarioError::ConfigError(_)));
}
