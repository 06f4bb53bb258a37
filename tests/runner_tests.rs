use serde_json::json;

use xscenario::dsl::{parse_scenario, parse_servers, DslFormat};
use xscenario::{OverallStatus, ScenarioError, ScenarioRunner, StepStatus};

const FLOW: &str = r#"
id: login-flow
name: Login flow
serverIds: [auth]
startStepId: login
parameterSchema:
  - name: user
    type: string
    required: true
  - name: retries
    type: number
    defaultValue: 2
steps:
  - id: login
    name: Login
    type: request
    serverId: auth
    method: POST
    endpoint: /login
    body:
      user: "${user}"
    saveResponse: true
    responseAlias: session
  - id: check
    name: Logged in?
    type: condition
    branches:
      - id: ok
        condition:
          variable: session.body.token
          operator: not_empty
        nextStepId: poll
      - id: denied
        isDefault: true
        nextStepId: ""
  - id: poll
    name: Poll
    type: loop
    loop:
      type: count
      count: "${retries}"
    stepIds: [status]
    variableName: attempt
  - id: status
    name: Status
    type: request
    serverId: auth
    method: GET
    endpoint: /status/${attempt}
    headers:
      - key: Authorization
        value: Bearer ${session.body.token}
edges:
  - id: e1
    sourceStepId: login
    targetStepId: check
  - id: e2
    sourceStepId: check
    targetStepId: poll
    sourceHandle: ok
"#;

#[tokio::test]
async fn test_login_flow_against_mock_backend() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", "/login")
        .match_body(mockito::Matcher::Json(json!({"user": "ada"})))
        .match_header("x-env", "test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"tok-1"}"#)
        .create_async()
        .await;
    let status = server
        .mock("GET", mockito::Matcher::Regex(r"^/status/\d+$".into()))
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_body("up")
        .expect(2)
        .create_async()
        .await;

    let servers = parse_servers(
        &format!(
            r#"{{"auth": {{"baseUrl": "{}", "headers": {{"X-Env": "test"}}}}}}"#,
            server.url()
        ),
        DslFormat::Json,
    )
    .unwrap();
    let scenario = parse_scenario(FLOW, DslFormat::Yaml).unwrap();

    let handle = ScenarioRunner::builder(scenario)
        .servers(servers)
        .param("user", json!("ada"))
        .run()
        .await
        .unwrap();
    let result = handle.wait().await.unwrap();

    login.assert_async().await;
    status.assert_async().await;
    assert_eq!(result.status, OverallStatus::Success);
    assert_eq!(result.saved_responses["session"]["body"]["token"], json!("tok-1"));

    let statuses: Vec<_> = result.results_for("status").collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|r| r.status == StepStatus::Success));
    assert_eq!(statuses[1].response.as_ref().unwrap().body, json!("up"));
}

#[tokio::test]
async fn test_server_error_is_recorded_on_step() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/login")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let servers = parse_servers(
        &format!(r#"[{{"id": "auth", "baseUrl": "{}"}}]"#, server.url()),
        DslFormat::Json,
    )
    .unwrap();
    let scenario = parse_scenario(FLOW, DslFormat::Yaml).unwrap();

    let result = ScenarioRunner::builder(scenario)
        .servers(servers)
        .param("user", json!("ada"))
        .stop_on_error(true)
        .run()
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(result.status, OverallStatus::Failed);
    let login = result.results_for("login").next().unwrap();
    assert_eq!(login.status, StepStatus::Failed);
    assert_eq!(login.error.as_ref().unwrap().http_status, Some(503));
    assert_eq!(login.response.as_ref().unwrap().body, json!("maintenance"));
}

#[tokio::test]
async fn test_missing_required_parameter_blocks_launch() {
    let scenario = parse_scenario(FLOW, DslFormat::Yaml).unwrap();
    let servers = parse_servers(r#"[{"id": "auth", "baseUrl": "http://127.0.0.1:1"}]"#, DslFormat::Json)
        .unwrap();
    let err = ScenarioRunner::builder(scenario)
        .servers(servers)
        .run()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ScenarioError::MissingParameters { missing } if missing == vec!["user"]));
}
