use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;

use serde_json::Value;
use xscenario::dsl::{load_scenario, parse_servers, DslFormat};
use xscenario::{EngineConfig, OverallStatus, ScenarioResult, ScenarioRunner};

const USAGE: &str = "usage: xscenario <scenario-file> <servers-file> [name=value ...]

Runs a scenario against the servers file and prints the overall result as
JSON. Parameter values are parsed as JSON when possible, otherwise taken as
plain strings. Set XSCENARIO_CONFIG to an engine config file (TOML or JSON)
and RUST_LOG to adjust logging.";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args[0], &args[1], &args[2..]).await {
        Ok(status) if status == OverallStatus::Success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    scenario_path: &str,
    servers_path: &str,
    raw_params: &[String],
) -> ScenarioResult<OverallStatus> {
    let scenario = load_scenario(scenario_path)?;
    let servers_content = std::fs::read_to_string(servers_path).map_err(|e| {
        xscenario::ScenarioError::ConfigError(format!("cannot read {}: {}", servers_path, e))
    })?;
    let servers = parse_servers(&servers_content, DslFormat::from_path(Path::new(servers_path)))?;

    let config = match std::env::var("XSCENARIO_CONFIG") {
        Ok(path) => EngineConfig::load(path)?,
        Err(_) => EngineConfig::default(),
    };

    let handle = ScenarioRunner::builder(scenario)
        .servers(servers)
        .params(parse_params(raw_params)?)
        .config(config)
        .collect_events(false)
        .run()
        .await?;
    let result = handle.wait().await?;

    let rendered = serde_json::to_string_pretty(&result)
        .map_err(|e| xscenario::ScenarioError::SerializeError(e.to_string()))?;
    println!("{}", rendered);
    Ok(result.status)
}

fn parse_params(raw: &[String]) -> ScenarioResult<HashMap<String, Value>> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                xscenario::ScenarioError::ConfigError(format!(
                    "parameter '{}' is not of the form name=value",
                    pair
                ))
            })?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((name.trim().to_string(), value))
        })
        .collect()
}
