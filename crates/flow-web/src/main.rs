use flow_core::config::{load_service_config, ConfigError};
use flow_core::validation::{Validate, ValidationIssue, ValidationLevel};
use flow_web::{run_web_server, AppState, WebError};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_CONFIG: &str = ".fieldflow/config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    config_path: PathBuf,
    bind_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Run(CliArgs),
    Help(String),
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Args(String),
    #[error("failed to load config at {path}: {source}")]
    LoadConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("{0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
    #[error(transparent)]
    Web(#[from] WebError),
}

#[tokio::main]
async fn main() {
    flowd::logging::init();
    if let Err(err) = run().await {
        eprintln!("flow-web failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MainError> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "flow-web".to_string());
    let command = parse_cli_args(argv.collect::<Vec<_>>(), &program)?;
    let CliCommand::Run(args) = command else {
        let CliCommand::Help(text) = command else {
            unreachable!();
        };
        println!("{text}");
        return Ok(());
    };

    let config = load_service_config(&args.config_path).map_err(|source| MainError::LoadConfig {
        path: args.config_path.clone(),
        source,
    })?;
    validate_config(&config.validate())?;
    let bind = resolve_bind(args.bind_override, &config.web.bind)?;

    let engine = flowd::cli::open_engine(&config)?;
    println!("flow-web binding to {bind}");
    run_web_server(&bind, AppState::new(Arc::new(engine))).await?;
    Ok(())
}

fn resolve_bind(bind_override: Option<String>, config_bind: &str) -> Result<String, MainError> {
    let candidate = bind_override.unwrap_or_else(|| config_bind.to_string());
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(MainError::Args(
            "bind address must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_config(issues: &[ValidationIssue]) -> Result<(), MainError> {
    let errors = issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        return Ok(());
    }

    let rendered = errors
        .iter()
        .map(|issue| format!("{}: {}", issue.code, issue.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(MainError::InvalidConfig(format!(
        "config validation failed ({})",
        rendered
    )))
}

fn parse_cli_args(args: Vec<String>, program: &str) -> Result<CliCommand, MainError> {
    let mut parsed = CliArgs {
        config_path: PathBuf::from(DEFAULT_CONFIG),
        bind_override: None,
    };

    let mut idx = 0usize;
    while idx < args.len() {
        let arg = &args[idx];
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliCommand::Help(usage(program))),
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| MainError::Args("missing value for --config".to_string()))?;
                parsed.config_path = PathBuf::from(value);
            }
            "--bind" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| MainError::Args("missing value for --bind".to_string()))?;
                parsed.bind_override = Some(value.clone());
            }
            other => {
                return Err(MainError::Args(format!(
                    "unknown argument: {other}\n\n{}",
                    usage(program)
                )));
            }
        }
        idx += 1;
    }

    Ok(CliCommand::Run(parsed))
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--config <path>] [--bind <ip:port>]\n\
Defaults:\n\
  --config {DEFAULT_CONFIG}\n\
  --bind from config.web.bind"
    )
}
