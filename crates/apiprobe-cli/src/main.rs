//! # apiprobe CLI Entry Point
//!
//! Runs one-shot requests and health checks against the services declared in
//! a JSON configuration file, or keeps monitoring them until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Check a configuration file
//! apiprobe validate services.json
//!
//! # Make one request (outputs raw JSON)
//! apiprobe call services.json users /users/1
//! apiprobe call services.json users /users -X POST -H "X-Trace: 1" -d '{"name":"Ada"}'
//!
//! # Check health once
//! apiprobe health services.json -s users
//!
//! # Monitor until Ctrl-C
//! apiprobe watch services.json
//!
//! # Take the config path from the environment
//! APIPROBE_CONFIG=services.json apiprobe watch -
//! ```

use anyhow::{Context, Result};
use apiprobe_client::Method;
use apiprobe_common::{ApiprobeError, ConfigurationData};
use apiprobe_monitor::{HealthStatus, ServiceCoordinator};
use argh::FromArgs;
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable read when the config path is `-`.
const CONFIG_ENV: &str = "APIPROBE_CONFIG";

#[derive(FromArgs)]
/// apiprobe - resilient HTTP client and health monitor for backend services
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Validate(ValidateArgs),
    Call(CallArgs),
    Health(HealthArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "validate")]
/// check a configuration file and report every error
struct ValidateArgs {
    /// path to the JSON configuration, or "-" to use $APIPROBE_CONFIG
    #[argh(positional)]
    config: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one request to a service (outputs raw JSON)
struct CallArgs {
    /// path to the JSON configuration, or "-" to use $APIPROBE_CONFIG
    #[argh(positional)]
    config: String,

    /// name of the service to call
    #[argh(positional)]
    service: String,

    /// request path relative to the service endpoint
    #[argh(positional)]
    path: String,

    /// the HTTP method to use
    #[argh(option, short = 'X', long = "method", default = "String::from(\"GET\")")]
    method: String,

    /// extra header as "Name: value", may be repeated
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,

    /// request body as JSON
    #[argh(option, short = 'd', long = "data")]
    data: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "health")]
/// run one health check and print the results as JSON
struct HealthArgs {
    /// path to the JSON configuration, or "-" to use $APIPROBE_CONFIG
    #[argh(positional)]
    config: String,

    /// only check this service
    #[argh(option, short = 's', long = "service")]
    service: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// monitor all services and log status changes until Ctrl-C
struct WatchArgs {
    /// path to the JSON configuration, or "-" to use $APIPROBE_CONFIG
    #[argh(positional)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep stdout clean for piping into jq
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Validate(args) => run_validate(args),
        Commands::Call(args) => run_call(args).await,
        Commands::Health(args) => run_health(args).await,
        Commands::Watch(args) => run_watch(args).await,
    }
}

/// Resolves the config path argument, honouring `-`.
fn resolve_config_path(arg: &str, env_value: Option<String>) -> Result<PathBuf> {
    if arg != "-" {
        return Ok(PathBuf::from(arg));
    }
    match env_value {
        Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
        _ => Err(anyhow::anyhow!(
            "config path is '-' but {} is not set",
            CONFIG_ENV
        )),
    }
}

fn load_config(arg: &str) -> Result<ConfigurationData> {
    let path = resolve_config_path(arg, std::env::var(CONFIG_ENV).ok())?;
    ConfigurationData::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Parses a `"Name: value"` header argument.
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid header '{}': expected \"Name: value\"", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid HTTP method '{}': {}", raw, e))
}

/// Initializes a coordinator for one-shot commands, without the background loop.
async fn one_shot(mut config: ConfigurationData) -> Result<ServiceCoordinator> {
    config.gateway.health_check_enabled = false;
    let coordinator = ServiceCoordinator::new();
    coordinator.initialize(config).await?;
    Ok(coordinator)
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {}", error);
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    println!(
        "Configuration '{}' is valid: {} service(s)",
        config.gateway.name,
        config.services.len()
    );
    for service in &config.services {
        println!(
            "  {} -> {} (health: {})",
            service.name,
            service.endpoint,
            service.health_path()
        );
    }
    Ok(())
}

/// Executes the `call` subcommand.
///
/// Prints the response as one line of JSON. Fails after printing when the
/// request did not succeed, so scripts can branch on the exit status.
async fn run_call(args: CallArgs) -> Result<()> {
    let method = parse_method(&args.method)?;
    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<HashMap<_, _>>>()?;
    let body: Option<serde_json::Value> = args
        .data
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid JSON in data: {}", e))?;

    let coordinator = one_shot(load_config(&args.config)?).await?;
    let response = coordinator
        .execute_request(
            &args.service,
            &args.path,
            method,
            (!headers.is_empty()).then_some(&headers),
            body.as_ref(),
        )
        .await;
    coordinator.shutdown().await;

    println!("{}", serde_json::to_string(&response)?);

    if !response.result.success {
        anyhow::bail!("{}", response.result.error_message());
    }
    Ok(())
}

async fn run_health(args: HealthArgs) -> Result<()> {
    let coordinator = one_shot(load_config(&args.config)?).await?;
    let results = coordinator.force_health_check(args.service.as_deref()).await;
    coordinator.shutdown().await;

    if let (Some(name), true) = (&args.service, results.is_empty()) {
        return Err(ApiprobeError::UnknownService(name.clone()).into());
    }

    println!("{}", serde_json::to_string_pretty(&results)?);

    let unhealthy = results
        .iter()
        .filter(|info| info.status != HealthStatus::Healthy)
        .count();
    if unhealthy > 0 {
        anyhow::bail!("{} of {} service(s) unhealthy", unhealthy, results.len());
    }
    Ok(())
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if !config.gateway.health_check_enabled {
        tracing::warn!("Health checks are disabled in the configuration, enabling them for watch");
        config.gateway.health_check_enabled = true;
    }

    let coordinator = ServiceCoordinator::new();
    coordinator.add_status_callback(|service, info| {
        tracing::info!(
            service,
            status = %info.status,
            uptime = info.uptime_percentage(),
            "Status changed"
        );
        Ok(())
    });
    coordinator.initialize(config).await?;

    tracing::info!(
        "Watching {} service(s), press Ctrl-C to stop",
        coordinator.service_names().await.len()
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    coordinator.shutdown().await;
    Ok(())
}
