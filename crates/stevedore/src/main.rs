// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! stevedore - Docker Swarm service deployment CLI
//!
//! Creates, updates and removes Swarm services from JSON definition files,
//! optionally waiting until the service's replicas converge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use stevedore::client::DockerSwarmClient;
use stevedore::config::{Config, ConvergeConfig};
use stevedore::definition::ServiceDefinition;
use stevedore::driver::ServiceReconciler;

#[derive(Parser)]
#[command(
    name = "stevedore",
    version,
    about = "Deploy Docker Swarm services and wait for them to converge"
)]
struct Cli {
    /// Docker daemon address (`unix://`, `tcp://` or `http://`).
    #[arg(long, global = true, env = "DOCKER_HOST")]
    docker_host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a service from a definition file.
    Create {
        /// Path to the JSON service definition.
        definition: PathBuf,
        /// Wait for convergence using the environment defaults when the
        /// definition has no converge_config.
        #[arg(long)]
        wait: bool,
    },
    /// Update an existing service from a definition file.
    Update {
        /// Service ID or name.
        service: String,
        /// Path to the JSON service definition.
        definition: PathBuf,
        /// Wait for convergence using the environment defaults when the
        /// definition has no converge_config.
        #[arg(long)]
        wait: bool,
    },
    /// Wait for an existing service to converge.
    Converge {
        /// Service ID or name.
        service: String,
        /// Track an update rollout instead of a fresh create.
        #[arg(long)]
        update: bool,
        /// Wait before the first poll (e.g. "7s").
        #[arg(long, value_parser = humantime::parse_duration)]
        delay: Option<Duration>,
        /// Convergence budget (e.g. "3m").
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
    /// Print a service's mode, version and update status as JSON.
    Inspect {
        /// Service ID or name.
        service: String,
    },
    /// Remove a service and wait for its tasks to stop.
    Remove {
        /// Service ID or name.
        service: String,
    },
}

fn load_definition(path: &Path, wait: bool, config: &Config) -> Result<ServiceDefinition> {
    let mut definition = ServiceDefinition::from_file(path)
        .with_context(|| format!("Failed to load service definition {}", path.display()))?;
    if wait && definition.converge_config.is_none() {
        definition.converge_config = Some(config.converge);
    }
    Ok(definition)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stevedore=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let docker_host = cli
        .docker_host
        .as_deref()
        .filter(|host| !host.is_empty())
        .or(config.docker_host.as_deref());
    let client = DockerSwarmClient::connect_to(docker_host)?;
    info!(
        docker_host = docker_host.unwrap_or("local socket"),
        "Connected to Docker"
    );
    let reconciler = ServiceReconciler::from_config(Arc::new(client), &config);

    match cli.command {
        Commands::Create { definition, wait } => {
            let definition = load_definition(&definition, wait, &config)?;
            let service_id = reconciler.create(&definition).await?;
            println!("{service_id}");
        }
        Commands::Update {
            service,
            definition,
            wait,
        } => {
            let definition = load_definition(&definition, wait, &config)?;
            let warnings = reconciler.update(&service, &definition).await?;
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
        }
        Commands::Converge {
            service,
            update,
            delay,
            timeout,
        } => {
            let converge = ConvergeConfig::new(
                delay.unwrap_or(config.converge.delay),
                timeout.unwrap_or(config.converge.timeout),
            );
            reconciler.converge(&service, &converge, update).await?;
        }
        Commands::Inspect { service } => {
            let inspection = reconciler.inspect(&service).await?;
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
        Commands::Remove { service } => {
            reconciler.remove(&service).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_docker_host_flag_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "inspect",
            "web",
            "--docker-host",
            "tcp://10.0.0.2:2375",
        ])
        .unwrap();
        assert_eq!(cli.docker_host.as_deref(), Some("tcp://10.0.0.2:2375"));
        assert!(matches!(cli.command, Commands::Inspect { service } if service == "web"));
    }

    #[test]
    fn test_converge_durations_parse() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "converge",
            "web",
            "--update",
            "--delay",
            "2s",
            "--timeout",
            "1m30s",
        ])
        .unwrap();
        match cli.command {
            Commands::Converge {
                update,
                delay,
                timeout,
                ..
            } => {
                assert!(update);
                assert_eq!(delay, Some(Duration::from_secs(2)));
                assert_eq!(timeout, Some(Duration::from_secs(90)));
            }
            _ => panic!("expected converge"),
        }
    }
}
