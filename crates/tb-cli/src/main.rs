mod cli;
mod error;
mod status_server;

use std::process::ExitCode;

use clap::Parser;
use tb_deploy::{Deployment, Settings};
use tb_infra::Provisioner;
use tb_infra::digitalocean::DigitalOceanProvider;
use tb_infra::types::MachineId;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, DeployArgs, DestroyArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::Destroy(args)) => destroy(args).await,
        Some(Command::Deploy(args)) => deploy(args).await,
        None => deploy(cli.deploy).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tunnelbox failed");
            ExitCode::FAILURE
        }
    }
}

fn require_token(token: Option<String>) -> Result<String, CliError> {
    token
        .filter(|t| !t.trim().is_empty())
        .ok_or(CliError::MissingToken)
}

async fn deploy(args: DeployArgs) -> Result<(), CliError> {
    let token = require_token(args.token)?;
    let mut settings = Settings::from_env();
    if let Some(dir) = args.config_dir {
        settings.config_dir = dir;
    }

    let mut deployment =
        Deployment::create_with_settings(&token, &args.region, args.auto_configure, settings).await?;

    if let Some(addr) = args.status_addr {
        status_server::spawn(addr, deployment.subscribe())
            .await
            .map_err(CliError::StatusServer)?;
    }

    let report = deployment.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn destroy(args: DestroyArgs) -> Result<(), CliError> {
    let provider = DigitalOceanProvider::new(require_token(args.token)?);
    let id = MachineId(args.machine_id);
    provider.destroy_machine(&id).await?;
    tracing::info!(machine_id = %id, "droplet destroyed");
    Ok(())
}
