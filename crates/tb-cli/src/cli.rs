use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Spin up a personal IKEv2 VPN on a fresh DigitalOcean droplet.
#[derive(Parser)]
#[command(name = "tunnelbox", version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(flatten)]
    pub deploy: DeployArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision a droplet and install the VPN (the default)
    Deploy(DeployArgs),

    /// Delete a droplet left behind by an aborted deployment
    Destroy(DestroyArgs),
}

#[derive(Args, Clone, Debug)]
pub struct DeployArgs {
    /// DigitalOcean API token
    #[arg(long, env = "DIGITALOCEAN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Droplet region slug
    #[arg(long, env = "TUNNELBOX_REGION", default_value = "nyc3")]
    pub region: String,

    /// Install the profile locally and wait for the public IP to change
    #[arg(long, env = "TUNNELBOX_AUTO_CONFIGURE")]
    pub auto_configure: bool,

    /// Where artifacts and profiles are written (default ~/.tunnelbox)
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Serve deployment progress over HTTP on this address
    #[arg(long, env = "TUNNELBOX_STATUS_ADDR")]
    pub status_addr: Option<SocketAddr>,
}

#[derive(Args, Clone, Debug)]
pub struct DestroyArgs {
    /// DigitalOcean API token
    #[arg(long, env = "DIGITALOCEAN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Droplet id printed when the machine was created
    pub machine_id: String,
}
