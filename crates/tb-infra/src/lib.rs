pub mod digitalocean;
pub mod macos;
pub mod public_ip;
pub mod ssh;
pub mod tcp;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use types::{FirewallSpec, MachineId, MachineInfo, MachineSpec, RemoteTarget};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("digitalocean error: {0}")]
    DigitalOcean(#[from] do_api::Error),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("remote command `{command}` failed: {detail}")]
    RemoteExecution { command: String, detail: String },

    #[error("ssh identity error: {0}")]
    Identity(String),

    #[error("public ip lookup failed: {0}")]
    PublicIp(String),

    #[error("could not apply vpn profile: {0}")]
    LocalApply(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Cloud backend that owns virtual machines and their firewalls.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// Ask the provider for a new machine. Returns once the provider has
    /// accepted the request and assigned an id; the address may still be
    /// missing.
    async fn create_machine(&self, spec: &MachineSpec) -> Result<MachineInfo>;

    /// Current state and address of a machine.
    async fn get_machine(&self, id: &MachineId) -> Result<MachineInfo>;

    /// Attach an inbound firewall to a single machine.
    async fn create_firewall(&self, spec: &FirewallSpec) -> Result<()>;

    /// Destroy a machine permanently.
    async fn destroy_machine(&self, id: &MachineId) -> Result<()>;
}

/// Authenticated remote shell to a provisioned machine.
#[async_trait]
pub trait RemoteExecutor: Send + Sync + 'static {
    /// Public half of the local identity, in `authorized_keys` format.
    fn authorized_key(&self) -> &str;

    /// Run a shell command to completion and return its stdout.
    async fn run(&self, target: &RemoteTarget, command: &str) -> Result<Vec<u8>>;

    /// Read a file from inside a running container on the target.
    async fn fetch_file_from_workload(
        &self,
        target: &RemoteTarget,
        workload: &str,
        path: &str,
    ) -> Result<Vec<u8>>;
}

/// Single TCP reachability check.
#[async_trait]
pub trait PortProber: Send + Sync + 'static {
    async fn probe(&self, host: &str, port: u16) -> bool;
}

/// Looks up the public address this machine egresses from.
#[async_trait]
pub trait PublicIpProbe: Send + Sync + 'static {
    async fn fetch_public_ip(&self) -> Result<String>;
}

/// Installs a rendered VPN profile into the local OS network settings.
#[async_trait]
pub trait ProfileInstaller: Send + Sync + 'static {
    async fn apply_profile(&self, path: &Path) -> Result<()>;
}
