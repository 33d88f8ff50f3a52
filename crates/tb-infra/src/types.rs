use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque provider-side machine identifier (e.g. a DigitalOcean droplet id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(pub String);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Specification for creating a machine.
#[derive(Debug, Clone)]
pub struct MachineSpec {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub user_data: String,
}

/// Machine status and metadata returned from the provider.
#[derive(Debug, Clone)]
pub struct MachineInfo {
    pub id: MachineId,
    pub state: MachineState,
    pub address: Option<String>,
}

/// Provider-reported machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Starting,
    Running,
    Stopped,
    Destroyed,
    Unknown,
}

/// Inbound firewall scoped to one machine.
#[derive(Debug, Clone)]
pub struct FirewallSpec {
    pub name: String,
    pub machine_id: MachineId,
    pub inbound: Vec<PortRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRule {
    pub protocol: Protocol,
    pub port: u16,
}

impl PortRule {
    pub const fn tcp(port: u16) -> Self {
        Self { protocol: Protocol::Tcp, port }
    }

    pub const fn udp(port: u16) -> Self {
        Self { protocol: Protocol::Udp, port }
    }
}

/// Login user and host for remote commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
}

impl RemoteTarget {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}
