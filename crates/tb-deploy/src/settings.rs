use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tb_infra::types::PortRule;

use crate::poll::PollPolicy;

pub const DEFAULT_WORKLOAD: &str = "tunnelbox-vpn";
pub const SSH_PORT: u16 = 22;

/// Everything a deployment needs besides its token, region and name.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub droplet_size: String,
    pub droplet_image: String,
    pub ssh_user: String,
    pub workload: String,
    pub vpn_image: String,
    pub pihole_image: String,
    /// Opened on the droplet's firewall: ssh plus IKE and NAT-T.
    pub inbound: Vec<PortRule>,
    pub ssh_wait: PollPolicy,
    pub address_wait: PollPolicy,
    pub workload_wait: PollPolicy,
    /// Pause after the workload first logs, while it writes its certificates.
    pub workload_settle: Duration,
    pub ip_change_wait: PollPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            droplet_size: "s-1vcpu-1gb".into(),
            droplet_image: "coreos-stable".into(),
            ssh_user: "core".into(),
            workload: DEFAULT_WORKLOAD.into(),
            vpn_image: "tunnelbox/strongswan:latest".into(),
            pihole_image: "pihole/pihole:latest".into(),
            inbound: vec![PortRule::tcp(SSH_PORT), PortRule::udp(500), PortRule::udp(4500)],
            ssh_wait: PollPolicy::new(15, Duration::from_secs(5)),
            address_wait: PollPolicy::new(60, Duration::from_secs(5)),
            workload_wait: PollPolicy::new(90, Duration::from_secs(2)),
            workload_settle: Duration::from_secs(5),
            ip_change_wait: PollPolicy::new(10, Duration::from_secs(5)),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key/value source, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };

        Self {
            config_dir: lookup("TUNNELBOX_CONFIG_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            droplet_size: var("TUNNELBOX_DROPLET_SIZE", defaults.droplet_size),
            droplet_image: var("TUNNELBOX_DROPLET_IMAGE", defaults.droplet_image),
            ssh_user: var("TUNNELBOX_SSH_USER", defaults.ssh_user),
            vpn_image: var("TUNNELBOX_VPN_IMAGE", defaults.vpn_image),
            pihole_image: var("TUNNELBOX_PIHOLE_IMAGE", defaults.pihole_image),
            ..defaults
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".tunnelbox"))
        .unwrap_or_else(|| PathBuf::from(".tunnelbox"))
}
