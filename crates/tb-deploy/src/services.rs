//! Boot-time configuration for the droplet.
//!
//! Each [`ServiceDescriptor`] contributes a [`Fragment`]; the fragments are
//! merged into one Container Linux `#cloud-config` document.

use std::collections::HashSet;

/// Address of the docker bridge on the droplet; pi-hole answers DNS there.
pub const BRIDGE_DNS: &str = "172.17.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ServiceRenderError {
    #[error("authorized key is not a single printable line")]
    InvalidAuthorizedKey,

    #[error("service {service} declared an invalid unit name: {unit:?}")]
    InvalidUnitName { service: String, unit: String },

    #[error("unit {0} is declared by more than one service")]
    DuplicateUnit(String),
}

/// Material shared with every service when rendering.
#[derive(Debug, Clone, Copy)]
pub struct ServiceKeys<'a> {
    pub authorized_key: &'a str,
}

/// A systemd unit managed by cloud-init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub command: &'static str,
    pub content: Option<String>,
}

impl Unit {
    /// Start an existing unit.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: "start",
            content: None,
        }
    }

    /// Install `content` as a unit and start it.
    pub fn with_content(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: "start",
            content: Some(content.into()),
        }
    }
}

/// One service's share of the cloud-config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub ssh_authorized_keys: Vec<String>,
    pub reboot_strategy: Option<&'static str>,
    pub units: Vec<Unit>,
}

/// Something that must be running on the droplet.
pub trait ServiceDescriptor: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, keys: &ServiceKeys<'_>) -> Result<Fragment, ServiceRenderError>;
}

// ── Services ─────────────────────────────────────────────────────────

/// Base OS settings: login key, no automatic reboots, docker running.
pub struct CoreOs;

impl ServiceDescriptor for CoreOs {
    fn name(&self) -> &str {
        "coreos"
    }

    fn render(&self, keys: &ServiceKeys<'_>) -> Result<Fragment, ServiceRenderError> {
        let key = keys.authorized_key.trim();
        if key.is_empty() || key.contains(['\n', '\r', '"', '\\']) {
            return Err(ServiceRenderError::InvalidAuthorizedKey);
        }

        Ok(Fragment {
            ssh_authorized_keys: vec![key.to_string()],
            reboot_strategy: Some("off"),
            units: vec![Unit::start("docker.service")],
        })
    }
}

/// DNS sinkhole the VPN hands out to clients.
pub struct PiHole {
    pub image: String,
}

impl ServiceDescriptor for PiHole {
    fn name(&self) -> &str {
        "pihole"
    }

    fn render(&self, _keys: &ServiceKeys<'_>) -> Result<Fragment, ServiceRenderError> {
        let content = format!(
            r#"[Unit]
Description=pi-hole DNS sinkhole
After=docker.service
Requires=docker.service

[Service]
Restart=always
ExecStartPre=-/usr/bin/docker rm -f pihole
ExecStart=/usr/bin/docker run --name pihole -p {BRIDGE_DNS}:53:53/tcp -p {BRIDGE_DNS}:53:53/udp -e DNS1=1.1.1.1 -e DNS2=1.0.0.1 {image}
ExecStop=/usr/bin/docker stop pihole

[Install]
WantedBy=multi-user.target
"#,
            image = self.image,
        );

        Ok(Fragment {
            units: vec![Unit::with_content("pihole.service", content)],
            ..Fragment::default()
        })
    }
}

/// The IKEv2 server container. Its name is the workload the deployment
/// waits on and fetches artifacts from.
pub struct VpnServer {
    pub workload: String,
    pub image: String,
}

impl ServiceDescriptor for VpnServer {
    fn name(&self) -> &str {
        &self.workload
    }

    fn render(&self, _keys: &ServiceKeys<'_>) -> Result<Fragment, ServiceRenderError> {
        let content = format!(
            r#"[Unit]
Description=tunnelbox IKEv2 VPN server
After=docker.service pihole.service
Requires=docker.service

[Service]
Restart=always
ExecStartPre=-/usr/bin/docker rm -f {workload}
ExecStart=/usr/bin/docker run --name {workload} --privileged --net=host -v {workload}-ipsec:/etc/ipsec.d -e VPN_DNS={BRIDGE_DNS} {image}
ExecStop=/usr/bin/docker stop {workload}

[Install]
WantedBy=multi-user.target
"#,
            workload = self.workload,
            image = self.image,
        );

        Ok(Fragment {
            units: vec![Unit::with_content(format!("{}.service", self.workload), content)],
            ..Fragment::default()
        })
    }
}

// ── Rendering ────────────────────────────────────────────────────────

fn valid_unit_name(name: &str) -> bool {
    name.contains('.')
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
}

/// Ask every service for its fragment and merge them into a cloud-config.
pub fn render_user_data(
    keys: &ServiceKeys<'_>,
    services: &[Box<dyn ServiceDescriptor>],
) -> Result<String, ServiceRenderError> {
    let mut merged = Fragment::default();
    let mut seen = HashSet::new();

    for service in services {
        let fragment = service.render(keys)?;
        for unit in &fragment.units {
            if !valid_unit_name(&unit.name) {
                return Err(ServiceRenderError::InvalidUnitName {
                    service: service.name().to_string(),
                    unit: unit.name.clone(),
                });
            }
            if !seen.insert(unit.name.clone()) {
                return Err(ServiceRenderError::DuplicateUnit(unit.name.clone()));
            }
        }
        merged.ssh_authorized_keys.extend(fragment.ssh_authorized_keys);
        merged.reboot_strategy = fragment.reboot_strategy.or(merged.reboot_strategy);
        merged.units.extend(fragment.units);
    }

    let mut out = String::from("#cloud-config\n");

    if !merged.ssh_authorized_keys.is_empty() {
        out.push_str("\nssh_authorized_keys:\n");
        for key in &merged.ssh_authorized_keys {
            out.push_str(&format!("  - \"{key}\"\n"));
        }
    }

    out.push_str("\ncoreos:\n");
    if let Some(strategy) = merged.reboot_strategy {
        out.push_str(&format!("  update:\n    reboot-strategy: \"{strategy}\"\n"));
    }
    out.push_str("  units:\n");
    for unit in &merged.units {
        out.push_str(&format!("    - name: \"{}\"\n", unit.name));
        out.push_str(&format!("      command: \"{}\"\n", unit.command));
        if let Some(content) = &unit.content {
            out.push_str("      content: |\n");
            for line in content.lines() {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("        {line}\n"));
                }
            }
        }
    }

    Ok(out)
}

/// The services every deployment runs.
pub fn default_services(
    workload: &str,
    vpn_image: &str,
    pihole_image: &str,
) -> Vec<Box<dyn ServiceDescriptor>> {
    vec![
        Box::new(CoreOs),
        Box::new(PiHole {
            image: pihole_image.to_string(),
        }),
        Box::new(VpnServer {
            workload: workload.to_string(),
            image: vpn_image.to_string(),
        }),
    ]
}
