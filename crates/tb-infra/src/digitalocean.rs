use async_trait::async_trait;
use do_api::{CreateDropletRequest, CreateFirewallRequest, InboundRule, OutboundRule, RuleTargets};
use tracing::info;

use crate::types::{FirewallSpec, MachineId, MachineInfo, MachineSpec, MachineState};
use crate::{Error, Provisioner, Result};

const DROPLET_TAG: &str = "tunnelbox";

/// DigitalOcean provider.
///
/// Delegates to `do_api::DoClient` for all HTTP calls.
pub struct DigitalOceanProvider {
    client: do_api::DoClient,
}

impl DigitalOceanProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: do_api::DoClient::new(token),
        }
    }

    fn parse_state(status: &str) -> MachineState {
        match status {
            "active" => MachineState::Running,
            "new" => MachineState::Starting,
            "off" => MachineState::Stopped,
            "archive" => MachineState::Destroyed,
            _ => MachineState::Unknown,
        }
    }

    fn parse_id(raw: &str) -> Result<u64> {
        raw.parse::<u64>()
            .map_err(|_| Error::InvalidId(raw.to_string()))
    }

    fn info(droplet: &do_api::Droplet) -> MachineInfo {
        MachineInfo {
            id: MachineId(droplet.id.to_string()),
            state: Self::parse_state(&droplet.status),
            address: droplet.public_ipv4().map(str::to_string),
        }
    }

    fn firewall_request(spec: &FirewallSpec, droplet_id: u64) -> CreateFirewallRequest {
        let inbound_rules = spec
            .inbound
            .iter()
            .map(|rule| InboundRule {
                protocol: rule.protocol.as_str().into(),
                ports: rule.port.to_string(),
                sources: RuleTargets::anywhere(),
            })
            .collect();

        // Droplet firewalls deny all egress unless told otherwise.
        let outbound_rules = ["tcp", "udp"]
            .into_iter()
            .map(|protocol| OutboundRule {
                protocol: protocol.into(),
                ports: "all".into(),
                destinations: RuleTargets::anywhere(),
            })
            .chain(std::iter::once(OutboundRule {
                protocol: "icmp".into(),
                ports: "0".into(),
                destinations: RuleTargets::anywhere(),
            }))
            .collect();

        CreateFirewallRequest {
            name: spec.name.clone(),
            inbound_rules,
            outbound_rules,
            droplet_ids: vec![droplet_id],
        }
    }
}

#[async_trait]
impl Provisioner for DigitalOceanProvider {
    async fn create_machine(&self, spec: &MachineSpec) -> Result<MachineInfo> {
        let droplet = self
            .client
            .create_droplet(&CreateDropletRequest {
                name: spec.name.clone(),
                region: spec.region.clone(),
                size: spec.size.clone(),
                image: spec.image.clone(),
                user_data: Some(spec.user_data.clone()),
                tags: vec![DROPLET_TAG.into()],
                ipv6: None,
            })
            .await?;

        info!(droplet_id = droplet.id, status = %droplet.status, "digitalocean: droplet created");

        Ok(Self::info(&droplet))
    }

    async fn get_machine(&self, id: &MachineId) -> Result<MachineInfo> {
        let droplet = self.client.get_droplet(Self::parse_id(&id.0)?).await?;
        Ok(Self::info(&droplet))
    }

    async fn create_firewall(&self, spec: &FirewallSpec) -> Result<()> {
        let droplet_id = Self::parse_id(&spec.machine_id.0)?;
        let firewall = self
            .client
            .create_firewall(&Self::firewall_request(spec, droplet_id))
            .await?;

        info!(firewall_id = %firewall.id, droplet_id, "digitalocean: firewall created");
        Ok(())
    }

    async fn destroy_machine(&self, id: &MachineId) -> Result<()> {
        self.client.delete_droplet(Self::parse_id(&id.0)?).await?;
        info!(droplet_id = %id.0, "digitalocean: droplet destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortRule;

    #[test]
    fn droplet_status_maps_to_machine_state() {
        assert_eq!(DigitalOceanProvider::parse_state("new"), MachineState::Starting);
        assert_eq!(DigitalOceanProvider::parse_state("active"), MachineState::Running);
        assert_eq!(DigitalOceanProvider::parse_state("off"), MachineState::Stopped);
        assert_eq!(DigitalOceanProvider::parse_state("weird"), MachineState::Unknown);
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let err = DigitalOceanProvider::parse_id("abc").unwrap_err();
        assert!(matches!(err, Error::InvalidId(ref raw) if raw == "abc"));
    }

    #[test]
    fn firewall_request_targets_single_droplet() {
        let spec = FirewallSpec {
            name: "vpn-fw".into(),
            machine_id: MachineId("42".into()),
            inbound: vec![PortRule::tcp(22), PortRule::udp(500), PortRule::udp(4500)],
        };
        let req = DigitalOceanProvider::firewall_request(&spec, 42);

        assert_eq!(req.droplet_ids, vec![42]);
        let json = serde_json::to_value(&req).unwrap();
        let inbound = json["inbound_rules"].as_array().unwrap();
        assert_eq!(inbound.len(), 3);
        assert_eq!(inbound[1]["protocol"], "udp");
        assert_eq!(inbound[1]["ports"], "500");
        assert_eq!(json["outbound_rules"].as_array().unwrap().len(), 3);
    }
}
