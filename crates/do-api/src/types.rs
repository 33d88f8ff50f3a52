use serde::{Deserialize, Serialize};

// ── Droplet types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
}

impl Droplet {
    /// First public IPv4 address, if the droplet has been assigned one yet.
    pub fn public_ipv4(&self) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DropletEnvelope {
    pub droplet: Droplet,
}

// ── Firewall types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateFirewallRequest {
    pub name: String,
    pub inbound_rules: Vec<InboundRule>,
    pub outbound_rules: Vec<OutboundRule>,
    pub droplet_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundRule {
    pub protocol: String,
    pub ports: String,
    pub sources: RuleTargets,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundRule {
    pub protocol: String,
    pub ports: String,
    pub destinations: RuleTargets,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleTargets {
    pub addresses: Vec<String>,
}

impl RuleTargets {
    /// Every IPv4 and IPv6 address.
    pub fn anywhere() -> Self {
        Self {
            addresses: vec!["0.0.0.0/0".into(), "::/0".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Firewall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FirewallEnvelope {
    pub firewall: Firewall,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn droplet_without_networks_has_no_address() {
        let droplet: Droplet =
            serde_json::from_str(r#"{"id": 7, "name": "vpn", "status": "new"}"#).unwrap();
        assert_eq!(droplet.public_ipv4(), None);
    }

    #[test]
    fn droplet_public_address_skips_private_networks() {
        let droplet: Droplet = serde_json::from_str(
            r#"{
                "id": 7,
                "name": "vpn",
                "status": "active",
                "networks": {"v4": [
                    {"ip_address": "10.10.0.5", "type": "private"},
                    {"ip_address": "203.0.113.9", "type": "public"}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(droplet.public_ipv4(), Some("203.0.113.9"));
    }

    #[test]
    fn create_request_omits_empty_optionals() {
        let req = CreateDropletRequest {
            name: "vpn".into(),
            region: "nyc3".into(),
            size: "s-1vcpu-1gb".into(),
            image: "coreos-stable".into(),
            user_data: None,
            tags: vec![],
            ipv6: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("user_data").is_none());
        assert!(json.get("tags").is_none());
        assert_eq!(json["region"], "nyc3");
    }
}
