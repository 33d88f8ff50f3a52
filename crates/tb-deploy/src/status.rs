use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment.
///
/// Variants are declared in lifecycle order; `Ord` follows that order, so
/// a status may only move to a greater one. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "pending auth")]
    PendingAuth,
    #[serde(rename = "provisioning")]
    Provisioning,
    #[serde(rename = "waiting for ssh")]
    WaitingForSsh,
    #[serde(rename = "waiting for service")]
    WaitingForService,
    #[serde(rename = "retrieving artifacts")]
    RetrievingArtifacts,
    #[serde(rename = "rendering client configs")]
    RenderingClientConfigs,
    #[serde(rename = "adding vpn to osx")]
    AddingVpnToOsx,
    #[serde(rename = "waiting for ip address change")]
    WaitingForIpChange,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAuth => "pending auth",
            Self::Provisioning => "provisioning",
            Self::WaitingForSsh => "waiting for ssh",
            Self::WaitingForService => "waiting for service",
            Self::RetrievingArtifacts => "retrieving artifacts",
            Self::RenderingClientConfigs => "rendering client configs",
            Self::AddingVpnToOsx => "adding vpn to osx",
            Self::WaitingForIpChange => "waiting for ip address change",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(&self, next: Status) -> bool {
        !self.is_terminal() && next > *self
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status change, as seen by observers.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub status: Status,
    pub at: DateTime<Utc>,
}

/// Snapshot of a deployment's progress, published on every change.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub name: String,
    pub region: String,
    pub status: Status,
    #[serde(rename = "ip_address")]
    pub vpn_address: Option<String>,
    #[serde(rename = "initial_ip")]
    pub initial_public_ip: Option<String>,
    #[serde(rename = "final_ip")]
    pub final_public_ip: Option<String>,
    pub timeline: Vec<Transition>,
}

impl Progress {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            status: Status::PendingAuth,
            vpn_address: None,
            initial_public_ip: None,
            final_public_ip: None,
            timeline: vec![Transition {
                status: Status::PendingAuth,
                at: Utc::now(),
            }],
        }
    }

    /// Statuses in the order they were entered.
    pub fn statuses(&self) -> Vec<Status> {
        self.timeline.iter().map(|t| t.status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(Status::PendingAuth.to_string(), "pending auth");
        assert_eq!(Status::WaitingForSsh.to_string(), "waiting for ssh");
        assert_eq!(Status::AddingVpnToOsx.to_string(), "adding vpn to osx");
        assert_eq!(Status::WaitingForIpChange.to_string(), "waiting for ip address change");
        assert_eq!(Status::Done.to_string(), "done");
    }

    #[test]
    fn serde_uses_display_names() {
        let json = serde_json::to_string(&Status::WaitingForIpChange).unwrap();
        assert_eq!(json, "\"waiting for ip address change\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::WaitingForIpChange);
    }

    #[test]
    fn required_statuses_are_ordered() {
        let required = [
            Status::PendingAuth,
            Status::WaitingForSsh,
            Status::AddingVpnToOsx,
            Status::WaitingForIpChange,
            Status::Done,
        ];
        assert!(required.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn terminal_statuses_never_advance() {
        assert!(!Status::Done.can_advance_to(Status::Failed));
        assert!(!Status::Failed.can_advance_to(Status::Done));
        assert!(Status::Provisioning.can_advance_to(Status::Failed));
    }

    #[test]
    fn status_cannot_regress() {
        assert!(!Status::WaitingForSsh.can_advance_to(Status::Provisioning));
        assert!(!Status::WaitingForSsh.can_advance_to(Status::WaitingForSsh));
        assert!(Status::WaitingForSsh.can_advance_to(Status::WaitingForService));
    }

    #[test]
    fn progress_serializes_observer_field_names() {
        let mut progress = Progress::new("tunnelbox-abc123-nyc3", "nyc3");
        progress.vpn_address = Some("203.0.113.9".into());
        let json = serde_json::to_value(&progress).unwrap();

        assert_eq!(json["status"], "pending auth");
        assert_eq!(json["ip_address"], "203.0.113.9");
        assert!(json["initial_ip"].is_null());
        assert!(json["final_ip"].is_null());
        assert_eq!(json["timeline"].as_array().unwrap().len(), 1);
    }
}
