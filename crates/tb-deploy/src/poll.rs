//! Bounded polling and the readiness waits built on it.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tb_infra::types::{MachineId, RemoteTarget};
use tb_infra::{PortProber, Provisioner, PublicIpProbe, RemoteExecutor};

use crate::error::{DeployError, Result};

/// How many times to try and how long to sleep between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// No sleeping between attempts.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

/// Call `attempt` until it yields `Some`, at most `policy.max_attempts` times.
///
/// The attempt number (1-based) is passed in. Sleeps only between attempts.
pub async fn poll<T, F, Fut>(policy: PollPolicy, what: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for n in 1..=policy.max_attempts {
        if let Some(value) = attempt(n).await {
            return Ok(value);
        }
        if n < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(DeployError::NetworkTimeout {
        what: what.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Wait until `host:port` accepts a TCP connection.
pub async fn wait_for_port(
    prober: &dyn PortProber,
    host: &str,
    port: u16,
    what: &str,
    policy: PollPolicy,
) -> Result<()> {
    poll(policy, what, move |n| async move {
        if prober.probe(host, port).await {
            return Some(());
        }
        tracing::debug!(host, port, attempt = n, "port not reachable yet");
        None
    })
    .await
}

/// Wait until the provider reports an address for `id`.
///
/// Any reported address is accepted whatever the machine state; the state
/// is only logged. SSH readiness is checked separately.
pub async fn wait_for_address(
    provisioner: &dyn Provisioner,
    id: &MachineId,
    policy: PollPolicy,
) -> Result<String> {
    poll(policy, "machine address", move |n| async move {
        match provisioner.get_machine(id).await {
            Ok(info) => {
                if info.address.is_none() {
                    tracing::debug!(machine_id = %id, state = ?info.state, attempt = n, "no address yet");
                }
                info.address
            }
            Err(e) => {
                tracing::warn!(machine_id = %id, attempt = n, error = %e, "machine lookup failed");
                None
            }
        }
    })
    .await
}

/// Remote check that prints at most one byte of the workload's log.
///
/// Prints nothing (and exits 0) while the container does not exist yet.
pub fn workload_log_probe(workload: &str) -> String {
    format!(
        "docker logs {} 2>/dev/null | head -c 1",
        tb_infra::ssh::shell_quote(workload)
    )
}

/// Wait until the workload container has written any log output.
///
/// If the last attempt failed to run the remote check at all, the remote
/// error is returned instead of a plain timeout.
pub async fn wait_for_workload_output(
    executor: &dyn RemoteExecutor,
    target: &RemoteTarget,
    workload: &str,
    policy: PollPolicy,
) -> Result<()> {
    let command = workload_log_probe(workload);
    let command = command.as_str();
    let last_error = Mutex::new(None::<tb_infra::Error>);
    let last_error_ref = &last_error;

    let res = poll(policy, "vpn service", move |n| async move {
        let outcome = executor.run(target, command).await;
        let mut last = last_error_ref.lock().unwrap_or_else(|p| p.into_inner());
        match outcome {
            Ok(out) if !out.is_empty() => Some(()),
            Ok(_) => {
                *last = None;
                tracing::debug!(%target, workload, attempt = n, "workload has no output yet");
                None
            }
            Err(e) => {
                tracing::warn!(%target, workload, attempt = n, error = %e, "workload check failed");
                *last = Some(e);
                None
            }
        }
    })
    .await;

    if let Err(DeployError::NetworkTimeout { .. }) = &res {
        if let Some(source) = last_error.into_inner().unwrap_or_else(|p| p.into_inner()) {
            return Err(DeployError::RemoteExecution {
                step: "waiting for service",
                source,
            });
        }
    }
    res
}

/// Wait for the public IP to differ from `baseline`.
///
/// Returns the new address, or `None` if it never changed. Probe failures
/// and empty answers count as "unchanged".
pub async fn wait_for_ip_change(
    probe: &dyn PublicIpProbe,
    baseline: Option<&str>,
    policy: PollPolicy,
) -> Option<String> {
    poll(policy, "public ip change", move |n| async move {
        match probe.fetch_public_ip().await {
            Ok(ip) if !ip.is_empty() && Some(ip.as_str()) != baseline => Some(ip),
            Ok(ip) => {
                tracing::debug!(ip = %ip, attempt = n, "public ip unchanged");
                None
            }
            Err(e) => {
                tracing::debug!(attempt = n, error = %e, "public ip lookup failed");
                None
            }
        }
    })
    .await
    .ok()
}
