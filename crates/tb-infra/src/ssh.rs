//! Remote execution over the system `ssh` client.
//!
//! A throwaway ed25519 key pair is generated with `ssh-keygen` into a
//! private temp directory that lives as long as the executor. The public
//! half is injected into the machine's user-data, so no password or agent
//! is ever involved.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::types::RemoteTarget;
use crate::{Error, RemoteExecutor, Result};

const KEY_FILE: &str = "id_ed25519";
const KEY_COMMENT: &str = "tunnelbox";

/// Default upper bound for a single remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs commands on a remote host with a per-executor identity.
pub struct SshExecutor {
    // Keeps the key directory alive; removed on drop.
    _key_dir: tempfile::TempDir,
    private_key: PathBuf,
    authorized_key: String,
    timeout: Duration,
}

impl SshExecutor {
    /// Generate a fresh identity and build an executor around it.
    pub async fn new() -> Result<Self> {
        let key_dir = tempfile::Builder::new()
            .prefix("tunnelbox-ssh-")
            .tempdir()
            .map_err(|e| Error::Identity(format!("creating key directory: {e}")))?;
        let private_key = key_dir.path().join(KEY_FILE);

        let output = Command::new("ssh-keygen")
            .args(["-q", "-t", "ed25519", "-N", "", "-C", KEY_COMMENT, "-f"])
            .arg(&private_key)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Identity(format!("running ssh-keygen: {e}")))?;

        if !output.status.success() {
            return Err(Error::Identity(format!(
                "ssh-keygen exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let public_key = tokio::fs::read_to_string(private_key.with_extension("pub"))
            .await
            .map_err(|e| Error::Identity(format!("reading public key: {e}")))?;

        tracing::debug!(key = %private_key.display(), "generated ssh identity");

        Ok(Self {
            _key_dir: key_dir,
            private_key,
            authorized_key: public_key.trim().to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    fn ssh_args(&self, target: &RemoteTarget, command: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "BatchMode=yes",
            "-o",
            "PasswordAuthentication=no",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "LogLevel=ERROR",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.push("-i".into());
        args.push(self.private_key.display().to_string());
        args.push(target.to_string());
        args.push(command.to_string());
        args
    }

    async fn exec(&self, target: &RemoteTarget, command: &str) -> Result<Vec<u8>> {
        let child = Command::new("ssh")
            .args(self.ssh_args(target, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::RemoteExecution {
                command: command.to_string(),
                detail: format!("timed out after {}s", self.timeout.as_secs()),
            })??;

        if !output.status.success() {
            return Err(Error::RemoteExecution {
                command: command.to_string(),
                detail: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(output.stdout)
    }
}

/// Quote a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn authorized_key(&self) -> &str {
        &self.authorized_key
    }

    async fn run(&self, target: &RemoteTarget, command: &str) -> Result<Vec<u8>> {
        tracing::debug!(%target, command, "ssh: running command");
        self.exec(target, command).await
    }

    async fn fetch_file_from_workload(
        &self,
        target: &RemoteTarget,
        workload: &str,
        path: &str,
    ) -> Result<Vec<u8>> {
        let command = format!(
            "docker exec {} cat {}",
            shell_quote(workload),
            shell_quote(path)
        );
        tracing::debug!(%target, workload, path, "ssh: fetching file from workload");
        self.exec(target, &command).await
    }
}
