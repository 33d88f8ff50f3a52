//! Retrieval of generated credentials from the VPN workload.

use std::io::Write;
use std::path::{Path, PathBuf};

use tb_infra::RemoteExecutor;
use tb_infra::types::RemoteTarget;

use crate::error::{DeployError, Result};
use crate::name::DeploymentName;

/// What a fetched file is used for when rendering profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ClientKey,
    CaCert,
    ServerCert,
}

/// A file generated inside the workload and copied to the config directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub label: &'static str,
    pub remote_path: &'static str,
    /// Local filename; `{name}` is replaced by the deployment name.
    pub local_template: &'static str,
}

/// Fetched in this order.
pub const VPN_ARTIFACTS: [Artifact; 3] = [
    Artifact {
        kind: ArtifactKind::ClientKey,
        label: "client private key",
        remote_path: "/etc/ipsec.d/client.cert.p12",
        local_template: "{name}.client.cert.p12",
    },
    Artifact {
        kind: ArtifactKind::CaCert,
        label: "CA certificate",
        remote_path: "/etc/ipsec.d/cacerts/ca.cert.pem",
        local_template: "{name}.ca.cert.pem",
    },
    Artifact {
        kind: ArtifactKind::ServerCert,
        label: "server certificate",
        remote_path: "/etc/ipsec.d/certs/server.cert.pem",
        local_template: "{name}.server.cert.pem",
    },
];

/// Passphrase protecting the client key container. Never written locally.
pub const PASSPHRASE_PATH: &str = "/etc/ipsec.d/client.cert.p12.password";

pub const APPLE_PROFILE_TEMPLATE: &str = "{name}.apple.mobileconfig";
pub const ANDROID_PROFILE_TEMPLATE: &str = "{name}.android.sswan";

#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// Find the contents of a fetched artifact, or an empty slice.
pub fn contents_of(fetched: &[FetchedArtifact], kind: ArtifactKind) -> &[u8] {
    fetched
        .iter()
        .find(|a| a.kind == kind)
        .map(|a| a.contents.as_slice())
        .unwrap_or_default()
}

/// Flat local directory holding every deployment's files.
#[derive(Debug, Clone)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, template: &str, name: &DeploymentName) -> PathBuf {
        self.root.join(template.replace("{name}", name.as_str()))
    }

    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| DeployError::ArtifactWrite {
                path: self.root.clone(),
                source,
            })
    }

    /// Write `contents` to `path` in full or not at all.
    ///
    /// Goes through a temp file in the same directory followed by a rename,
    /// so the file mode is the temp file's (owner read/write only).
    pub async fn write_atomic(&self, path: &Path, contents: Vec<u8>) -> Result<()> {
        let dir = self.root.clone();
        let dest = path.to_path_buf();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|res| res)
        .map_err(|source| DeployError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Read the client key passphrase from the workload, trimmed.
pub async fn fetch_passphrase(
    executor: &dyn RemoteExecutor,
    target: &RemoteTarget,
    workload: &str,
) -> Result<String> {
    let raw = executor
        .fetch_file_from_workload(target, workload, PASSPHRASE_PATH)
        .await
        .map_err(|source| DeployError::ArtifactFetch {
            label: "client key passphrase",
            remote_path: PASSPHRASE_PATH.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

/// Fetch each artifact in order and persist it under `dir`.
///
/// Stops at the first failure; files written before it stay on disk.
pub async fn fetch_artifacts(
    executor: &dyn RemoteExecutor,
    target: &RemoteTarget,
    workload: &str,
    dir: &ConfigDir,
    name: &DeploymentName,
    artifacts: &[Artifact],
) -> Result<Vec<FetchedArtifact>> {
    dir.ensure().await?;

    let mut fetched = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let contents = executor
            .fetch_file_from_workload(target, workload, artifact.remote_path)
            .await
            .map_err(|source| DeployError::ArtifactFetch {
                label: artifact.label,
                remote_path: artifact.remote_path.to_string(),
                source,
            })?;

        let path = dir.path_for(artifact.local_template, name);
        dir.write_atomic(&path, contents.clone()).await?;
        tracing::info!(
            deployment = %name,
            artifact = artifact.label,
            path = %path.display(),
            bytes = contents.len(),
            "artifact saved"
        );

        fetched.push(FetchedArtifact {
            kind: artifact.kind,
            path,
            contents,
        });
    }

    Ok(fetched)
}
