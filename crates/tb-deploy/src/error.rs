use std::path::PathBuf;

use crate::profiles::ConfigRenderError;
use crate::services::ServiceRenderError;
use crate::status::Status;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("provisioning failed while {step}: {source}")]
    Provisioning {
        step: &'static str,
        #[source]
        source: tb_infra::Error,
    },

    #[error("timed out waiting for {what} after {attempts} attempts")]
    NetworkTimeout { what: String, attempts: u32 },

    #[error("remote execution failed while {step}: {source}")]
    RemoteExecution {
        step: &'static str,
        #[source]
        source: tb_infra::Error,
    },

    #[error("failed to fetch {label} from {remote_path}: {source}")]
    ArtifactFetch {
        label: &'static str,
        remote_path: String,
        #[source]
        source: tb_infra::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    ConfigRender(#[from] ConfigRenderError),

    #[error(transparent)]
    ServiceRender(#[from] ServiceRenderError),

    #[error("could not establish remote identity: {0}")]
    Identity(#[source] tb_infra::Error),

    #[error("local profile install failed: {0}")]
    LocalApply(#[source] tb_infra::Error),

    #[error("deployment already started (status: {0})")]
    AlreadyStarted(Status),
}

impl DeployError {
    /// Everything aborts the run except a failed local profile install.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::LocalApply(_))
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
