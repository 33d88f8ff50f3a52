use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{Error, ProfileInstaller, Result};

/// Hands a `.mobileconfig` to macOS for installation.
///
/// `open` routes the profile to System Settings, which registers the VPN
/// configuration. On other platforms the installer always fails.
#[derive(Debug, Default)]
pub struct MacOsProfileInstaller;

#[async_trait]
impl ProfileInstaller for MacOsProfileInstaller {
    async fn apply_profile(&self, path: &Path) -> Result<()> {
        if !cfg!(target_os = "macos") {
            return Err(Error::LocalApply(format!(
                "automatic profile install is only supported on macOS (running on {})",
                std::env::consts::OS
            )));
        }

        if !path.is_file() {
            return Err(Error::LocalApply(format!(
                "profile {} does not exist",
                path.display()
            )));
        }

        let output = Command::new("open").arg(path).output().await?;
        if !output.status.success() {
            return Err(Error::LocalApply(format!(
                "open {} failed: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::info!(profile = %path.display(), "vpn profile handed to system settings");
        Ok(())
    }
}
