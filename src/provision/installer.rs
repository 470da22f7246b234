//! Platform package installation for missing tools.
//!
//! The platform is recognised from its release marker file:
//! `/etc/debian_version` selects `apt-get`, `/etc/redhat-release` selects
//! `yum`. Any other system is unsupported and installation fails outright.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::provision::error::ProvisionError;
use crate::provision::runner::{CommandRunner, Invocation};

/// Installs the package providing a command.
///
/// The pipeline depends on this trait only, so tests can substitute a no-op
/// or failing installer without touching a package manager.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, tool: &str) -> Result<(), ProvisionError>;
}

/// Supported package-manager families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Debian,
    RedHat,
}

impl Platform {
    /// Detect the running system's platform.
    pub fn detect() -> Option<Self> {
        Self::detect_in(Path::new("/"))
    }

    /// Detect the platform of the filesystem rooted at `root`.
    pub fn detect_in(root: &Path) -> Option<Self> {
        if root.join("etc/debian_version").exists() {
            Some(Platform::Debian)
        } else if root.join("etc/redhat-release").exists() {
            Some(Platform::RedHat)
        } else {
            None
        }
    }

    /// Package that provides `tool` on this platform.
    pub fn package_for(self, tool: &str) -> &'static str {
        match (self, tool) {
            (_, "sshpass") => "sshpass",
            (Platform::Debian, _) => "openssh-client",
            (Platform::RedHat, _) => "openssh-clients",
        }
    }

    /// Non-interactive install command for `package`.
    pub fn install_invocation(self, package: &str) -> Invocation {
        match self {
            Platform::Debian => Invocation::new("apt-get")
                .args(["install", "-y", package])
                .env("DEBIAN_FRONTEND", "noninteractive"),
            Platform::RedHat => Invocation::new("yum").args(["install", "-y", package]),
        }
    }
}

/// [`Installer`] backed by the platform package manager.
pub struct PackageManagerInstaller {
    runner: Arc<dyn CommandRunner>,
    platform: Option<Platform>,
    timeout: Option<Duration>,
}

impl PackageManagerInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        platform: Option<Platform>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            platform,
            timeout,
        }
    }

    /// Installer for the running system.
    pub fn detect(runner: Arc<dyn CommandRunner>, timeout: Option<Duration>) -> Self {
        Self::new(runner, Platform::detect(), timeout)
    }
}

#[async_trait]
impl Installer for PackageManagerInstaller {
    async fn install(&self, tool: &str) -> Result<(), ProvisionError> {
        let platform = self
            .platform
            .ok_or_else(|| ProvisionError::UnsupportedPlatform {
                tool: tool.to_string(),
            })?;

        let package = platform.package_for(tool);
        info!("Installing {} to provide {} ({:?})", package, tool, platform);

        let invocation = platform.install_invocation(package).timeout(self.timeout);
        self.runner
            .run(&invocation)
            .await
            .map_err(|source| ProvisionError::InstallFailed {
                tool: tool.to_string(),
                package: package.to_string(),
                source,
            })?;

        Ok(())
    }
}
