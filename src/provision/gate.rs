//! Command availability gate.
//!
//! Before the pipeline touches a remote host, every external tool it needs
//! must be on `PATH`. Missing tools are installed through an [`Installer`]
//! and then looked up again; a tool that is still missing stops the run.

use std::env;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::provision::error::ProvisionError;
use crate::provision::installer::Installer;

/// Tools every run needs.
pub const REQUIRED_TOOLS: &[&str] = &["ssh", "ssh-keygen", "ssh-copy-id", "ssh-keyscan"];

/// Password-automation tool for password-mediated copy.
pub const PASSWORD_TOOL: &str = "sshpass";

/// Finds executables.
pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: &str) -> Option<PathBuf>;

    fn is_available(&self, tool: &str) -> bool {
        self.locate(tool).is_some()
    }
}

/// [`ToolLocator`] searching a `PATH`-style directory list.
///
/// The list is read when the locator is created; lookups hit the filesystem
/// every time so a freshly installed tool is found on the re-check.
#[derive(Debug, Clone)]
pub struct PathLocator {
    search_path: Option<OsString>,
}

impl PathLocator {
    pub fn from_env() -> Self {
        Self {
            search_path: env::var_os("PATH"),
        }
    }

    pub fn with_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        env::split_paths(search_path)
            .map(|dir| dir.join(tool))
            .find(|candidate| {
                candidate
                    .metadata()
                    .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
                    .unwrap_or(false)
            })
    }
}

/// Ensures external tools exist, installing them when allowed.
pub struct CommandGate<'a> {
    locator: &'a dyn ToolLocator,
    installer: &'a dyn Installer,
}

impl<'a> CommandGate<'a> {
    pub fn new(locator: &'a dyn ToolLocator, installer: &'a dyn Installer) -> Self {
        Self { locator, installer }
    }

    /// Make sure every tool in `tools` is available.
    ///
    /// Tools already present cost one lookup and nothing else, so repeated
    /// calls never reach the installer.
    pub async fn ensure(&self, tools: &[&str]) -> Result<(), ProvisionError> {
        for tool in tools {
            self.ensure_one(tool).await?;
        }
        Ok(())
    }

    /// Like [`ensure`](Self::ensure) for a single tool that may only be
    /// installed by a privileged process.
    pub async fn ensure_privileged(&self, tool: &str, elevated: bool) -> Result<(), ProvisionError> {
        if self.locator.is_available(tool) {
            debug!("{} found", tool);
            return Ok(());
        }

        if !elevated {
            warn!("{} is missing and this process is not running as root", tool);
            return Err(ProvisionError::InsufficientPrivilege {
                tool: tool.to_string(),
            });
        }

        self.ensure_one(tool).await
    }

    async fn ensure_one(&self, tool: &str) -> Result<(), ProvisionError> {
        if self.locator.is_available(tool) {
            debug!("{} found", tool);
            return Ok(());
        }

        info!("{} not found, attempting installation", tool);
        self.installer.install(tool).await?;

        if self.locator.is_available(tool) {
            info!("{} installed", tool);
            Ok(())
        } else {
            Err(ProvisionError::ToolUnavailable(tool.to_string()))
        }
    }
}
