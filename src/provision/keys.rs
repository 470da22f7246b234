//! Key provisioning decision and key pair generation.
//!
//! [`decide`] is the heart of the tool: a pure function from key presence and
//! the two caller flags to a [`ProvisioningPlan`]. Rules, first match wins:
//!
//! | Key pair on disk | `update` | `force_copy` | Plan |
//! |------------------|----------|--------------|------|
//! | incomplete | any | any | generate + copy |
//! | complete | yes | any | generate + copy |
//! | complete | no | yes | copy |
//! | complete | no | no | nothing |
//!
//! A freshly generated key has never been distributed anywhere, so
//! generation always implies a copy.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::provision::config::KEY_COMMENT_USER;
use crate::provision::error::ProvisionError;
use crate::provision::runner::{CommandRunner, Invocation};
use crate::provision::types::{KeyIdentity, KeyPresence, ProvisioningPlan};

/// Key algorithm passed to `ssh-keygen -t`
pub const KEY_TYPE: &str = "rsa";

/// Key size passed to `ssh-keygen -b`
pub const KEY_BITS: u32 = 4096;

/// Decide whether to generate and/or copy the key.
pub fn decide(
    presence: KeyPresence,
    update_requested: bool,
    force_copy_requested: bool,
) -> ProvisioningPlan {
    if !presence.complete() || update_requested {
        ProvisioningPlan {
            must_generate: true,
            must_copy: true,
        }
    } else if force_copy_requested {
        ProvisioningPlan {
            must_generate: false,
            must_copy: true,
        }
    } else {
        ProvisioningPlan {
            must_generate: false,
            must_copy: false,
        }
    }
}

/// Comment embedded in generated public keys.
pub fn key_comment(local_hostname: &str) -> String {
    format!("{}@{}", KEY_COMMENT_USER, local_hostname)
}

/// Generates key pairs with `ssh-keygen`.
pub struct KeyGenerator {
    runner: Arc<dyn CommandRunner>,
    timeout: Option<Duration>,
}

impl KeyGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// `ssh-keygen` invocation for `identity`.
    ///
    /// The passphrase is empty so the key can be used unattended, and the
    /// overwrite prompt for an existing key is answered `y` on stdin.
    pub fn invocation(&self, identity: &KeyIdentity, comment: &str) -> Invocation {
        Invocation::new("ssh-keygen")
            .args(["-t", KEY_TYPE])
            .args(["-b".to_string(), KEY_BITS.to_string()])
            .args(["-N", ""])
            .args(["-C", comment])
            .arg("-f")
            .arg(identity.private_key.to_string_lossy())
            .stdin("y\n")
            .timeout(self.timeout)
    }

    /// Generate a new key pair for `identity`, overwriting any existing one.
    pub async fn generate(
        &self,
        identity: &KeyIdentity,
        comment: &str,
    ) -> Result<(), ProvisionError> {
        if let Some(dir) = identity.key_dir() {
            prepare_key_dir(dir).await?;
        }

        info!(
            "Generating {} key pair {}",
            KEY_TYPE,
            identity.private_key.display()
        );

        self.runner
            .run(&self.invocation(identity, comment))
            .await
            .map_err(|source| ProvisionError::KeyGeneration {
                path: identity.private_key.clone(),
                source,
            })?;

        Ok(())
    }
}

/// Create the key directory with mode 0700 if it does not exist yet.
async fn prepare_key_dir(dir: &std::path::Path) -> Result<(), ProvisionError> {
    if dir.as_os_str().is_empty() || tokio::fs::metadata(dir).await.is_ok() {
        return Ok(());
    }

    let to_error = |source| ProvisionError::KeyDirectory {
        path: dir.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(to_error)?;
    tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .await
        .map_err(to_error)?;

    Ok(())
}
