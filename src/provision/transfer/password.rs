//! Password-mediated key copy.

use async_trait::async_trait;
use tracing::info;

use crate::provision::error::{ProvisionError, classify_transfer_failure};
use crate::provision::gate::PASSWORD_TOOL;
use crate::provision::runner::{CommandRunner, Invocation};

use super::CopyRequest;
use super::traits::CopyStrategy;

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV_VAR: &str = "SSHPASS";

/// Password copy strategy.
///
/// Runs `sshpass -e ssh-copy-id ...`. The password travels in the child's
/// environment, never on its command line.
pub struct PasswordCopy {
    password: String,
}

impl PasswordCopy {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn invocation(&self, request: &CopyRequest<'_>) -> Invocation {
        Invocation::new(PASSWORD_TOOL)
            .args(["-e", "ssh-copy-id"])
            .args(request.copy_id_args())
            .env(SSHPASS_ENV_VAR, self.password.as_str())
            .timeout(request.timeout)
    }
}

#[async_trait]
impl CopyStrategy for PasswordCopy {
    async fn copy(
        &self,
        runner: &dyn CommandRunner,
        request: &CopyRequest<'_>,
    ) -> Result<(), ProvisionError> {
        let destination = request.destination();
        info!("Copying public key to {} with password", destination);

        runner
            .run(&self.invocation(request))
            .await
            .map_err(|source| ProvisionError::Transfer {
                failure: classify_transfer_failure(source.stderr()),
                destination: destination.clone(),
                source,
            })?;

        info!("Public key installed on {}", destination);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "password"
    }

    fn required_tool(&self) -> Option<&'static str> {
        Some(PASSWORD_TOOL)
    }
}
