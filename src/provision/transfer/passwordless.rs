//! Key copy relying on existing trust or an interactive prompt.

use async_trait::async_trait;
use tracing::info;

use crate::provision::error::{ProvisionError, TransferFailure};
use crate::provision::runner::{CommandError, CommandRunner, Invocation};

use super::CopyRequest;
use super::traits::CopyStrategy;

/// Passwordless copy strategy.
///
/// Runs `ssh-copy-id` attached to the terminal, so an existing key, an agent
/// or the operator typing a password can satisfy the remote host. Because the
/// operator may be typing, the run has no timeout.
pub struct PasswordlessCopy;

impl PasswordlessCopy {
    pub fn invocation(&self, request: &CopyRequest<'_>) -> Invocation {
        Invocation::new("ssh-copy-id").args(request.copy_id_args())
    }
}

#[async_trait]
impl CopyStrategy for PasswordlessCopy {
    async fn copy(
        &self,
        runner: &dyn CommandRunner,
        request: &CopyRequest<'_>,
    ) -> Result<(), ProvisionError> {
        let destination = request.destination();
        info!("Copying public key to {}", destination);

        let invocation = self.invocation(request);
        let to_error = |source| ProvisionError::Transfer {
            destination: destination.clone(),
            failure: TransferFailure::Other,
            source,
        };

        let code = runner
            .run_interactive(&invocation)
            .await
            .map_err(to_error)?;

        if code != 0 {
            return Err(to_error(CommandError::Failed {
                program: invocation.program.clone(),
                code: Some(code),
                stderr: String::new(),
            }));
        }

        info!("Public key installed on {}", destination);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "passwordless"
    }

    fn required_tool(&self) -> Option<&'static str> {
        None
    }
}
