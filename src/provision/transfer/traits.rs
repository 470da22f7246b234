//! Copy strategy trait definition.

use async_trait::async_trait;

use crate::provision::error::ProvisionError;
use crate::provision::runner::CommandRunner;

use super::CopyRequest;

/// Trait for public key copy strategies.
///
/// Implementations must be thread-safe (`Send + Sync`). Each strategy is one
/// way of authenticating the `ssh-copy-id` run.
#[async_trait]
pub trait CopyStrategy: Send + Sync {
    /// Copy the request's public key to the remote host.
    ///
    /// Any failure of the underlying tool is a [`ProvisionError::Transfer`].
    async fn copy(
        &self,
        runner: &dyn CommandRunner,
        request: &CopyRequest<'_>,
    ) -> Result<(), ProvisionError>;

    /// Get the name of this copy strategy.
    ///
    /// Used for logging and the dry-run report.
    fn name(&self) -> &'static str;

    /// External tool this strategy needs beyond the always-required set.
    fn required_tool(&self) -> Option<&'static str>;
}
