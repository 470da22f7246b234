//! Key transfer strategies.
//!
//! Copying the public key to the remote `authorized_keys` follows the
//! Strategy pattern, one implementation per credential kind:
//!
//! - [`PasswordCopy`]: `sshpass` feeds the supplied password to `ssh-copy-id`
//! - [`PasswordlessCopy`]: `ssh-copy-id` attached to the terminal, relying on
//!   an existing key or an interactive prompt
//!
//! Both target the configured port and the fixed remote account. A failed
//! copy is fatal and never retried.

mod password;
mod passwordless;
mod traits;

use std::time::Duration;

pub use password::PasswordCopy;
pub use passwordless::PasswordlessCopy;
pub use traits::CopyStrategy;

use crate::provision::types::{KeyIdentity, Target, TransferCredential};

/// Everything a strategy needs to copy one key to one host.
#[derive(Debug, Clone, Copy)]
pub struct CopyRequest<'a> {
    pub identity: &'a KeyIdentity,
    pub target: &'a Target,
    pub user: &'a str,
    pub timeout: Option<Duration>,
}

impl CopyRequest<'_> {
    /// `user@host` with IPv6 literals bracketed.
    pub fn destination(&self) -> String {
        self.target.connection_string(self.user)
    }

    /// Arguments for `ssh-copy-id`.
    pub fn copy_id_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.identity.public_key.to_string_lossy().into_owned(),
            "-p".to_string(),
            self.target.port().to_string(),
            self.destination(),
        ]
    }
}

/// Pick the copy strategy for `credential`.
pub fn strategy_for(credential: &TransferCredential) -> Box<dyn CopyStrategy> {
    match credential {
        TransferCredential::Password(password) => Box::new(PasswordCopy::new(password.clone())),
        TransferCredential::None => Box::new(PasswordlessCopy),
    }
}
