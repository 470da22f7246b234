//! Domain types for one provisioning run.
//!
//! All of these are process-scoped values; nothing here persists beyond the
//! key files and trust store the external tools write.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::provision::address::{AddressFamily, classify};
use crate::provision::error::ProvisionError;

/// Remote host this invocation provisions and connects to.
///
/// A `Target` can only be built from an address that classifies as IPv4 or
/// IPv6, so the family is always known before a connection string is formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    address: String,
    family: AddressFamily,
    port: u16,
}

impl Target {
    pub fn parse(address: &str, port: u16) -> Result<Self, ProvisionError> {
        match classify(address) {
            AddressFamily::Invalid => Err(ProvisionError::InvalidAddress(address.to_string())),
            family => Ok(Self {
                address: address.to_string(),
                family,
                port,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as written after `user@`: IPv6 literals are bracketed.
    pub fn host_literal(&self) -> String {
        match self.family {
            AddressFamily::IPv6 => format!("[{}]", self.address),
            _ => self.address.clone(),
        }
    }

    /// `user@host` string for `ssh` and `ssh-copy-id`.
    pub fn connection_string(&self, user: &str) -> String {
        format!("{}@{}", user, self.host_literal())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} port {}", self.host_literal(), self.port)
    }
}

/// Which halves of a key pair are on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyPresence {
    pub private_key: bool,
    pub public_key: bool,
}

impl KeyPresence {
    pub fn complete(self) -> bool {
        self.private_key && self.public_key
    }
}

/// A named local key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyIdentity {
    pub name: String,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl KeyIdentity {
    /// Identity `name` stored in `ssh_dir` as `<name>` and `<name>.pub`.
    pub fn new(ssh_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            private_key: ssh_dir.join(name),
            public_key: ssh_dir.join(format!("{}.pub", name)),
        }
    }

    /// Checks the filesystem for both key files.
    pub fn presence(&self) -> KeyPresence {
        KeyPresence {
            private_key: self.private_key.is_file(),
            public_key: self.public_key.is_file(),
        }
    }

    pub fn key_dir(&self) -> Option<&Path> {
        self.private_key.parent()
    }
}

/// Generate/copy decision for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisioningPlan {
    pub must_generate: bool,
    pub must_copy: bool,
}

/// Known-hosts state of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrustRecord {
    /// Host was already in the trust store before this call.
    pub present: bool,
    /// Host keys were appended to the trust store by this call.
    pub recorded: bool,
}

/// Optional secret used for password-mediated key copy.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum TransferCredential {
    #[default]
    None,
    Password(String),
}

impl TransferCredential {
    pub fn from_password(password: Option<String>) -> Self {
        match password {
            Some(password) => TransferCredential::Password(password),
            None => TransferCredential::None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, TransferCredential::Password(_))
    }
}

impl fmt::Debug for TransferCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferCredential::None => write!(f, "None"),
            TransferCredential::Password(_) => write!(f, "Password(<redacted>)"),
        }
    }
}

/// Summary printed by `--dry-run`.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    /// RFC3339 time the report was produced
    pub generated_at: String,
    pub target: Target,
    pub connection: String,
    pub identity: KeyIdentity,
    pub key_presence: KeyPresence,
    pub plan: ProvisioningPlan,
    pub trusted: bool,
    pub transfer_required: bool,
    /// Copy strategy that would be used, if a transfer is required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_strategy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod target {
        use super::*;

        #[test]
        fn test_ipv4_connection_string_is_not_bracketed() {
            let target = Target::parse("192.168.1.100", 22).unwrap();
            assert_eq!(target.family(), AddressFamily::IPv4);
            assert_eq!(target.connection_string("root"), "root@192.168.1.100");
        }

        #[test]
        fn test_ipv6_connection_string_is_bracketed() {
            let target = Target::parse("2001:db8::1", 2222).unwrap();
            assert_eq!(target.family(), AddressFamily::IPv6);
            assert_eq!(target.port(), 2222);
            assert_eq!(target.connection_string("root"), "root@[2001:db8::1]");
        }

        #[test]
        fn test_invalid_address_rejected() {
            let err = Target::parse("not-an-ip", 22).unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidAddress(ref a) if a == "not-an-ip"));
        }

        #[test]
        fn test_display() {
            let target = Target::parse("::1", 22).unwrap();
            assert_eq!(target.to_string(), "[::1] port 22");
        }
    }

    mod key_identity {
        use super::*;

        #[test]
        fn test_paths() {
            let identity = KeyIdentity::new(Path::new("/home/op/.ssh"), "id_rsa");
            assert_eq!(identity.private_key, PathBuf::from("/home/op/.ssh/id_rsa"));
            assert_eq!(identity.public_key, PathBuf::from("/home/op/.ssh/id_rsa.pub"));
            assert_eq!(identity.key_dir(), Some(Path::new("/home/op/.ssh")));
        }

        #[test]
        fn test_presence_reads_filesystem() {
            let dir = tempfile::tempdir().unwrap();
            let identity = KeyIdentity::new(dir.path(), "deploy");
            assert!(!identity.presence().complete());

            std::fs::write(&identity.private_key, "private").unwrap();
            let presence = identity.presence();
            assert!(presence.private_key);
            assert!(!presence.public_key);
            assert!(!presence.complete());

            std::fs::write(&identity.public_key, "public").unwrap();
            assert!(identity.presence().complete());
        }
    }

    mod credential {
        use super::*;

        #[test]
        fn test_from_password() {
            assert!(!TransferCredential::from_password(None).is_present());
            assert!(TransferCredential::from_password(Some("secret123".to_string())).is_present());
        }

        #[test]
        fn test_debug_redacts_password() {
            let credential = TransferCredential::Password("secret123".to_string());
            let rendered = format!("{:?}", credential);
            assert!(!rendered.contains("secret123"));
            assert_eq!(rendered, "Password(<redacted>)");
        }
    }
}
