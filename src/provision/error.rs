//! Error taxonomy for the provisioning pipeline.
//!
//! Every failure is a [`ProvisionError`], and every variant belongs to one
//! [`ErrorKind`]. The kind decides the process exit status:
//!
//! | Kind | Exit | Examples |
//! |------|------|----------|
//! | Input | 2 | malformed target address, bad setting |
//! | Environment | 3 | unsupported platform, tool missing, no privilege |
//! | Provisioning | 4 | key directory or key generation failure |
//! | Transfer | 5 | host key fetch failure, key copy failure |
//! | Session | 6 | interactive session could not be started |
//!
//! None of these are retried.
//!
//! # Copy failure classification
//!
//! When the key copy fails, the tool's stderr is matched against known
//! patterns to tell rejected credentials apart from an unreachable host.
//! Authentication patterns are checked first: a message mentioning both a
//! timeout and a denied password is reported as an authentication failure.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::provision::runner::CommandError;

/// Broad category of a provisioning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Environment,
    Provisioning,
    Transfer,
    Session,
}

impl ErrorKind {
    /// Process exit status for this kind of failure.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Input => 2,
            ErrorKind::Environment => 3,
            ErrorKind::Provisioning => 4,
            ErrorKind::Transfer => 5,
            ErrorKind::Session => 6,
        }
    }
}

/// Why a key copy was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFailure {
    /// Remote host refused the supplied credentials.
    Authentication,
    /// Remote host could not be reached on the configured port.
    Unreachable,
    Other,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferFailure::Authentication => write!(f, "authentication rejected"),
            TransferFailure::Unreachable => write!(f, "host unreachable"),
            TransferFailure::Other => write!(f, "copy failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid target address '{0}': expected an IPv4 or IPv6 address")]
    InvalidAddress(String),

    #[error("Invalid value '{value}' for {setting}")]
    InvalidSetting { setting: &'static str, value: String },

    #[error("Cannot determine the home directory holding the SSH key store")]
    NoHomeDirectory,

    #[error("Unsupported platform: cannot install {tool} without a Debian or RedHat package manager")]
    UnsupportedPlatform { tool: String },

    #[error("Failed to install {package} (needed for {tool}): {source}")]
    InstallFailed {
        tool: String,
        package: String,
        #[source]
        source: CommandError,
    },

    #[error("Required command {0} is still unavailable after installation")]
    ToolUnavailable(String),

    #[error("{tool} is not installed and installing it requires root privileges")]
    InsufficientPrivilege { tool: String },

    #[error("Failed to prepare key directory {}: {source}", .path.display())]
    KeyDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key generation failed for {}: {source}", .path.display())]
    KeyGeneration {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    #[error("Failed to access trust store {}: {source}", .path.display())]
    TrustStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch host keys for {host}: {reason}")]
    HostKeyFetch { host: String, reason: String },

    #[error("Key transfer to {destination} failed ({failure}): {source}")]
    Transfer {
        destination: String,
        failure: TransferFailure,
        #[source]
        source: CommandError,
    },

    #[error("Failed to launch interactive session to {destination}: {source}")]
    Session {
        destination: String,
        #[source]
        source: CommandError,
    },
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::InvalidAddress(_) | ProvisionError::InvalidSetting { .. } => {
                ErrorKind::Input
            }
            ProvisionError::NoHomeDirectory
            | ProvisionError::UnsupportedPlatform { .. }
            | ProvisionError::InstallFailed { .. }
            | ProvisionError::ToolUnavailable(_)
            | ProvisionError::InsufficientPrivilege { .. }
            | ProvisionError::TrustStore { .. } => ErrorKind::Environment,
            ProvisionError::KeyDirectory { .. } | ProvisionError::KeyGeneration { .. } => {
                ErrorKind::Provisioning
            }
            ProvisionError::HostKeyFetch { .. } | ProvisionError::Transfer { .. } => {
                ErrorKind::Transfer
            }
            ProvisionError::Session { .. } => ErrorKind::Session,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

/// Patterns meaning the remote host rejected the credentials.
const AUTH_ERRORS: &[&str] = &[
    "permission denied",
    "authentication failed",
    "incorrect password",
    "wrong password",
    "too many authentication failures",
    "no supported authentication methods",
];

/// Patterns meaning the remote host could not be reached.
const UNREACHABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection timed out",
    "connection reset",
    "no route to host",
    "network is unreachable",
    "host is down",
    "could not resolve hostname",
    "name or service not known",
    "operation timed out",
];

/// Classify a failed key copy from the copy tool's stderr.
///
/// Authentication patterns take precedence over connection patterns.
pub fn classify_transfer_failure(stderr: &str) -> TransferFailure {
    let stderr_lower = stderr.to_lowercase();

    if AUTH_ERRORS.iter().any(|p| stderr_lower.contains(p)) {
        return TransferFailure::Authentication;
    }

    if UNREACHABLE_ERRORS.iter().any(|p| stderr_lower.contains(p)) {
        return TransferFailure::Unreachable;
    }

    TransferFailure::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    mod error_kinds {
        use super::*;

        #[test]
        fn test_invalid_address_is_input() {
            let err = ProvisionError::InvalidAddress("not-an-ip".to_string());
            assert_eq!(err.kind(), ErrorKind::Input);
            assert_eq!(err.exit_code(), 2);
            assert!(err.to_string().contains("not-an-ip"));
        }

        #[test]
        fn test_insufficient_privilege_is_environment() {
            let err = ProvisionError::InsufficientPrivilege {
                tool: "sshpass".to_string(),
            };
            assert_eq!(err.kind(), ErrorKind::Environment);
            assert_eq!(err.exit_code(), 3);
            assert!(err.to_string().contains("root privileges"));
        }

        #[test]
        fn test_unsupported_platform_is_environment() {
            let err = ProvisionError::UnsupportedPlatform {
                tool: "ssh-copy-id".to_string(),
            };
            assert_eq!(err.kind(), ErrorKind::Environment);
        }

        #[test]
        fn test_key_generation_is_provisioning() {
            let err = ProvisionError::KeyGeneration {
                path: PathBuf::from("/root/.ssh/id_rsa"),
                source: CommandError::NotFound {
                    program: "ssh-keygen".to_string(),
                },
            };
            assert_eq!(err.kind(), ErrorKind::Provisioning);
            assert_eq!(err.exit_code(), 4);
            assert!(err.to_string().contains("/root/.ssh/id_rsa"));
        }

        #[test]
        fn test_transfer_is_transfer() {
            let err = ProvisionError::Transfer {
                destination: "root@10.0.0.1".to_string(),
                failure: TransferFailure::Authentication,
                source: CommandError::Failed {
                    program: "sshpass".to_string(),
                    code: Some(5),
                    stderr: String::new(),
                },
            };
            assert_eq!(err.kind(), ErrorKind::Transfer);
            assert_eq!(err.exit_code(), 5);
            assert!(err.to_string().contains("authentication rejected"));
        }

        #[test]
        fn test_host_key_fetch_is_transfer() {
            let err = ProvisionError::HostKeyFetch {
                host: "10.0.0.1".to_string(),
                reason: "no keys returned".to_string(),
            };
            assert_eq!(err.kind(), ErrorKind::Transfer);
        }

        #[test]
        fn test_session_exit_code() {
            assert_eq!(ErrorKind::Session.exit_code(), 6);
        }

        #[test]
        fn test_exit_codes_are_distinct_and_non_zero() {
            let codes = [
                ErrorKind::Input,
                ErrorKind::Environment,
                ErrorKind::Provisioning,
                ErrorKind::Transfer,
                ErrorKind::Session,
            ]
            .map(ErrorKind::exit_code);
            for (i, code) in codes.iter().enumerate() {
                assert_ne!(*code, 0);
                assert!(!codes[i + 1..].contains(code));
            }
        }
    }

    mod transfer_classification {
        use super::*;

        #[test]
        fn test_permission_denied() {
            assert_eq!(
                classify_transfer_failure("root@10.0.0.1: Permission denied (publickey,password)."),
                TransferFailure::Authentication
            );
        }

        #[test]
        fn test_too_many_failures() {
            assert_eq!(
                classify_transfer_failure("Received disconnect: Too many authentication failures"),
                TransferFailure::Authentication
            );
        }

        #[test]
        fn test_connection_refused() {
            assert_eq!(
                classify_transfer_failure("ssh: connect to host 10.0.0.1 port 2222: Connection refused"),
                TransferFailure::Unreachable
            );
        }

        #[test]
        fn test_no_route() {
            assert_eq!(
                classify_transfer_failure("connect to host 10.0.0.9 port 22: No route to host"),
                TransferFailure::Unreachable
            );
        }

        #[test]
        fn test_timed_out() {
            assert_eq!(
                classify_transfer_failure("ssh: connect to host 10.0.0.1 port 22: Connection timed out"),
                TransferFailure::Unreachable
            );
        }

        #[test]
        fn test_case_insensitive() {
            assert_eq!(
                classify_transfer_failure("PERMISSION DENIED"),
                TransferFailure::Authentication
            );
        }

        #[test]
        fn test_auth_takes_precedence() {
            assert_eq!(
                classify_transfer_failure("connection timed out, then permission denied"),
                TransferFailure::Authentication
            );
        }

        #[test]
        fn test_unknown_is_other() {
            assert_eq!(
                classify_transfer_failure("ERROR: No identities found"),
                TransferFailure::Other
            );
            assert_eq!(classify_transfer_failure(""), TransferFailure::Other);
        }

        #[test]
        fn test_display() {
            assert_eq!(TransferFailure::Unreachable.to_string(), "host unreachable");
            assert_eq!(TransferFailure::Other.to_string(), "copy failed");
        }
    }
}
