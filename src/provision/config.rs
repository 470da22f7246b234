//! Configuration resolution for a provisioning run.
//!
//! Settings follow a three-tier priority system:
//!
//! 1. **Flag** - Explicitly provided command-line flag (highest priority)
//! 2. **Environment Variable** - Value from environment variable (`.env` is loaded first)
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_PROVISION_PORT` | 22 | SSH port of the target host |
//! | `SSH_PROVISION_KEY_NAME` | `id_rsa` | Key pair file name |
//! | `SSH_PROVISION_SSH_DIR` | `~/.ssh` | Directory holding keys and `known_hosts` |
//! | `SSH_PROVISION_COMMAND_TIMEOUT` | 300s | Timeout for non-interactive tools, `0` disables |
//!
//! Invalid environment values are ignored in favour of the default. The
//! resolved [`ProvisionConfig`] is built once and never mutated.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::provision::cli::Cli;
use crate::provision::error::ProvisionError;
use crate::provision::types::{Target, TransferCredential};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default key pair name
pub const DEFAULT_KEY_NAME: &str = "id_rsa";

/// Default timeout for non-interactive external commands in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Remote account the key is installed for and the session logs in as
pub const REMOTE_USER: &str = "root";

/// User label in the comment of generated keys (`<label>@<local host>`)
pub const KEY_COMMENT_USER: &str = "root";

/// Environment variable name for the SSH port
pub const PORT_ENV_VAR: &str = "SSH_PROVISION_PORT";

/// Environment variable name for the key pair name
pub const KEY_NAME_ENV_VAR: &str = "SSH_PROVISION_KEY_NAME";

/// Environment variable name for the SSH directory
pub const SSH_DIR_ENV_VAR: &str = "SSH_PROVISION_SSH_DIR";

/// Environment variable name for the external command timeout
pub const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_PROVISION_COMMAND_TIMEOUT";

/// Resolve the SSH port with priority: flag -> env var -> default
pub fn resolve_port(port_param: Option<u16>) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
        && port > 0
    {
        return port;
    }

    DEFAULT_SSH_PORT
}

/// Resolve the key name with priority: flag -> env var -> default
pub fn resolve_key_name(name_param: Option<&str>) -> String {
    if let Some(name) = name_param {
        return name.to_string();
    }

    if let Ok(env_name) = env::var(KEY_NAME_ENV_VAR)
        && !env_name.trim().is_empty()
    {
        return env_name.trim().to_string();
    }

    DEFAULT_KEY_NAME.to_string()
}

/// Resolve the SSH directory with priority: env var -> `<home>/.ssh`
pub fn resolve_ssh_dir() -> Result<PathBuf, ProvisionError> {
    if let Ok(env_dir) = env::var(SSH_DIR_ENV_VAR)
        && !env_dir.is_empty()
    {
        return Ok(PathBuf::from(env_dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .ok_or(ProvisionError::NoHomeDirectory)
}

/// Resolve the external command timeout: env var -> default; `0` disables it
pub fn resolve_command_timeout() -> Option<Duration> {
    let secs = env::var(COMMAND_TIMEOUT_ENV_VAR)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);

    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

/// Key names become file names inside the SSH directory.
fn validate_key_name(name: &str) -> Result<(), ProvisionError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(ProvisionError::InvalidSetting {
            setting: "key name",
            value: name.to_string(),
        });
    }
    Ok(())
}

/// Immutable settings for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub target: Target,
    pub key_name: String,
    pub ssh_dir: PathBuf,
    pub update: bool,
    pub force_copy: bool,
    pub credential: TransferCredential,
    pub dry_run: bool,
    pub command_timeout: Option<Duration>,
    /// Local host name used in generated key comments
    pub local_hostname: String,
    pub remote_user: String,
}

impl ProvisionConfig {
    /// Build the configuration from parsed flags and the environment.
    ///
    /// The target address is validated here, before anything else runs.
    pub fn from_cli(cli: &Cli, local_hostname: String) -> Result<Self, ProvisionError> {
        let port = resolve_port(cli.port);
        let target = Target::parse(&cli.target_address, port)?;

        let key_name = resolve_key_name(cli.key_name.as_deref());
        validate_key_name(&key_name)?;

        Ok(Self {
            target,
            key_name,
            ssh_dir: resolve_ssh_dir()?,
            update: cli.update,
            force_copy: cli.force_copy,
            credential: TransferCredential::from_password(cli.password.clone()),
            dry_run: cli.dry_run,
            command_timeout: resolve_command_timeout(),
            local_hostname,
            remote_user: REMOTE_USER.to_string(),
        })
    }

    pub fn known_hosts_path(&self) -> PathBuf {
        self.ssh_dir.join("known_hosts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::sync::Mutex as StdMutex;

    // Use a mutex to serialize env var tests to avoid race conditions
    static ENV_TEST_MUTEX: once_cell::sync::Lazy<StdMutex<()>> =
        once_cell::sync::Lazy::new(|| StdMutex::new(()));

    /// Helper to set an environment variable safely within tests.
    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::set_var(key, value) };
    }

    /// Helper to remove an environment variable safely within tests.
    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn remove_env(key: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::remove_var(key) };
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("ssh-provision").chain(args.iter().copied()))
    }

    mod port {
        use super::*;

        #[test]
        fn test_uses_param_when_provided() {
            assert_eq!(resolve_port(Some(2222)), 2222);
        }

        #[test]
        fn test_param_takes_priority_over_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PORT_ENV_VAR, "2200");
            }
            let result = resolve_port(Some(2222));
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PORT_ENV_VAR);
            }
            assert_eq!(result, 2222);
        }

        #[test]
        fn test_uses_env_var_when_no_param() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PORT_ENV_VAR, "2200");
            }
            let result = resolve_port(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PORT_ENV_VAR);
            }
            assert_eq!(result, 2200);
        }

        #[test]
        fn test_uses_default_when_no_param_or_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PORT_ENV_VAR);
            }
            assert_eq!(resolve_port(None), DEFAULT_SSH_PORT);
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PORT_ENV_VAR, "not-a-port");
            }
            let result = resolve_port(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PORT_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_SSH_PORT);
        }

        #[test]
        fn test_ignores_zero_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PORT_ENV_VAR, "0");
            }
            let result = resolve_port(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PORT_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_SSH_PORT);
        }
    }

    mod key_name {
        use super::*;

        #[test]
        fn test_uses_param_when_provided() {
            assert_eq!(resolve_key_name(Some("deploy")), "deploy");
        }

        #[test]
        fn test_uses_env_var_when_no_param() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(KEY_NAME_ENV_VAR, "id_ops");
            }
            let result = resolve_key_name(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(KEY_NAME_ENV_VAR);
            }
            assert_eq!(result, "id_ops");
        }

        #[test]
        fn test_ignores_blank_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(KEY_NAME_ENV_VAR, "   ");
            }
            let result = resolve_key_name(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(KEY_NAME_ENV_VAR);
            }
            assert_eq!(result, DEFAULT_KEY_NAME);
        }

        #[test]
        fn test_rejects_path_separators() {
            assert!(validate_key_name("../id_rsa").is_err());
            assert!(validate_key_name("keys/id_rsa").is_err());
            assert!(validate_key_name("..").is_err());
            assert!(validate_key_name("").is_err());
            assert!(validate_key_name("id_ed25519").is_ok());
        }
    }

    mod command_timeout {
        use super::*;

        #[test]
        fn test_default() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
            }
            assert_eq!(
                resolve_command_timeout(),
                Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
            );
        }

        #[test]
        fn test_env_override() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMMAND_TIMEOUT_ENV_VAR, "45");
            }
            let result = resolve_command_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, Some(Duration::from_secs(45)));
        }

        #[test]
        fn test_zero_disables() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMMAND_TIMEOUT_ENV_VAR, "0");
            }
            let result = resolve_command_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, None);
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMMAND_TIMEOUT_ENV_VAR, "soon");
            }
            let result = resolve_command_timeout();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
            }
            assert_eq!(
                result,
                Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
            );
        }
    }

    mod from_cli {
        use super::*;

        #[test]
        fn test_builds_config() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(SSH_DIR_ENV_VAR, "/tmp/provision-ssh");
                remove_env(PORT_ENV_VAR);
                remove_env(KEY_NAME_ENV_VAR);
            }
            let result = ProvisionConfig::from_cli(
                &cli(&["2001:db8::1", "-P", "2222", "-c", "-p", "secret123"]),
                "workstation".to_string(),
            );
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(SSH_DIR_ENV_VAR);
            }
            let config = result.unwrap();

            assert_eq!(config.target.address(), "2001:db8::1");
            assert_eq!(config.target.port(), 2222);
            assert_eq!(config.key_name, DEFAULT_KEY_NAME);
            assert_eq!(config.ssh_dir, PathBuf::from("/tmp/provision-ssh"));
            assert_eq!(
                config.known_hosts_path(),
                PathBuf::from("/tmp/provision-ssh/known_hosts")
            );
            assert!(config.force_copy);
            assert!(!config.update);
            assert!(config.credential.is_present());
            assert_eq!(config.remote_user, REMOTE_USER);
            assert_eq!(config.local_hostname, "workstation");
        }

        #[test]
        fn test_rejects_invalid_address() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            let err = ProvisionConfig::from_cli(&cli(&["not-an-ip"]), "host".to_string())
                .unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidAddress(_)));
        }

        #[test]
        fn test_accepts_ipv6_at_entry() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(SSH_DIR_ENV_VAR, "/tmp/provision-ssh");
            }
            let result = ProvisionConfig::from_cli(&cli(&["::1"]), "host".to_string());
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(SSH_DIR_ENV_VAR);
            }
            assert!(result.is_ok());
        }

        #[test]
        fn test_rejects_key_name_with_separator() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            let err = ProvisionConfig::from_cli(
                &cli(&["10.0.0.1", "-n", "../escape"]),
                "host".to_string(),
            )
            .unwrap_err();
            assert!(matches!(
                err,
                ProvisionError::InvalidSetting {
                    setting: "key name",
                    ..
                }
            ));
        }
    }
}
