//! Command-line surface.

use clap::Parser;

/// Provision an SSH key for a remote host and open a shell on it.
///
/// Ensures a local key pair exists, copies the public key to the host when
/// needed (by password or existing trust) and then starts an interactive
/// `ssh` session with that key.
#[derive(Debug, Clone, Parser)]
#[command(name = "ssh-provision", version, long_about = None)]
pub struct Cli {
    /// Remote host address (IPv4 or IPv6 literal)
    pub target_address: String,

    /// Regenerate the key pair even if it already exists
    #[arg(short = 'u', long = "update")]
    pub update: bool,

    /// Password used to copy the key (requires sshpass)
    #[arg(short = 'p', long = "password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// SSH port [default: 22, or SSH_PROVISION_PORT]
    #[arg(short = 'P', long = "port", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Copy the key even if the host is already trusted
    #[arg(short = 'c', long = "copy")]
    pub force_copy: bool,

    /// Key name under the SSH directory [default: id_rsa, or SSH_PROVISION_KEY_NAME]
    #[arg(short = 'n', long = "name", value_name = "KEYNAME")]
    pub key_name: Option<String>,

    /// Suppress all log output; failures are reported through the exit status only
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Print the provisioning plan as JSON without changing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
