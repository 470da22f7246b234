//! SSH key provisioning for a single remote host.
//!
//! This module is organized into the following submodules:
//!
//! - `address`: IPv4/IPv6 literal classification
//! - `cli`: Command-line flags
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error types, exit codes and copy failure classification
//! - `runner`: External command execution
//! - `installer`: Package manager installs for missing tools
//! - `gate`: Command availability checks
//! - `keys`: Key provisioning decision and key generation
//! - `known_hosts`: Trust store reconciliation
//! - `transfer`: Public key copy strategies
//! - `pipeline`: The end-to-end run and interactive session

pub mod address;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod installer;
pub mod keys;
pub mod known_hosts;
pub mod pipeline;
pub mod runner;
pub mod transfer;
pub mod types;

pub use cli::Cli;
pub use config::ProvisionConfig;
pub use error::{ErrorKind, ProvisionError};
pub use pipeline::{Dependencies, ProvisionOutcome, Provisioner};
