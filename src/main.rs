#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use ssh_provision::provision::{Cli, Dependencies, ProvisionConfig, ProvisionError, Provisioner};
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;

fn main() -> ExitCode {
    dotenv().ok();

    let cli = Cli::parse();

    // Quiet mode installs no subscriber at all
    if !cli.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("info".parse().expect("valid directive")),
            )
            .with_timer(ChronoLocal::rfc_3339())
            .with_writer(std::io::stderr)
            .init();
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, ProvisionError> {
    let local_hostname = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());

    let config = ProvisionConfig::from_cli(&cli, local_hostname)?;
    let deps = Dependencies::system(&config);
    let provisioner = Provisioner::new(config, deps);

    if provisioner.config().dry_run {
        let report = provisioner.preview().await?;
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return Ok(ExitCode::FAILURE);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = provisioner.provision().await?;
    info!(
        "Provisioning complete (generated: {}, copied: {}, host keys recorded: {})",
        outcome.plan.must_generate, outcome.transferred, outcome.trust.recorded
    );

    let status = provisioner.connect().await?;
    if status != 0 {
        info!("Session ended with status {}", status);
    }
    Ok(session_exit_code(status))
}

/// Map the remote session status onto the process exit code.
fn session_exit_code(status: i32) -> ExitCode {
    match u8::try_from(status) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}
