//! End-to-end provisioning run.
//!
//! ## Stages
//!
//! 1. **Gate**: `ssh`, `ssh-keygen`, `ssh-copy-id` and `ssh-keyscan` must be
//!    on `PATH`, installing them if possible.
//!    A password copy also needs `sshpass`, which is only installed when
//!    running as root; without it the run stops here, before any key is
//!    generated.
//! 2. **Decision**: [`decide`] from key presence, `-u` and `-c`.
//! 3. **Generation**: `ssh-keygen` when the plan says so.
//! 4. **Copy gate**: a host that is already trusted and does not need a copy
//!    is left alone.
//! 5. **Transfer**: the host key for the connection port is fetched and
//!    recorded if missing, then the key is copied.
//!
//! [`Provisioner::connect`] then opens the interactive session. Each stage
//! fails fast; nothing is retried.

use std::sync::Arc;

use tracing::info;

use crate::provision::config::ProvisionConfig;
use crate::provision::error::ProvisionError;
use crate::provision::gate::{CommandGate, PathLocator, REQUIRED_TOOLS, ToolLocator};
use crate::provision::installer::{Installer, PackageManagerInstaller};
use crate::provision::keys::{KeyGenerator, decide, key_comment};
use crate::provision::known_hosts::{HostKeyScanner, KnownHostsStore, ensure_trusted};
use crate::provision::runner::{CommandRunner, Invocation, SystemRunner};
use crate::provision::transfer::{CopyRequest, CopyStrategy, strategy_for};
use crate::provision::types::{KeyIdentity, ProvisionReport, ProvisioningPlan, TrustRecord};

/// External capabilities the pipeline depends on.
pub struct Dependencies {
    pub runner: Arc<dyn CommandRunner>,
    pub locator: Arc<dyn ToolLocator>,
    pub installer: Arc<dyn Installer>,
    /// Whether the process runs with effective UID 0
    pub elevated: bool,
}

impl Dependencies {
    /// Real processes, the real `PATH` and the detected package manager.
    pub fn system(config: &ProvisionConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        Self {
            installer: Arc::new(PackageManagerInstaller::detect(
                runner.clone(),
                config.command_timeout,
            )),
            runner,
            locator: Arc::new(PathLocator::from_env()),
            elevated: nix::unistd::geteuid().is_root(),
        }
    }
}

/// What a provisioning run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub plan: ProvisioningPlan,
    pub trust: TrustRecord,
    pub transferred: bool,
}

/// Whether the key has to be copied.
///
/// A copy is needed when the plan asks for one, or when the host is not
/// trusted yet: an unknown host cannot have received this key.
pub fn requires_transfer(plan: ProvisioningPlan, trusted: bool) -> bool {
    plan.must_copy || !trusted
}

/// Runs the provisioning stages for one configuration.
pub struct Provisioner {
    config: ProvisionConfig,
    deps: Dependencies,
    identity: KeyIdentity,
    store: KnownHostsStore,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig, deps: Dependencies) -> Self {
        let identity = KeyIdentity::new(&config.ssh_dir, &config.key_name);
        let store = KnownHostsStore::new(config.known_hosts_path());
        Self {
            config,
            deps,
            identity,
            store,
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn identity(&self) -> &KeyIdentity {
        &self.identity
    }

    /// Work out what a run would do without side effects.
    pub async fn preview(&self) -> Result<ProvisionReport, ProvisionError> {
        let presence = self.identity.presence();
        let plan = decide(presence, self.config.update, self.config.force_copy);
        let trusted = self.store.contains(&self.config.target).await?;
        let transfer_required = requires_transfer(plan, trusted);

        Ok(ProvisionReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            target: self.config.target.clone(),
            connection: self.config.target.connection_string(&self.config.remote_user),
            identity: self.identity.clone(),
            key_presence: presence,
            plan,
            trusted,
            transfer_required,
            transfer_strategy: transfer_required
                .then(|| strategy_for(&self.config.credential).name().to_string()),
        })
    }

    /// Ensure tools, key pair, host trust and remote key installation.
    pub async fn provision(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let target = &self.config.target;
        info!("Provisioning {} ({})", target, target.family());

        let gate = CommandGate::new(self.deps.locator.as_ref(), self.deps.installer.as_ref());
        gate.ensure(REQUIRED_TOOLS).await?;

        // Must pass before any key is touched
        let strategy = strategy_for(&self.config.credential);
        if let Some(tool) = strategy.required_tool() {
            gate.ensure_privileged(tool, self.deps.elevated).await?;
        }

        let plan = decide(
            self.identity.presence(),
            self.config.update,
            self.config.force_copy,
        );
        info!(
            "Key {}: generate={}, copy={}",
            self.identity.name, plan.must_generate, plan.must_copy
        );

        if plan.must_generate {
            KeyGenerator::new(self.deps.runner.clone(), self.config.command_timeout)
                .generate(&self.identity, &key_comment(&self.config.local_hostname))
                .await?;
        }

        let trusted = self.store.contains(target).await?;
        if !requires_transfer(plan, trusted) {
            info!("{} is already trusted, skipping key copy", target);
            return Ok(ProvisionOutcome {
                plan,
                trust: TrustRecord {
                    present: true,
                    recorded: false,
                },
                transferred: false,
            });
        }

        let trust = self.transfer(strategy.as_ref()).await?;

        Ok(ProvisionOutcome {
            plan,
            trust,
            transferred: true,
        })
    }

    async fn transfer(&self, strategy: &dyn CopyStrategy) -> Result<TrustRecord, ProvisionError> {
        let scanner = HostKeyScanner::new(self.deps.runner.clone(), self.config.command_timeout);
        let trust = ensure_trusted(&self.store, &scanner, &self.config.target).await?;

        let request = CopyRequest {
            identity: &self.identity,
            target: &self.config.target,
            user: &self.config.remote_user,
            timeout: self.config.command_timeout,
        };
        strategy.copy(self.deps.runner.as_ref(), &request).await?;

        Ok(trust)
    }

    /// `ssh` invocation for the interactive session.
    pub fn session_invocation(&self) -> Invocation {
        let target = &self.config.target;
        Invocation::new("ssh")
            .arg("-i")
            .arg(self.identity.private_key.to_string_lossy())
            .args(["-p".to_string(), target.port().to_string()])
            .arg(target.connection_string(&self.config.remote_user))
    }

    /// Open the interactive session and return its exit code.
    pub async fn connect(&self) -> Result<i32, ProvisionError> {
        let invocation = self.session_invocation();
        let destination = self.config.target.connection_string(&self.config.remote_user);
        info!("Connecting to {} on port {}", destination, self.config.target.port());

        self.deps
            .runner
            .run_interactive(&invocation)
            .await
            .map_err(|source| ProvisionError::Session {
                destination,
                source,
            })
    }
}
