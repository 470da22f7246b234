//! Trust reconciliation against the `known_hosts` store.
//!
//! A host counts as trusted when any line's host field lists its address,
//! either bare (port 22 entries) or as `[address]:port`. Hashed (`|1|`)
//! entries and comments are skipped.
//!
//! The store is append-only from this tool's point of view: entries are added
//! after an `ssh-keyscan`, never rewritten or removed. There is no file lock,
//! so two concurrent runs against the same store can both append the same
//! host; the tool assumes a single operator.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::provision::config::DEFAULT_SSH_PORT;
use crate::provision::error::ProvisionError;
use crate::provision::runner::{CommandRunner, Invocation};
use crate::provision::types::{Target, TrustRecord};

/// File-backed `known_hosts` store.
#[derive(Debug, Clone)]
pub struct KnownHostsStore {
    path: PathBuf,
}

impl KnownHostsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `target` is already recorded. A missing file means no.
    pub async fn contains(&self, target: &Target) -> Result<bool, ProvisionError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.error(e)),
        };

        Ok(String::from_utf8_lossy(&content)
            .lines()
            .any(|line| line_matches(line, target)))
    }

    /// Append `entries` to the store, creating it if needed.
    pub async fn append(&self, entries: &str) -> Result<(), ProvisionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        // Never glue a new entry onto an unterminated last line
        let needs_separator = match tokio::fs::read(&self.path).await {
            Ok(existing) => existing.last().is_some_and(|b| *b != b'\n'),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(self.error(e)),
        };

        let mut data = String::new();
        if needs_separator {
            data.push('\n');
        }
        data.push_str(entries);
        if !data.ends_with('\n') {
            data.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        file.write_all(data.as_bytes())
            .await
            .map_err(|e| self.error(e))?;
        file.flush().await.map_err(|e| self.error(e))?;

        Ok(())
    }

    fn error(&self, source: io::Error) -> ProvisionError {
        ProvisionError::TrustStore {
            path: self.path.clone(),
            source,
        }
    }
}

fn line_matches(line: &str, target: &Target) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return false;
    }

    let mut fields = line.split_whitespace();
    let mut hosts = match fields.next() {
        // Marker lines carry the host list in the second field
        Some(marker) if marker.starts_with('@') => fields.next(),
        first => first,
    }
    .unwrap_or_default()
    .split(',');

    hosts.any(|pattern| host_matches(pattern, target.address(), target.port()))
}

/// Whether a single known_hosts host pattern names `address` on `port`.
///
/// A bare address only covers port 22; any port may be written as
/// `[address]:port`.
pub fn host_matches(pattern: &str, address: &str, port: u16) -> bool {
    if pattern.starts_with('|') {
        return false;
    }
    if pattern == address {
        return port == DEFAULT_SSH_PORT;
    }
    pattern
        .strip_prefix('[')
        .and_then(|rest| rest.strip_prefix(address))
        .and_then(|rest| rest.strip_prefix("]:"))
        .and_then(|rest| rest.parse::<u16>().ok())
        .is_some_and(|entry_port| entry_port == port)
}

/// Fetches host keys with `ssh-keyscan`.
pub struct HostKeyScanner {
    runner: Arc<dyn CommandRunner>,
    timeout: Option<Duration>,
}

impl HostKeyScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    /// `ssh-keyscan` on the connection port, without `-t`, so every key type
    /// the host offers is returned.
    pub fn invocation(&self, target: &Target) -> Invocation {
        Invocation::new("ssh-keyscan")
            .args(["-p".to_string(), target.port().to_string()])
            .arg(target.address())
            .timeout(self.timeout)
    }

    /// Return known_hosts lines for `target`.
    pub async fn scan(&self, target: &Target) -> Result<String, ProvisionError> {
        let output = self
            .runner
            .run(&self.invocation(target))
            .await
            .map_err(|e| ProvisionError::HostKeyFetch {
                host: target.to_string(),
                reason: e.to_string(),
            })?;

        let entries: Vec<&str> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        if entries.is_empty() {
            return Err(ProvisionError::HostKeyFetch {
                host: target.to_string(),
                reason: "no host keys returned".to_string(),
            });
        }

        debug!("ssh-keyscan returned {} key(s) for {}", entries.len(), target);
        Ok(entries.join("\n"))
    }
}

/// Make sure `target` is in the trust store, scanning and appending its host
/// keys when it is not. Existing entries are never touched.
pub async fn ensure_trusted(
    store: &KnownHostsStore,
    scanner: &HostKeyScanner,
    target: &Target,
) -> Result<TrustRecord, ProvisionError> {
    if store.contains(target).await? {
        debug!("{} already in {}", target, store.path().display());
        return Ok(TrustRecord {
            present: true,
            recorded: false,
        });
    }

    info!("Fetching host keys for {}", target);
    let entries = scanner.scan(target).await?;
    store.append(&entries).await?;
    info!("Recorded host keys for {} in {}", target, store.path().display());

    Ok(TrustRecord {
        present: false,
        recorded: true,
    })
}
