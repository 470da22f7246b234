//! Typed wrapper around external command execution.
//!
//! Every external tool the pipeline touches (`ssh-keygen`, `ssh-keyscan`,
//! `ssh-copy-id`, `sshpass`, package managers, the final `ssh` session) is run
//! through a [`CommandRunner`]. Callers receive either captured output or a
//! [`CommandError`] and never look at raw exit statuses themselves.
//!
//! Captured invocations honour an optional timeout; the child is killed when
//! it expires. Interactive invocations inherit the terminal and never time out.

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A single external program invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable. Values are never logged.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Text written to the child's stdin before waiting on it.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined with spaces, for log lines.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("stdin", &self.stdin.as_ref().map(|_| "<piped>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Output of a successful captured invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Failure of an external invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program}: command not found")]
    NotFound { program: String },

    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("{program} exited with {}{}", status_label(.code), stderr_suffix(.stderr))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    /// Captured stderr of a failed invocation, empty for other variants.
    pub fn stderr(&self) -> &str {
        match self {
            CommandError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }

    fn io(program: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            CommandError::NotFound {
                program: program.to_string(),
            }
        } else {
            CommandError::Io {
                program: program.to_string(),
                source,
            }
        }
    }
}

fn status_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// Executes external programs on behalf of the pipeline.
///
/// The production implementation is [`SystemRunner`]; tests substitute fakes
/// that record invocations instead of spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with captured stdout/stderr. Any non-zero exit is an error.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;

    /// Run attached to the current terminal and return the exit code.
    ///
    /// A non-zero exit code is returned as `Ok`; only spawn failures and
    /// signal termination are errors.
    async fn run_interactive(&self, invocation: &Invocation) -> Result<i32, CommandError>;
}

/// Runs invocations as real child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        let program = invocation.program.as_str();
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out wait drops the child, which must not outlive us
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| CommandError::io(program, e))?;

        if let Some(input) = &invocation.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| CommandError::io(program, e))?;
            // stdin is dropped here so the child sees EOF
        }

        let wait = child.wait_with_output();
        let output = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                CommandError::TimedOut {
                    program: program.to_string(),
                    after: limit,
                }
            })?,
            None => wait.await,
        }
        .map_err(|e| CommandError::io(program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr,
            })
        }
    }

    async fn run_interactive(&self, invocation: &Invocation) -> Result<i32, CommandError> {
        let program = invocation.program.as_str();
        debug!("Running interactively: {}", invocation.command_line());

        let status = Command::new(program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| CommandError::io(program, e))?;

        status.code().ok_or_else(|| CommandError::Failed {
            program: program.to_string(),
            code: None,
            stderr: String::new(),
        })
    }
}
