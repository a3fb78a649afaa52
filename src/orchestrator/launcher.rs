//! Debuggee launching
//!
//! The driver only needs two things from a launcher: start the debuggee
//! with one extra startup option, and hand back something it can wait on
//! or kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::common::config::{DebuggeeConfig, SyncConfig};
use crate::common::{Error, Result};
use crate::debuggee::{self, DebuggeeOutcome};

/// A running debuggee
pub enum DebuggeeHandle {
    /// Separate OS process
    Process(Child),
    /// In-process task running the sample debuggee loop
    Task(JoinHandle<Result<DebuggeeOutcome>>),
}

impl DebuggeeHandle {
    /// OS process id, if any
    pub fn id(&self) -> Option<u32> {
        match self {
            DebuggeeHandle::Process(child) => child.id(),
            DebuggeeHandle::Task(_) => None,
        }
    }

    /// Exit code if the debuggee has already finished
    pub fn try_exit_code(&mut self) -> Option<Option<i32>> {
        match self {
            DebuggeeHandle::Process(child) => child.try_wait().ok().flatten().map(|s| s.code()),
            DebuggeeHandle::Task(task) => task.is_finished().then_some(None),
        }
    }

    /// Wait for the debuggee to finish, killing it after `timeout`
    ///
    /// Returns the exit code when one is known.
    pub async fn wait_or_kill(&mut self, timeout: Duration) -> Result<Option<i32>> {
        match self {
            DebuggeeHandle::Process(child) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => Ok(status?.code()),
                Err(_) => {
                    tracing::warn!(pid = ?child.id(), "Debuggee did not exit, killing it");
                    child.kill().await?;
                    Ok(None)
                }
            },
            DebuggeeHandle::Task(task) => match tokio::time::timeout(timeout, &mut *task).await {
                Ok(Ok(Ok(_))) => Ok(Some(0)),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "In-process debuggee failed");
                    Ok(Some(1))
                }
                Ok(Err(join_error)) => Err(Error::Internal(join_error.to_string())),
                Err(_) => {
                    task.abort();
                    Ok(None)
                }
            },
        }
    }
}

/// Starts debuggees with the sync option injected
#[async_trait]
pub trait DebuggeeLauncher: Send + Sync {
    /// Start the debuggee; `sync_option` is the full `key=value` option
    async fn launch(&self, sync_option: &str) -> Result<DebuggeeHandle>;
}

/// Launches the debuggee as a child process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    option_prefix: String,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, args: Vec<String>, option_prefix: &str) -> Self {
        Self {
            program,
            args,
            option_prefix: option_prefix.to_string(),
        }
    }

    /// Build from config; falls back to this executable's `debuggee` subcommand
    pub fn from_config(config: &DebuggeeConfig) -> Result<Self> {
        match &config.program {
            Some(program) => Ok(Self::new(
                resolve_program(program)?,
                config.args.clone(),
                &config.option_prefix,
            )),
            None => {
                let exe = std::env::current_exe().map_err(|e| {
                    Error::Internal(format!("Failed to get current executable path: {}", e))
                })?;
                let mut args = vec!["debuggee".to_string()];
                args.extend(config.args.iter().cloned());
                Ok(Self::new(exe, args, &config.option_prefix))
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one launch, sync option last
    pub fn command_args(&self, sync_option: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(format!("{}{}", self.option_prefix, sync_option));
        args
    }
}

#[async_trait]
impl DebuggeeLauncher for ProcessLauncher {
    async fn launch(&self, sync_option: &str) -> Result<DebuggeeHandle> {
        let args = self.command_args(sync_option);
        tracing::debug!(program = %self.program.display(), ?args, "Launching debuggee");

        // The driver's stdout carries the run report
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(std::io::stderr())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::DebuggeeLaunch(format!("Failed to start {}: {}", self.program.display(), e))
            })?;

        tracing::info!(pid = ?child.id(), "Debuggee started");
        Ok(DebuggeeHandle::Process(child))
    }
}

/// Runs the sample debuggee loop as a task in this process
#[derive(Debug, Clone, Default)]
pub struct InProcessLauncher {
    sync: SyncConfig,
}

impl InProcessLauncher {
    pub fn new(sync: SyncConfig) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl DebuggeeLauncher for InProcessLauncher {
    async fn launch(&self, sync_option: &str) -> Result<DebuggeeHandle> {
        let sync = self.sync.clone();
        let args = vec![sync_option.to_string()];
        let task = tokio::spawn(async move {
            // Same process as the driver, so keep off its stdout
            debuggee::run_with_config(&sync, args, |i| eprintln!("{}", debuggee::greeting(i)))
                .await
        });
        Ok(DebuggeeHandle::Task(task))
    }
}

/// Resolve a bare program name through PATH
fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 || program.exists() {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|_| {
        Error::DebuggeeLaunch(format!("'{}' not found in PATH", program.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_append_option() {
        let launcher = ProcessLauncher::new(
            PathBuf::from("/usr/bin/java"),
            vec!["-cp".to_string(), "tests.jar".to_string()],
            "-D",
        );
        assert_eq!(
            launcher.command_args("jpda.settings.syncPort=1234"),
            vec!["-cp", "tests.jar", "-Djpda.settings.syncPort=1234"]
        );
    }

    #[test]
    fn test_default_launcher_uses_debuggee_subcommand() {
        let launcher = ProcessLauncher::from_config(&DebuggeeConfig::default()).unwrap();
        assert_eq!(launcher.command_args("k=v"), vec!["debuggee", "k=v"]);
    }

    #[test]
    fn test_missing_program() {
        let config = DebuggeeConfig {
            program: Some(PathBuf::from("definitely-not-a-real-debuggee-binary")),
            ..Default::default()
        };
        assert!(matches!(
            ProcessLauncher::from_config(&config),
            Err(Error::DebuggeeLaunch(_))
        ));
    }
}
