//! Synchronized test session
//!
//! Drives one debuggee through its lifecycle:
//! 1. `before_debuggee_start`: bind the sync listener, build the startup option
//! 2. `set_up`: launch, attach to the debug agent and resume the VM, accept
//!    the sync connection
//! 3. barrier cycles: `await_ready`, inspect, `resume_debuggee`
//! 4. `tear_down`: optional final signal, close everything, reap the debuggee

use std::time::{Duration, Instant};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::debuggee::sync_port_option;
use crate::jdwp::JdwpConnection;
use crate::sync::{SyncOptions, Synchronizer, SGNL_CONTINUE, SGNL_END, SGNL_READY};

use super::launcher::{DebuggeeHandle, DebuggeeLauncher};

/// Poll interval while waiting for the agent to start listening
const AGENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Driver-side state for one synchronized run
pub struct SyncTestSession<L: DebuggeeLauncher> {
    config: Config,
    launcher: L,
    synchronizer: Synchronizer,
    sync_option: Option<String>,
    debuggee: Option<DebuggeeHandle>,
    connection: Option<JdwpConnection>,
    /// Sent during tear-down, if set
    pub final_sync_message: Option<String>,
}

impl<L: DebuggeeLauncher> SyncTestSession<L> {
    pub fn new(config: Config, launcher: L) -> Self {
        let synchronizer = Synchronizer::new(SyncOptions::from_config(&config.sync, "driver"));
        Self {
            config,
            launcher,
            synchronizer,
            sync_option: None,
            debuggee: None,
            connection: None,
            final_sync_message: None,
        }
    }

    /// Bind the sync listener; returns the option to pass to the debuggee
    pub async fn before_debuggee_start(&mut self) -> Result<String> {
        let port = self.synchronizer.bind_server().await?;
        let option = sync_port_option(&self.config.sync.port_option, port);
        tracing::info!(port, "Sync listener ready");
        self.sync_option = Some(option.clone());
        Ok(option)
    }

    /// Launch the debuggee and establish both connections
    pub async fn set_up(&mut self) -> Result<()> {
        let option = match &self.sync_option {
            Some(option) => option.clone(),
            None => self.before_debuggee_start().await?,
        };

        let debuggee = self.launcher.launch(&option).await?;
        tracing::info!(pid = ?debuggee.id(), option = %option, "Launched debuggee");
        self.debuggee = Some(debuggee);

        if let Some(addr) = self.config.agent.address.clone() {
            let mut connection = self.connect_agent(&addr).await?;
            connection.vm_resume().await?;
            tracing::info!("Resumed debuggee VM");
            self.connection = Some(connection);
        }

        if let Err(e) = self.synchronizer.start_server().await {
            // A debuggee that died during startup explains the timeout better
            if let Some(code) = self.debuggee.as_mut().and_then(|d| d.try_exit_code()) {
                return Err(Error::DebuggeeExited(code));
            }
            return Err(e);
        }
        tracing::info!("Established sync connection");
        Ok(())
    }

    /// Connect to the agent, polling until it listens or the handshake bound passes
    async fn connect_agent(&mut self, addr: &str) -> Result<JdwpConnection> {
        let timeout = self.config.agent.handshake_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            match JdwpConnection::connect(addr, &self.config.agent).await {
                Ok(connection) => return Ok(connection),
                Err(Error::ConnectionRefused(_)) if Instant::now() < deadline => {
                    if let Some(code) = self.debuggee.as_mut().and_then(|d| d.try_exit_code()) {
                        return Err(Error::DebuggeeExited(code));
                    }
                    tokio::time::sleep(AGENT_POLL_INTERVAL).await;
                }
                Err(Error::ConnectionRefused(_)) => {
                    return Err(Error::ConnectionTimeout(timeout.as_secs()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for the debuggee to reach its barrier
    pub async fn await_ready(&mut self) -> Result<()> {
        self.synchronizer.receive_expected(SGNL_READY).await
    }

    /// Let the debuggee run one more unit of work
    pub async fn resume_debuggee(&mut self) -> Result<()> {
        self.synchronizer.send_message(SGNL_CONTINUE).await
    }

    /// Send any signal, e.g. a test-specific payload
    pub async fn signal(&mut self, text: &str) -> Result<()> {
        self.synchronizer.send_message(text).await
    }

    /// Receive any signal
    pub async fn receive(&mut self) -> Result<String> {
        self.synchronizer.receive_message().await
    }

    /// Send a terminating signal and require the debuggee's `end`
    pub async fn release_debuggee(&mut self, stop_signal: &str) -> Result<()> {
        if stop_signal == SGNL_CONTINUE {
            return Err(Error::Config(
                "'continue' does not end the debuggee loop".to_string(),
            ));
        }
        self.synchronizer.send_message(stop_signal).await?;
        self.synchronizer.receive_expected(SGNL_END).await
    }

    /// Debug connection, when an agent address was configured
    pub fn connection(&mut self) -> Option<&mut JdwpConnection> {
        self.connection.as_mut()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Close everything and reap the debuggee; returns its exit code if known
    pub async fn tear_down(mut self) -> Result<Option<i32>> {
        if let Some(message) = self.final_sync_message.take() {
            // Courtesy only: the debuggee may already be gone
            if let Err(e) = self.synchronizer.send_message(&message).await {
                tracing::debug!(error = %e, "Final sync message not delivered");
            }
        }
        self.synchronizer.stop().await;
        tracing::info!("Completed sync connection");

        if let Some(connection) = self.connection.take().filter(|c| c.is_open()) {
            if let Err(e) = connection.vm_dispose().await {
                tracing::debug!(error = %e, "VM dispose failed");
            }
        }

        match self.debuggee.take() {
            Some(mut debuggee) => {
                let code = debuggee
                    .wait_or_kill(self.config.sync.connect_timeout())
                    .await?;
                tracing::info!(exit_code = ?code, "Debuggee finished");
                Ok(code)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::SyncConfig;
    use crate::orchestrator::launcher::InProcessLauncher;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sync = SyncConfig {
            connect_timeout_secs: 5,
            receive_timeout_secs: 5,
            ..SyncConfig::default()
        };
        config
    }

    #[tokio::test]
    async fn test_in_process_cycles() {
        let config = test_config();
        let launcher = InProcessLauncher::new(config.sync.clone());
        let mut session = SyncTestSession::new(config, launcher);

        let option = session.before_debuggee_start().await.unwrap();
        assert!(option.starts_with("jpda.settings.syncPort="));

        session.set_up().await.unwrap();
        for _ in 0..3 {
            session.await_ready().await.unwrap();
            session.resume_debuggee().await.unwrap();
        }
        session.await_ready().await.unwrap();
        session.release_debuggee("stop").await.unwrap();

        assert_eq!(session.tear_down().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_release_rejects_continue() {
        let config = test_config();
        let launcher = InProcessLauncher::new(config.sync.clone());
        let mut session = SyncTestSession::new(config, launcher);
        assert!(matches!(
            session.release_debuggee("continue").await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_final_message_ends_debuggee() {
        let config = test_config();
        let launcher = InProcessLauncher::new(config.sync.clone());
        let mut session = SyncTestSession::new(config, launcher);

        session.set_up().await.unwrap();
        session.await_ready().await.unwrap();
        session.final_sync_message = Some("done".to_string());

        assert_eq!(session.tear_down().await.unwrap(), Some(0));
    }
}
