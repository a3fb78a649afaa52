//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Synchronizer channel settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Debug agent connection settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Debuggee launch settings
    #[serde(default)]
    pub debuggee: DebuggeeConfig,
}

/// Synchronizer channel settings
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Address the driver binds the sync listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// How long `start_server`/`connect_client` may wait for the peer
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a single receive may block
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,

    /// Option key carrying the sync port to the debuggee
    #[serde(default = "default_port_option")]
    pub port_option: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            connect_timeout_secs: default_connect_timeout(),
            receive_timeout_secs: default_receive_timeout(),
            port_option: default_port_option(),
        }
    }
}

impl SyncConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_receive_timeout() -> u64 {
    30
}
fn default_port_option() -> String {
    "jpda.settings.syncPort".to_string()
}

/// Debug agent connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// host:port of the debug agent, if the run should attach to one
    #[serde(default)]
    pub address: Option<String>,

    /// Timeout for the TCP connect plus `JDWP-Handshake` exchange
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Timeout waiting for the reply to a single command
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,

    /// Upper bound on a single frame's declared length
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: None,
            handshake_timeout_secs: default_handshake_timeout(),
            reply_timeout_secs: default_reply_timeout(),
            max_packet_bytes: default_max_packet_bytes(),
        }
    }
}

impl AgentConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

fn default_handshake_timeout() -> u64 {
    10
}
fn default_reply_timeout() -> u64 {
    30
}
fn default_max_packet_bytes() -> u32 {
    16 * 1024 * 1024
}

/// Debuggee launch settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DebuggeeConfig {
    /// Program to launch; the harness's own `debuggee` subcommand when unset
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Arguments placed before the injected sync option
    #[serde(default)]
    pub args: Vec<String>,

    /// Prefix for the injected `key=value` option (e.g. `-D` for a JVM)
    #[serde(default)]
    pub option_prefix: String,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.bind_address, "127.0.0.1");
        assert_eq!(config.sync.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.sync.port_option, "jpda.settings.syncPort");
        assert!(config.agent.address.is_none());
        assert!(config.debuggee.program.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sync]
receive_timeout_secs = 5

[agent]
address = "localhost:8000"

[debuggee]
program = "/usr/bin/java"
option_prefix = "-D"
"#
        )
        .unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.sync.receive_timeout_secs, 5);
        assert_eq!(config.sync.connect_timeout_secs, 10);
        assert_eq!(config.agent.address.as_deref(), Some("localhost:8000"));
        assert_eq!(config.agent.reply_timeout_secs, 30);
        assert_eq!(config.debuggee.option_prefix, "-D");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync\nbind_address = 1").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }
}
