//! Debuggee side of the synchronization protocol
//!
//! A debuggee receives its sync port as a `key=value` startup option,
//! connects back to the driver, and runs the barrier loop: announce
//! `ready`, do one unit of observable work, then block until the driver
//! says `continue`. Any other answer ends the loop with a final `end`.

use std::collections::HashMap;

use crate::common::config::SyncConfig;
use crate::common::{Error, Result};
use crate::sync::{Signal, SyncOptions, Synchronizer, SGNL_END, SGNL_READY};

/// Startup options passed to a debuggee
#[derive(Debug, Clone, Default)]
pub struct DebuggeeSettings {
    options: HashMap<String, String>,
}

impl DebuggeeSettings {
    /// Collect `key=value` options; a leading `-D` is accepted and ignored
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = args
            .into_iter()
            .filter_map(|arg| {
                let arg = arg.as_ref();
                let arg = arg.strip_prefix("-D").unwrap_or(arg);
                let (key, value) = arg.split_once('=')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Self { options }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Port of the driver's sync listener
    pub fn sync_port(&self, port_option: &str) -> Result<u16> {
        let value = self.get(port_option).ok_or_else(|| {
            Error::Config(format!("Missing startup option '{}=<port>'", port_option))
        })?;
        value
            .parse()
            .map_err(|_| Error::Config(format!("Invalid sync port '{}'", value)))
    }
}

/// Format the startup option carrying the sync port
pub fn sync_port_option(port_option: &str, port: u16) -> String {
    format!("{}={}", port_option, port)
}

/// How a debuggee run loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggeeOutcome {
    /// Units of work performed
    pub iterations: u64,
    /// Signal that ended the loop; `None` when the driver went away
    pub stop_signal: Option<String>,
}

/// Run the barrier loop against the driver at `port`
///
/// `work` is called once per iteration between `ready` and the driver's
/// answer, i.e. while the driver is guaranteed to be waiting on us.
pub async fn run_sync_debuggee<F>(options: SyncOptions, port: u16, mut work: F) -> Result<DebuggeeOutcome>
where
    F: FnMut(u64),
{
    let mut sync = Synchronizer::new(options);
    sync.connect_client(port).await?;

    let mut iterations = 0;
    let stop_signal = loop {
        match sync.send_message(SGNL_READY).await {
            Ok(()) => {}
            Err(e) if e.is_channel_closed() => break None,
            Err(e) => return Err(e),
        }

        work(iterations);
        iterations += 1;

        match sync.receive_message().await.map(Signal::from) {
            Ok(Signal::Continue) => continue,
            Ok(signal) => break Some(signal.to_string()),
            // Driver gone: same as being told to stop
            Err(e) if e.is_channel_closed() => break None,
            Err(e) => return Err(e),
        }
    };

    if stop_signal.is_some() {
        match sync.send_message(SGNL_END).await {
            Ok(()) | Err(Error::ChannelClosed) => {}
            Err(e) => return Err(e),
        }
    }
    sync.stop().await;

    tracing::info!(iterations, stop_signal = ?stop_signal, "Debuggee ended");
    Ok(DebuggeeOutcome {
        iterations,
        stop_signal,
    })
}

/// Line the sample debuggee emits for each unit of work
pub fn greeting(iteration: u64) -> String {
    format!("Hello World ---- {}", iteration)
}

/// Entry point of the built-in sample debuggee
pub async fn run(args: Vec<String>) -> Result<()> {
    let config = crate::common::config::Config::load()?;
    run_with_config(&config.sync, args, |i| println!("{}", greeting(i)))
        .await
        .map(|_| ())
}

/// Parse the startup options and run the barrier loop with `work`
pub async fn run_with_config<F>(
    sync: &SyncConfig,
    args: Vec<String>,
    work: F,
) -> Result<DebuggeeOutcome>
where
    F: FnMut(u64),
{
    let settings = DebuggeeSettings::from_args(&args);
    let port = settings.sync_port(&sync.port_option)?;

    run_sync_debuggee(SyncOptions::from_config(sync, "debuggee"), port, work).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parse() {
        let settings = DebuggeeSettings::from_args([
            "-Djpda.settings.syncPort=4711",
            "verbose=true",
            "positional",
            "-Dempty=",
        ]);
        assert_eq!(settings.get("jpda.settings.syncPort"), Some("4711"));
        assert_eq!(settings.get("verbose"), Some("true"));
        assert_eq!(settings.get("empty"), Some(""));
        assert_eq!(settings.get("positional"), None);
        assert_eq!(settings.sync_port("jpda.settings.syncPort").unwrap(), 4711);
    }

    #[test]
    fn test_sync_port_errors() {
        let settings = DebuggeeSettings::from_args(["port=abc"]);
        assert!(matches!(settings.sync_port("port"), Err(Error::Config(_))));
        assert!(matches!(settings.sync_port("other"), Err(Error::Config(_))));
    }

    #[test]
    fn test_option_round_trip() {
        let option = sync_port_option("jpda.settings.syncPort", 9000);
        assert_eq!(option, "jpda.settings.syncPort=9000");
        let settings = DebuggeeSettings::from_args([option]);
        assert_eq!(settings.sync_port("jpda.settings.syncPort").unwrap(), 9000);
    }
}
