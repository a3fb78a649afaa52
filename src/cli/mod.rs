//! CLI command handling
//!
//! Runs the driver side of a synchronized session and formats the report.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{parse_agent_address, paths, Error, Result};
use crate::jdwp::constants::{event_kind_name, SuspendPolicy};
use crate::jdwp::VmVersion;
use crate::orchestrator::{DebuggeeLauncher, InProcessLauncher, ProcessLauncher, SyncTestSession};

/// Signal used to end the debuggee loop after the last barrier
const STOP_SIGNAL: &str = "stop";

/// Outcome of one barrier
#[derive(Debug, Serialize)]
pub struct CycleReport {
    pub index: u32,
    /// Agent's version reply, queried while the debuggee was held
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmVersion>,
    /// Events drained from the agent connection at this barrier
    pub events: usize,
}

/// Outcome of a run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub cycles: Vec<CycleReport>,
    pub end_received: bool,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.end_received
    }
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Debuggee { .. } => {
            // Handled in main before logging is set up
            unreachable!("Debuggee command should be handled in main")
        }

        Commands::Run {
            cycles,
            agent,
            program,
            option_prefix,
            in_process,
            config,
            json,
            args,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(agent) = agent {
                let (host, port) = parse_agent_address(&agent).ok_or_else(|| {
                    Error::Config(format!("Invalid agent address '{}'", agent))
                })?;
                config.agent.address = Some(format!("{}:{}", host, port));
            }
            if program.is_some() {
                config.debuggee.program = program;
            }
            if let Some(prefix) = option_prefix {
                config.debuggee.option_prefix = prefix;
            }
            if !args.is_empty() {
                config.debuggee.args = args;
            }

            let report = if in_process {
                let launcher = InProcessLauncher::new(config.sync.clone());
                run_session(config, launcher, cycles).await?
            } else {
                let launcher = ProcessLauncher::from_config(&config.debuggee)?;
                run_session(config, launcher, cycles).await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            if report.passed() {
                Ok(())
            } else {
                Err(Error::Internal(
                    report
                        .error
                        .unwrap_or_else(|| "debuggee did not send 'end'".to_string()),
                ))
            }
        }

        Commands::Config { config } => {
            let path = config.clone().or_else(paths::config_path);
            let config = load_config(config.as_deref())?;

            match path {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("Config file: (no config directory)"),
            }
            println!("Sync:");
            println!("  bind_address: {}", config.sync.bind_address);
            println!("  connect_timeout_secs: {}", config.sync.connect_timeout_secs);
            println!("  receive_timeout_secs: {}", config.sync.receive_timeout_secs);
            println!("  port_option: {}", config.sync.port_option);
            println!("Agent:");
            println!(
                "  address: {}",
                config.agent.address.as_deref().unwrap_or("(none)")
            );
            println!("  handshake_timeout_secs: {}", config.agent.handshake_timeout_secs);
            println!("  reply_timeout_secs: {}", config.agent.reply_timeout_secs);
            println!("  max_packet_bytes: {}", config.agent.max_packet_bytes);
            println!("Debuggee:");
            match &config.debuggee.program {
                Some(program) => println!("  program: {}", program.display()),
                None => println!("  program: (built-in sample debuggee)"),
            }
            println!("  args: {:?}", config.debuggee.args);
            println!("  option_prefix: {:?}", config.debuggee.option_prefix);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_path(path),
        None => Config::load(),
    }
}

/// Drive a full session; always tears down, even after a failed set-up or cycle
pub async fn run_session<L: DebuggeeLauncher>(
    config: Config,
    launcher: L,
    cycles: u32,
) -> Result<RunReport> {
    let mut session = SyncTestSession::new(config, launcher);
    if let Err(e) = session.set_up().await {
        if let Err(cleanup) = session.tear_down().await {
            tracing::debug!(error = %cleanup, "Tear-down after failed set-up");
        }
        return Err(e);
    }

    let mut reports = Vec::new();
    let result = drive_cycles(&mut session, cycles, &mut reports).await;
    if result.is_err() {
        session.final_sync_message = Some(STOP_SIGNAL.to_string());
    }

    let exit_code = session.tear_down().await?;
    Ok(RunReport {
        cycles: reports,
        end_received: result.is_ok(),
        exit_code,
        error: result.err().map(|e| e.to_string()),
    })
}

async fn drive_cycles<L: DebuggeeLauncher>(
    session: &mut SyncTestSession<L>,
    cycles: u32,
    reports: &mut Vec<CycleReport>,
) -> Result<()> {
    for index in 0..cycles.max(1) {
        session.await_ready().await?;
        tracing::info!(cycle = index, "Debuggee at barrier");

        // The debuggee is blocked until we answer, so this view is stable
        let mut report = CycleReport {
            index,
            vm: None,
            events: 0,
        };
        if let Some(connection) = session.connection() {
            report.vm = Some(connection.vm_version().await?);
            while let Some(event) = connection.try_next_event() {
                tracing::debug!(
                    command_set = event.command_set(),
                    command = event.command(),
                    kind = event.first_event_kind().map(event_kind_name).unwrap_or("NONE"),
                    policy = ?event.suspend_policy().map(SuspendPolicy::try_from),
                    "Agent event"
                );
                report.events += 1;
            }
        }
        reports.push(report);

        if index + 1 < cycles {
            session.resume_debuggee().await?;
        }
    }

    session.release_debuggee(STOP_SIGNAL).await
}

fn print_report(report: &RunReport) {
    println!("\n{}", "Synchronized run:".blue().bold());
    for cycle in &report.cycles {
        let vm = cycle
            .vm
            .as_ref()
            .map(|v| format!(" vm={} {}", v.vm_name, v.vm_version))
            .unwrap_or_default();
        println!(
            "  {} barrier {}{} events={}",
            "✓".green(),
            cycle.index,
            vm.dimmed(),
            cycle.events
        );
    }

    if let Some(error) = &report.error {
        println!("  {} {}", "✗".red(), error.red());
    }

    let code = report
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if report.passed() {
        println!("{} debuggee ended (exit code {})", "PASSED".green().bold(), code);
    } else {
        println!("{} (exit code {})", "FAILED".red().bold(), code);
    }
}
