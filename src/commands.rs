//! CLI command definitions
//!
//! Defines the clap commands for the harness.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch a debuggee and drive it through synchronized barrier cycles
    Run {
        /// Number of ready/inspect barriers before releasing the debuggee
        #[arg(long, default_value_t = 3)]
        cycles: u32,

        /// Debug agent address (host:port) to attach to and resume
        #[arg(long)]
        agent: Option<String>,

        /// Debuggee program (default: this binary's sample debuggee)
        #[arg(long)]
        program: Option<PathBuf>,

        /// Prefix for the injected sync option (e.g. -D)
        #[arg(long)]
        option_prefix: Option<String>,

        /// Run the sample debuggee as a task instead of a child process
        #[arg(long, conflicts_with = "program")]
        in_process: bool,

        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Arguments passed to the debuggee before the sync option
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show the resolved configuration
    Config {
        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Sample debuggee (spawned by `run`)
    #[command(hide = true)]
    Debuggee {
        /// Startup options as key=value
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
}
