//! jdwp-harness - drive a debuggee through synchronized test cycles
//!
//! The driver opens a sync channel, launches the debuggee with the port as a
//! startup option, and optionally attaches to its debug agent over JDWP.

use clap::Parser;
use commands::Commands;
use jdwp_harness::common::logging;
use jdwp_harness::{cli, commands, debuggee};

#[derive(Parser)]
#[command(name = "jdwp-harness", about = "Synchronized JDWP test harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Debuggee { options } => {
            logging::init_debuggee();
            debuggee::run(options).await
        }
        command => {
            logging::init_driver();
            cli::dispatch(command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
