//! Conformance runner for GDB/MI managed-runtime debuggers
//!
//! Drives a debugger through checkpoint scenarios over its MI interface and
//! reports which ones pass.

use clap::Parser;
use commands::Commands;
use conformance::common::logging;
use conformance::{cli, commands};

#[derive(Parser)]
#[command(name = "conformance", about = "GDB/MI debugger conformance runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { verbose, .. } => {
            if let Some(path) = logging::init_suite(*verbose) {
                eprintln!("Transcript: {}", path.display());
            }
        }
        _ => logging::init_cli(false),
    }

    match cli::dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
