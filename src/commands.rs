//! CLI command definitions
//!
//! Defines the clap commands for the conformance CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scenarios listed in a suite file
    Run {
        /// Path to the YAML suite file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// List built-in scenarios and their checkpoints
    Scenarios,

    /// Check that this host can run the debugger and hot reload scenarios
    CheckHost {
        /// Configuration file to check instead of the default one
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
