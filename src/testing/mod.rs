//! Suite runner
//!
//! Reads YAML suite files naming built-in scenarios and the programs to run
//! them against, then drives each scenario with a fresh debugger process.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_scenario, run_suite, ScenarioResult};
