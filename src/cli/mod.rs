//! CLI command handling
//!
//! Dispatches CLI commands and formats their output.

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::hot_reload::runtime;
use crate::scenarios::SCENARIOS;
use crate::testing;

/// Dispatch a CLI command
///
/// Returns `false` when the command ran but reported failures.
pub async fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Run { path, verbose } => {
            let config = Config::load()?;
            let results = testing::run_suite(&path, &config, verbose).await?;
            Ok(results.iter().all(|r| r.passed))
        }

        Commands::Scenarios => {
            for scenario in SCENARIOS {
                println!("{}  {}", scenario.name.white().bold(), scenario.description.dimmed());
                let chain = scenario.chain()?;
                let names: Vec<_> = chain.names().collect();
                println!("    {}", names.join(" -> "));
            }
            Ok(true)
        }

        Commands::CheckHost { config } => {
            let config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            Ok(check_host(&config).await)
        }
    }
}

/// Report each host prerequisite, returning whether all of them hold
async fn check_host(config: &Config) -> bool {
    let info = os_info::get();
    println!("Host: {} {} ({})", info.os_type(), info.version(), info.bitness());

    let checks = [
        ("debugger", config.debugger_path().map(|p| p.display().to_string())),
        (
            "runtime",
            runtime::check_host_runtime(&config.hot_reload.runtime)
                .await
                .map(|v| v.to_string()),
        ),
        (
            "transfer",
            runtime::check_host_os(config.hot_reload.transfer)
                .map(|_| format!("{:?}", config.hot_reload.transfer).to_lowercase()),
        ),
    ];

    let mut ok = true;
    for (name, check) in checks {
        match check {
            Ok(detail) => println!("  {} {:<9} {}", "✓".green(), name, detail),
            Err(e) => {
                ok = false;
                println!("  {} {:<9} {}", "✗".red(), name, e);
            }
        }
    }
    ok
}

