//! Suite runner implementation
//!
//! Runs each suite entry's scenario chain against a fresh debugger process
//! and reports checkpoint progress as it happens.

use std::path::Path;
use std::process::Stdio;

use colored::Colorize;
use tokio::process::Command as TokioCommand;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::scenarios::{self, Context};

use super::config::{SetupStep, Suite, SuiteEntry};

/// Result of one scenario run
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub checkpoints_run: usize,
    pub checkpoints_total: usize,
    pub error: Option<String>,
}

/// Run every scenario in a suite file
///
/// A failing scenario does not stop the suite; its result carries the error.
pub async fn run_suite(path: &Path, config: &Config, verbose: bool) -> Result<Vec<ScenarioResult>> {
    let suite = Suite::load(path)?;

    println!("\n{} {}", "Running Suite:".blue().bold(), suite.name.white().bold());
    if let Some(desc) = &suite.description {
        println!("  {}", desc.dimmed());
    }

    let suite_config;
    let config = match &suite.config {
        Some(path) => {
            suite_config = Config::load_from(path)?;
            &suite_config
        }
        None => config,
    };

    if let Some(steps) = &suite.setup {
        run_setup(steps, verbose).await?;
    }

    let mut results = Vec::with_capacity(suite.scenarios.len());
    for entry in &suite.scenarios {
        results.push(run_scenario(entry, config, verbose).await?);
    }

    print_summary(&results);
    Ok(results)
}

async fn run_setup(steps: &[SetupStep], verbose: bool) -> Result<()> {
    println!("\n{}", "Setup:".cyan());
    for step in steps {
        if verbose {
            println!("  $ {}", step.shell.dimmed());
        }

        let output = if verbose { Stdio::inherit } else { Stdio::null };
        let status = TokioCommand::new("sh")
            .arg("-c")
            .arg(&step.shell)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .status()
            .await
            .map_err(|e| Error::Config(format!("Setup command failed to execute: {}", e)))?;

        if !status.success() {
            return Err(Error::Config(format!(
                "Setup command '{}' failed with exit code {:?}",
                step.shell,
                status.code()
            )));
        }
        println!("  {} {}", "✓".green(), step.shell.dimmed());
    }
    Ok(())
}

/// Run one suite entry against a newly launched debugger
///
/// The debugger is always asked to shut down afterwards, whether or not the
/// scenario passed.
pub async fn run_scenario(entry: &SuiteEntry, config: &Config, verbose: bool) -> Result<ScenarioResult> {
    let scenario = scenarios::find(&entry.scenario).ok_or_else(|| {
        Error::Config(format!(
            "Unknown scenario '{}'. Run `conformance scenarios` for the list",
            entry.scenario
        ))
    })?;

    // Validate before anything is spawned
    let chain = scenario.chain()?;
    let checkpoints_total = chain.len();

    println!(
        "\n{} {} ({})",
        "Scenario:".blue().bold(),
        scenario.name.white().bold(),
        entry.control.test_name.dimmed()
    );

    let mut config = config.clone();
    if let Some(secs) = entry.event_timeout {
        config.timeouts.event_secs = secs;
    }

    let mut ctx = match Context::launch(entry.control.clone(), &config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            return Ok(ScenarioResult {
                name: scenario.name.to_string(),
                passed: false,
                checkpoints_run: 0,
                checkpoints_total,
                error: Some(e.to_string()),
            });
        }
    };

    let mut checkpoints_run = 0;
    let outcome = chain
        .run_observed(&mut ctx, |name| {
            checkpoints_run += 1;
            println!("  {} {}", "✓".green(), name);
        })
        .await;

    if let Err(e) = ctx.shutdown().await {
        tracing::warn!("Debugger shutdown after '{}' failed: {}", scenario.name, e);
    }

    let result = match outcome {
        Ok(_) => ScenarioResult {
            name: scenario.name.to_string(),
            passed: true,
            checkpoints_run,
            checkpoints_total,
            error: None,
        },
        Err(e) => {
            let checkpoint = match &e {
                Error::CheckpointFailed { checkpoint, .. } => checkpoint.as_str(),
                _ => "?",
            };
            println!("  {} {} [{}]: {}", "✗".red(), checkpoint, e.code(), e.root());
            if verbose {
                if let Error::CheckpointFailed { .. } = &e {
                    println!("    {}", e.to_string().dimmed());
                }
            }
            ScenarioResult {
                name: scenario.name.to_string(),
                passed: false,
                checkpoints_run,
                checkpoints_total,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(result)
}

fn print_summary(results: &[ScenarioResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    println!();
    if failed == 0 {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("{} scenario(s) passed", passed).green().bold()
        );
    } else {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("{} of {} scenario(s) failed", failed, results.len()).red().bold()
        );
        for result in results.iter().filter(|r| !r.passed) {
            println!(
                "  {} ({}/{} checkpoints): {}",
                result.name,
                result.checkpoints_run,
                result.checkpoints_total,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
