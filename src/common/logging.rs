//! Logging and tracing configuration
//!
//! Interactive runs log compactly to stderr. Suite runs additionally keep a
//! full transcript (including MI traffic at TRACE) in a log file so a failed
//! scenario can be replayed line by line.

use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use super::paths;

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("conformance=debug,warn")
        } else {
            EnvFilter::new("conformance=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for a suite run (file + stderr logging)
///
/// The transcript goes to `<data dir>/logs/suite.log`, truncated per run.
/// Returns the log path when file logging could be set up.
pub fn init_suite(verbose: bool) -> Option<PathBuf> {
    let stderr_filter = if verbose {
        "conformance=debug,warn"
    } else {
        "conformance=info,warn"
    };

    let log_file = paths::log_dir().and_then(|dir| {
        paths::ensure_dir(&dir).ok()?;
        let path = dir.join("suite.log");
        match std::fs::File::create(&path) {
            Ok(file) => Some((path, file)),
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
                None
            }
        }
    });

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(stderr_filter)),
        );

    match log_file {
        Some((path, file)) => {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
                .with_filter(EnvFilter::new("conformance=trace,info"));

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();

            Some(path)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}
